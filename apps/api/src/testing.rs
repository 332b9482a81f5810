//! Test doubles for the external collaborators, plus `AppState` builders over the
//! in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::billing::provider::{
    sign_payload, verify_signature, CheckoutSession, CheckoutSessionRequest, PaymentProvider,
    ProviderError, SignatureError, SIGNATURE_TOLERANCE_SECS,
};
use crate::config::Config;
use crate::llm_client::{LanguageModel, LlmError};
use crate::models::resume::FileType;
use crate::resumes::extraction::{ExtractError, TextExtractor};
use crate::state::AppState;
use crate::store::memory::MemoryStore;

// ── Language model ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModelCall {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

enum Script {
    Reply(String),
    Empty,
    Fail,
}

/// Returns a fixed answer and records every prompt it was sent.
pub struct ScriptedModel {
    script: Script,
    delay: Option<Duration>,
    calls: Mutex<Vec<ModelCall>>,
}

impl ScriptedModel {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with_script(Script::Reply(text.to_string()))
    }

    pub fn empty() -> Self {
        Self::with_script(Script::Empty)
    }

    pub fn failing() -> Self {
        Self::with_script(Script::Fail)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.calls.lock().await.push(ModelCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Empty => Err(LlmError::EmptyContent),
            Script::Fail => Err(LlmError::Api {
                status: 529,
                message: "overloaded".to_string(),
            }),
        }
    }
}

// ── Payment provider ────────────────────────────────────────────────────────

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Debug, Clone)]
pub struct RecordedSession {
    pub customer_id: String,
    pub user_id: String,
    pub plan_id: String,
    pub success_url: String,
}

/// Hands out sequential ids and verifies signatures with `TEST_WEBHOOK_SECRET`.
#[derive(Default)]
pub struct MockPaymentProvider {
    customers: AtomicUsize,
    sessions: AtomicUsize,
    last_session: std::sync::Mutex<Option<RecordedSession>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customers_created(&self) -> usize {
        self.customers.load(Ordering::SeqCst)
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn last_session_request(&self) -> Option<RecordedSession> {
        self.last_session.lock().unwrap().clone()
    }

    /// A currently valid signature header for `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        sign_payload(TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), payload)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_customer(&self, _email: &str, _user_id: &str) -> Result<String, ProviderError> {
        let n = self.customers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("cus_test_{n}"))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest<'_>,
    ) -> Result<CheckoutSession, ProviderError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_session.lock().unwrap() = Some(RecordedSession {
            customer_id: request.customer_id.to_string(),
            user_id: request.user_id.to_string(),
            plan_id: request.plan.id.to_string(),
            success_url: request.success_url.to_string(),
        });
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            url: format!("https://checkout.test/pay/cs_test_{n}"),
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), SignatureError> {
        verify_signature(
            TEST_WEBHOOK_SECRET,
            payload,
            signature_header.ok_or(SignatureError::MissingHeader)?,
            chrono::Utc::now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )
    }
}

// ── Text extraction ─────────────────────────────────────────────────────────

pub struct StaticExtractor {
    text: Option<String>,
}

impl StaticExtractor {
    pub fn ok(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

impl TextExtractor for StaticExtractor {
    fn extract(&self, _bytes: &[u8], _file_type: FileType) -> Result<String, ExtractError> {
        self.text
            .clone()
            .ok_or_else(|| ExtractError::ExtractionFailed("corrupt test document".to_string()))
    }
}

// ── State ───────────────────────────────────────────────────────────────────

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/tailor_test".to_string(),
        anthropic_api_key: "test-key".to_string(),
        stripe_secret_key: "sk_test".to_string(),
        stripe_webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        app_base_url: "https://app.test".to_string(),
        llm_timeout: Duration::from_secs(5),
        port: 0,
        rust_log: "debug".to_string(),
    }
}

pub fn build_state(
    store: Arc<MemoryStore>,
    model: Arc<dyn LanguageModel>,
    provider: Arc<dyn PaymentProvider>,
    extractor: Arc<dyn TextExtractor>,
) -> AppState {
    AppState::new(store, model, provider, extractor, test_config())
}

pub fn test_state(store: Arc<MemoryStore>) -> AppState {
    test_state_with_model(store, Arc::new(ScriptedModel::replying("Tailored resume")))
}

pub fn test_state_with_model(store: Arc<MemoryStore>, model: Arc<dyn LanguageModel>) -> AppState {
    build_state(
        store,
        model,
        Arc::new(MockPaymentProvider::new()),
        Arc::new(StaticExtractor::ok("Jane Doe\nSoftware Engineer")),
    )
}

pub fn test_state_with(store: Arc<MemoryStore>, extractor: Arc<dyn TextExtractor>) -> AppState {
    build_state(
        store,
        Arc::new(ScriptedModel::replying("Tailored resume")),
        Arc::new(MockPaymentProvider::new()),
        extractor,
    )
}
