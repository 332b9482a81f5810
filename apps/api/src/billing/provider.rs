//! Payment provider seam. Production speaks the Stripe REST API; tests substitute a
//! recording double.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::billing::catalog::Plan;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
/// Maximum age of a signed webhook before it is rejected as a replay.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Why a webhook signature was rejected. Logged, never returned to the sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    MissingHeader,

    #[error("signature header malformed")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,

    #[error("no signature matched the payload")]
    Mismatch,
}

pub struct CheckoutSessionRequest<'a> {
    pub customer_id: &'a str,
    pub plan: &'a Plan,
    pub user_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

impl CheckoutSessionRequest<'_> {
    /// Metadata echoed back on the completion event; the only link from the
    /// asynchronous notification to the buyer.
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        vec![
            ("user_id", self.user_id.to_string()),
            ("plan_id", self.plan.id.to_string()),
            ("credits", self.plan.credits.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a billing customer and returns its provider id.
    async fn create_customer(&self, email: &str, user_id: &str) -> Result<String, ProviderError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest<'_>,
    ) -> Result<CheckoutSession, ProviderError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), SignatureError>;
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            secret_key,
            webhook_secret,
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}{path}"))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Form fields for a one-off hosted checkout at the catalog price.
fn checkout_form(request: &CheckoutSessionRequest<'_>) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("customer".to_string(), request.customer_id.to_string()),
        ("client_reference_id".to_string(), request.user_id.to_string()),
        ("success_url".to_string(), request.success_url.to_string()),
        ("cancel_url".to_string(), request.cancel_url.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.plan.currency.to_string(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.plan.amount.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.plan.name.to_string(),
        ),
    ];
    for (key, value) in request.metadata() {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value));
    }
    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, email: &str, user_id: &str) -> Result<String, ProviderError> {
        let form = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let customer: StripeObject = self.post_form("/customers", &form).await?;
        debug!("Created Stripe customer {} for user {user_id}", customer.id);
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest<'_>,
    ) -> Result<CheckoutSession, ProviderError> {
        self.post_form("/checkout/sessions", &checkout_form(request))
            .await
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), SignatureError> {
        let header = signature_header.ok_or(SignatureError::MissingHeader)?;
        verify_signature(
            &self.webhook_secret,
            payload,
            header,
            chrono::Utc::now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )
    }
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against HMAC-SHA256 of
/// `"<t>.<payload>"`. Any matching `v1` passes; comparison is constant-time.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if now.abs_diff(issued_at) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::StaleTimestamp);
    }

    for signature in &signatures {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(signature).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Builds a header that `verify_signature` accepts.
#[cfg(test)]
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
