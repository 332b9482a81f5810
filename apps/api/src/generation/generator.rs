//! Generation service: turns resume text plus a target industry/role into a tailored
//! resume.
//!
//! Prompt resolution order:
//!   1. caller-supplied override (admins only, enforced by the caller)
//!   2. the registry's active prompt version
//!   3. the registry's default prompt version
//!   4. the built-in prompt pair
//!
//! The registry is read on every call; activation takes effect on the next request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::prompts::{TAILOR_PROMPT_TEMPLATE, TAILOR_SYSTEM};
use crate::generation::template::expand_template;
use crate::llm_client::{LanguageModel, LlmError};
use crate::store::Store;

/// Output token ceiling for every generation call.
pub const MAX_TOKENS: u32 = 4096;

/// An ad-hoc prompt pair that bypasses the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOverride {
    pub system_prompt: String,
    pub user_prompt_template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptOrigin {
    Override,
    Active,
    Default,
    BuiltIn,
}

impl PromptOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptOrigin::Override => "override",
            PromptOrigin::Active => "active",
            PromptOrigin::Default => "default",
            PromptOrigin::BuiltIn => "built_in",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub system_prompt: String,
    pub user_prompt_template: String,
    /// Set only when the prompt came from the registry.
    pub version_id: Option<Uuid>,
    pub origin: PromptOrigin,
}

#[derive(Debug, Clone)]
pub struct TailorOutput {
    pub content: String,
    pub prompt_version_id: Option<Uuid>,
    pub origin: PromptOrigin,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptTestOutput {
    pub output: String,
    pub execution_time_ms: i64,
}

#[derive(Clone)]
pub struct GenerationService {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl GenerationService {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self {
            llm,
            store,
            timeout,
        }
    }

    pub async fn resolve_prompt(
        &self,
        prompt_override: Option<PromptOverride>,
    ) -> Result<ResolvedPrompt, AppError> {
        if let Some(o) = prompt_override {
            return Ok(ResolvedPrompt {
                system_prompt: o.system_prompt,
                user_prompt_template: o.user_prompt_template,
                version_id: None,
                origin: PromptOrigin::Override,
            });
        }

        let registered = match self.store.active_prompt_version().await? {
            Some(v) => Some((v, PromptOrigin::Active)),
            None => self
                .store
                .default_prompt_version()
                .await?
                .map(|v| (v, PromptOrigin::Default)),
        };

        Ok(match registered {
            Some((version, origin)) => ResolvedPrompt {
                system_prompt: version.system_prompt,
                user_prompt_template: version.user_prompt_template,
                version_id: Some(version.id),
                origin,
            },
            None => ResolvedPrompt {
                system_prompt: TAILOR_SYSTEM.to_string(),
                user_prompt_template: TAILOR_PROMPT_TEMPLATE.to_string(),
                version_id: None,
                origin: PromptOrigin::BuiltIn,
            },
        })
    }

    /// Produces tailored text. Empty output and timeouts both surface as
    /// `GenerationEmpty`; nothing is persisted here.
    pub async fn tailor(
        &self,
        resume_text: &str,
        industry: &str,
        role: &str,
        prompt_override: Option<PromptOverride>,
    ) -> Result<TailorOutput, AppError> {
        let prompt = self.resolve_prompt(prompt_override).await?;
        let user_prompt =
            expand_template(&prompt.user_prompt_template, industry, role, resume_text);

        info!(
            origin = prompt.origin.as_str(),
            prompt_version_id = ?prompt.version_id,
            "Calling LLM for tailored resume"
        );

        let text = match self.invoke(&prompt.system_prompt, &user_prompt).await {
            Ok(text) => text,
            Err(LlmError::EmptyContent) | Err(LlmError::Timeout(_)) => {
                return Err(AppError::GenerationEmpty)
            }
            Err(e) => return Err(AppError::Llm(format!("Tailor LLM call failed: {e}"))),
        };

        let content = text.trim();
        if content.is_empty() {
            return Err(AppError::GenerationEmpty);
        }

        Ok(TailorOutput {
            content: content.to_string(),
            prompt_version_id: prompt.version_id,
            origin: prompt.origin,
        })
    }

    /// Admin sandbox: runs an arbitrary prompt pair with no registry lookup and no
    /// entitlement checks. Empty output (or a timeout) yields an empty string.
    pub async fn test_prompt(
        &self,
        system_prompt: &str,
        user_prompt_template: &str,
        sample_input: &str,
        industry: &str,
        role: &str,
    ) -> Result<PromptTestOutput, AppError> {
        let user_prompt = expand_template(user_prompt_template, industry, role, sample_input);

        let started = Instant::now();
        let output = match self.invoke(system_prompt, &user_prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(LlmError::EmptyContent) | Err(LlmError::Timeout(_)) => String::new(),
            Err(e) => return Err(AppError::Llm(format!("Prompt test LLM call failed: {e}"))),
        };
        let execution_time_ms = started.elapsed().as_millis() as i64;

        Ok(PromptTestOutput {
            output,
            execution_time_ms,
        })
    }

    async fn invoke(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.llm.complete(system, prompt, MAX_TOKENS))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("LLM call exceeded {:?}", self.timeout);
                Err(LlmError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::template::PLACEHOLDER_TOKENS;
    use crate::models::prompt::NewPromptVersion;
    use crate::store::memory::MemoryStore;
    use crate::testing::ScriptedModel;

    fn service(model: Arc<ScriptedModel>, store: Arc<MemoryStore>) -> GenerationService {
        GenerationService::new(model, store, Duration::from_secs(5))
    }

    fn version(name: &str, is_default: bool) -> NewPromptVersion {
        NewPromptVersion {
            name: name.to_string(),
            description: None,
            system_prompt: format!("system:{name}"),
            user_prompt_template: format!("{name}: {{role}} / {{industry}} / {{resume_text}}"),
            is_default,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_built_in_prompt_used_when_registry_empty() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::replying("Tailored text"));
        let out = service(model.clone(), store)
            .tailor("My resume", "Fintech", "SRE", None)
            .await
            .unwrap();

        assert_eq!(out.content, "Tailored text");
        assert_eq!(out.origin, PromptOrigin::BuiltIn);
        assert!(out.prompt_version_id.is_none());

        let calls = model.calls().await;
        assert_eq!(calls[0].system, TAILOR_SYSTEM);
        assert_eq!(calls[0].max_tokens, MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_default_used_when_nothing_active() {
        let store = Arc::new(MemoryStore::new());
        let default = store
            .create_prompt_version(&version("seed", true))
            .await
            .unwrap();
        let model = Arc::new(ScriptedModel::replying("ok"));

        let out = service(model.clone(), store)
            .tailor("cv", "Law", "Paralegal", None)
            .await
            .unwrap();
        assert_eq!(out.origin, PromptOrigin::Default);
        assert_eq!(out.prompt_version_id, Some(default.id));
        assert_eq!(model.calls().await[0].prompt, "seed: Paralegal / Law / cv");
    }

    #[tokio::test]
    async fn test_active_wins_over_default() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_prompt_version(&version("seed", true))
            .await
            .unwrap();
        let candidate = store
            .create_prompt_version(&version("candidate", false))
            .await
            .unwrap();
        store.activate_prompt_version(candidate.id).await.unwrap();
        let model = Arc::new(ScriptedModel::replying("ok"));

        let out = service(model.clone(), store)
            .tailor("cv", "Law", "Paralegal", None)
            .await
            .unwrap();
        assert_eq!(out.origin, PromptOrigin::Active);
        assert_eq!(out.prompt_version_id, Some(candidate.id));
        assert_eq!(model.calls().await[0].system, "system:candidate");
    }

    #[tokio::test]
    async fn test_override_skips_registry_and_reports_no_version() {
        let store = Arc::new(MemoryStore::new());
        let active = store
            .create_prompt_version(&version("active", false))
            .await
            .unwrap();
        store.activate_prompt_version(active.id).await.unwrap();
        let model = Arc::new(ScriptedModel::replying("ok"));

        let out = service(model.clone(), store)
            .tailor(
                "cv",
                "Energy",
                "Analyst",
                Some(PromptOverride {
                    system_prompt: "custom system".to_string(),
                    user_prompt_template: "{resume_text} -> {role}@{industry}".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(out.origin, PromptOrigin::Override);
        assert!(out.prompt_version_id.is_none());

        let calls = model.calls().await;
        let call = &calls[0];
        assert_eq!(call.system, "custom system");
        assert_eq!(call.prompt, "cv -> Analyst@Energy");
    }

    #[tokio::test]
    async fn test_prompt_sent_downstream_has_no_placeholders() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::replying("ok"));
        service(model.clone(), store)
            .tailor("Ten years of Rust", "Aerospace", "Flight Software Lead", None)
            .await
            .unwrap();

        let calls = model.calls().await;
        let prompt = &calls[0].prompt;
        for token in PLACEHOLDER_TOKENS {
            assert!(!prompt.contains(token));
        }
        assert!(prompt.contains("Ten years of Rust"));
        assert!(prompt.contains("Aerospace"));
        assert!(prompt.contains("Flight Software Lead"));
    }

    #[tokio::test]
    async fn test_blank_output_is_generation_empty() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::replying("   \n"));
        let err = service(model, store)
            .tailor("cv", "Law", "Clerk", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationEmpty));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_llm_error() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::failing());
        let err = service(model, store)
            .tailor("cv", "Law", "Clerk", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_generation_empty() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::replying("late").with_delay(Duration::from_secs(60)));
        let err = service(model, store)
            .tailor("cv", "Law", "Clerk", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationEmpty));
    }

    #[tokio::test]
    async fn test_prompt_test_returns_empty_string_on_empty_output() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::empty());
        let out = service(model, store)
            .test_prompt("sys", "{resume_text}", "sample", "Law", "Clerk")
            .await
            .unwrap();
        assert_eq!(out.output, "");
        assert!(out.execution_time_ms >= 0);
    }

    #[tokio::test]
    async fn test_prompt_test_ignores_registry() {
        let store = Arc::new(MemoryStore::new());
        let active = store
            .create_prompt_version(&version("active", false))
            .await
            .unwrap();
        store.activate_prompt_version(active.id).await.unwrap();
        let model = Arc::new(ScriptedModel::replying("draft output"));

        let out = service(model.clone(), store)
            .test_prompt("draft system", "{industry}|{role}|{resume_text}", "s", "i", "r")
            .await
            .unwrap();
        assert_eq!(out.output, "draft output");
        let calls = model.calls().await;
        let call = &calls[0];
        assert_eq!(call.system, "draft system");
        assert_eq!(call.prompt, "i|r|s");
    }
}
