use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Event, EventCategory, EventRecorder, Outcome};
use crate::generation::generator::GenerationService;
use crate::generation::prompts::{BUILT_IN_PROMPT_NAME, TAILOR_PROMPT_TEMPLATE, TAILOR_SYSTEM};
use crate::generation::template::missing_placeholders;
use crate::models::prompt::{NewPromptTestRun, NewPromptVersion, PromptTestRunRow, PromptVersionRow};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePromptRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
    pub user_prompt_template: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestPromptRequest {
    pub sample_input: String,
    pub target_industry: String,
    pub target_role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPrompt {
    pub version: PromptVersionRow,
    /// Placeholders the template never uses; the version is stored regardless.
    pub missing_placeholders: Vec<&'static str>,
}

fn require(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct PromptRegistry {
    store: Arc<dyn Store>,
    generator: GenerationService,
    events: Arc<dyn EventRecorder>,
}

impl PromptRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        generator: GenerationService,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            store,
            generator,
            events,
        }
    }

    /// Stores a new inactive, non-default version.
    pub async fn create(
        &self,
        request: CreatePromptRequest,
        creator_id: &str,
    ) -> Result<CreatedPrompt, AppError> {
        let name = require("name", &request.name)?;
        let system_prompt = require("system_prompt", &request.system_prompt)?;
        let user_prompt_template = require("user_prompt_template", &request.user_prompt_template)?;

        let missing = missing_placeholders(&user_prompt_template);
        if !missing.is_empty() {
            warn!(%name, ?missing, "Prompt template does not use every placeholder");
        }

        let version = self
            .store
            .create_prompt_version(&NewPromptVersion {
                name,
                description: request
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                system_prompt,
                user_prompt_template,
                is_default: false,
                created_by: Some(creator_id.to_string()),
            })
            .await?;

        info!(version_id = %version.id, name = %version.name, "Created prompt version");
        self.events
            .record(
                Event::new(EventCategory::Prompt, Outcome::Success)
                    .user(creator_id)
                    .attr("action", "create")
                    .attr("version_id", version.id.to_string()),
            )
            .await;

        Ok(CreatedPrompt {
            version,
            missing_placeholders: missing,
        })
    }

    /// Makes `version_id` the single active version. Takes effect on the next generation.
    pub async fn activate(
        &self,
        version_id: Uuid,
        admin_id: &str,
    ) -> Result<PromptVersionRow, AppError> {
        if !self.store.activate_prompt_version(version_id).await? {
            return Err(AppError::NotFound(format!(
                "Prompt version {version_id} not found"
            )));
        }

        info!(%version_id, %admin_id, "Activated prompt version");
        self.events
            .record(
                Event::new(EventCategory::Prompt, Outcome::Success)
                    .user(admin_id)
                    .attr("action", "activate")
                    .attr("version_id", version_id.to_string()),
            )
            .await;

        self.get(version_id).await
    }

    pub async fn list(&self) -> Result<Vec<PromptVersionRow>, AppError> {
        Ok(self.store.list_prompt_versions().await?)
    }

    pub async fn get(&self, version_id: Uuid) -> Result<PromptVersionRow, AppError> {
        self.store
            .get_prompt_version(version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prompt version {version_id} not found")))
    }

    /// Seeds the built-in prompt as the default version when none exists yet.
    /// Safe to call on every startup, from any number of instances.
    pub async fn seed_default(&self) -> Result<Option<PromptVersionRow>, AppError> {
        if self.store.default_prompt_version().await?.is_some() {
            return Ok(None);
        }

        let seeded = self
            .store
            .create_prompt_version(&NewPromptVersion {
                name: BUILT_IN_PROMPT_NAME.to_string(),
                description: Some("Seeded from the built-in tailoring prompt".to_string()),
                system_prompt: TAILOR_SYSTEM.to_string(),
                user_prompt_template: TAILOR_PROMPT_TEMPLATE.to_string(),
                is_default: true,
                created_by: None,
            })
            .await;

        match seeded {
            Ok(version) => {
                info!(version_id = %version.id, "Seeded default prompt version");
                Ok(Some(version))
            }
            // Another instance seeded it between our check and insert.
            Err(StoreError::Conflict(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs a stored version against sample input and keeps the result.
    /// Does not touch entitlements or the active version.
    pub async fn run_test(
        &self,
        version_id: Uuid,
        request: TestPromptRequest,
        admin_id: &str,
    ) -> Result<PromptTestRunRow, AppError> {
        let sample_input = require("sample_input", &request.sample_input)?;
        let target_industry = require("target_industry", &request.target_industry)?;
        let target_role = require("target_role", &request.target_role)?;
        let version = self.get(version_id).await?;

        let result = self
            .generator
            .test_prompt(
                &version.system_prompt,
                &version.user_prompt_template,
                &sample_input,
                &target_industry,
                &target_role,
            )
            .await?;

        let run = self
            .store
            .create_prompt_test_run(&NewPromptTestRun {
                prompt_version_id: version.id,
                test_input: sample_input,
                target_industry,
                target_role,
                output: result.output,
                execution_time_ms: result.execution_time_ms,
                created_by: admin_id.to_string(),
            })
            .await?;

        self.events
            .record(
                Event::new(EventCategory::Prompt, Outcome::Success)
                    .user(admin_id)
                    .attr("action", "test")
                    .attr("version_id", version.id.to_string())
                    .attr("execution_time_ms", run.execution_time_ms),
            )
            .await;

        Ok(run)
    }

    pub async fn list_test_runs(&self, version_id: Uuid) -> Result<Vec<PromptTestRunRow>, AppError> {
        self.get(version_id).await?;
        Ok(self.store.list_prompt_test_runs(version_id).await?)
    }
}
