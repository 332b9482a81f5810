//! The tailor flow: entitlement check, generation, then a single settle that debits one
//! entitlement and stores the revision together.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::events::{Event, EventCategory, Outcome};
use crate::generation::generator::{PromptOrigin, PromptOverride};
use crate::ledger::{check_and_reserve, Entitlement};
use crate::models::resume::{NewRevision, RevisionRow};
use crate::state::AppState;

const MAX_TARGET_LEN: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct TailorRequest {
    pub target_industry: String,
    pub target_role: String,
    /// Admin-only: try a prompt pair without registering it.
    #[serde(default)]
    pub prompt_override: Option<PromptOverride>,
}

#[derive(Debug, Serialize)]
pub struct TailorResponse {
    pub revision: RevisionRow,
    pub entitlement: Entitlement,
    pub prompt_origin: PromptOrigin,
}

fn target_field(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_TARGET_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_TARGET_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

pub async fn tailor_resume(
    state: &AppState,
    auth: &AuthContext,
    resume_id: Uuid,
    request: TailorRequest,
) -> Result<TailorResponse, AppError> {
    let industry = target_field("target_industry", &request.target_industry)?;
    let role = target_field("target_role", &request.target_role)?;

    if let Some(o) = &request.prompt_override {
        if !auth.is_admin() {
            return Err(AppError::Forbidden(
                "Prompt overrides are restricted to admins".to_string(),
            ));
        }
        if o.system_prompt.trim().is_empty() || o.user_prompt_template.trim().is_empty() {
            return Err(AppError::Validation(
                "prompt_override needs both system_prompt and user_prompt_template".to_string(),
            ));
        }
    }

    let user_id = auth.principal_id.as_str();
    let resume = state
        .store
        .get_resume(resume_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;

    let source = check_and_reserve(auth.user())?;

    let output = match state
        .generator
        .tailor(&resume.extracted_text, &industry, &role, request.prompt_override)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            error!(%user_id, %resume_id, operation = "tailor", "Generation failed: {e}");
            state
                .events
                .record(
                    Event::new(EventCategory::Error, Outcome::Failure)
                        .user(user_id)
                        .attr("operation", "tailor")
                        .attr("error_kind", e.code())
                        .attr("resume_id", resume_id.to_string()),
                )
                .await;
            return Err(e);
        }
    };

    let revision = state
        .ledger
        .settle(
            source,
            &NewRevision {
                resume_id,
                user_id: user_id.to_string(),
                target_industry: industry,
                target_role: role,
                tailored_content: output.content,
                prompt_version_id: output.prompt_version_id,
            },
        )
        .await;
    let revision = match revision {
        Ok(revision) => revision,
        Err(e) => {
            warn!(%user_id, %resume_id, "Settlement rejected after generation: {e}");
            state
                .events
                .record(
                    Event::new(EventCategory::Error, Outcome::Failure)
                        .user(user_id)
                        .attr("operation", "settle")
                        .attr("error_kind", e.code())
                        .attr("resume_id", resume_id.to_string()),
                )
                .await;
            return Err(e);
        }
    };

    info!(
        %user_id,
        %resume_id,
        revision_id = %revision.id,
        was_free = revision.was_free,
        "Tailored resume"
    );
    state
        .events
        .record(
            Event::new(EventCategory::Tailor, Outcome::Success)
                .user(user_id)
                .attr("resume_id", resume_id.to_string())
                .attr("revision_id", revision.id.to_string())
                .attr("source", if revision.was_free { "free" } else { "paid" })
                .attr("prompt_origin", output.origin.as_str())
                .attr(
                    "prompt_version_id",
                    output.prompt_version_id.map(|id| id.to_string()),
                ),
        )
        .await;

    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id}")))?;

    Ok(TailorResponse {
        revision,
        entitlement: Entitlement::of(&user),
        prompt_origin: output.origin,
    })
}
