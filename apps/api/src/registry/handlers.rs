use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::models::prompt::{PromptTestRunRow, PromptVersionRow};
use crate::registry::service::{CreatePromptRequest, CreatedPrompt, TestPromptRequest};
use crate::state::AppState;

/// GET /api/v1/admin/prompts
pub async fn handle_list_prompts(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<PromptVersionRow>>, AppError> {
    auth.require_admin()?;
    Ok(Json(state.registry.list().await?))
}

/// POST /api/v1/admin/prompts
pub async fn handle_create_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<CreatedPrompt>), AppError> {
    auth.require_admin()?;
    let created = state.registry.create(req, &auth.principal_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/admin/prompts/:id
pub async fn handle_get_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PromptVersionRow>, AppError> {
    auth.require_admin()?;
    Ok(Json(state.registry.get(id).await?))
}

/// POST /api/v1/admin/prompts/:id/activate
pub async fn handle_activate_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PromptVersionRow>, AppError> {
    auth.require_admin()?;
    Ok(Json(state.registry.activate(id, &auth.principal_id).await?))
}

/// POST /api/v1/admin/prompts/:id/test
pub async fn handle_test_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<TestPromptRequest>,
) -> Result<Json<PromptTestRunRow>, AppError> {
    auth.require_admin()?;
    Ok(Json(
        state
            .registry
            .run_test(id, req, &auth.principal_id)
            .await?,
    ))
}

/// GET /api/v1/admin/prompts/:id/test-runs
pub async fn handle_list_test_runs(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PromptTestRunRow>>, AppError> {
    auth.require_admin()?;
    Ok(Json(state.registry.list_test_runs(id).await?))
}
