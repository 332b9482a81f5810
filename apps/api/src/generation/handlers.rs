//! Axum route handlers for the Generation API.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::generation::tailor::{tailor_resume, TailorRequest, TailorResponse};
use crate::state::AppState;

/// POST /api/v1/resumes/:id/tailor
///
/// Generates a tailored revision of a stored resume and charges one entitlement.
/// Fails with 403 before calling the model when the user has nothing left.
pub async fn handle_tailor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(resume_id): Path<Uuid>,
    Json(request): Json<TailorRequest>,
) -> Result<Json<TailorResponse>, AppError> {
    Ok(Json(tailor_resume(&state, &auth, resume_id, request).await?))
}
