use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::events::{Event, EventCategory, Outcome};
use crate::models::resume::{FileType, NewResume, ResumeRow, RevisionRow};
use crate::resumes::extraction::ExtractError;
use crate::state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A file as received from the multipart body.
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Validates, extracts and stores an uploaded resume for `user_id`.
pub async fn store_upload(
    state: &AppState,
    user_id: &str,
    upload: Upload,
) -> Result<ResumeRow, AppError> {
    if upload.bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "File exceeds the {} MB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    let file_type = FileType::detect(&upload.filename, upload.content_type.as_deref())
        .ok_or_else(|| ExtractError::UnsupportedType(upload.filename.clone()))?;

    let extractor = state.extractor.clone();
    let bytes = upload.bytes;
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&bytes, file_type))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("extraction task failed: {e}")))?;

    let extracted_text = match extracted {
        Ok(text) => text,
        Err(e) => {
            warn!(%user_id, filename = %upload.filename, file_type = file_type.as_str(), "Resume extraction failed: {e}");
            state
                .events
                .record(
                    Event::new(EventCategory::Upload, Outcome::Failure)
                        .user(user_id)
                        .attr("file_type", file_type.as_str())
                        .attr("error", e.to_string()),
                )
                .await;
            return Err(e.into());
        }
    };

    let resume = state
        .store
        .create_resume(&NewResume {
            user_id: user_id.to_string(),
            original_filename: upload.filename,
            file_type,
            extracted_text,
        })
        .await?;

    info!(%user_id, resume_id = %resume.id, "Stored uploaded resume");
    state
        .events
        .record(
            Event::new(EventCategory::Upload, Outcome::Success)
                .user(user_id)
                .attr("resume_id", resume.id.to_string())
                .attr("file_type", file_type.as_str())
                .attr("characters", resume.extracted_text.chars().count()),
        )
        .await;

    Ok(resume)
}

/// POST /api/v1/resumes (multipart, field "file")
pub async fn handle_upload(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ResumeRow>), AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("resume").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
        upload = Some(Upload {
            filename,
            content_type,
            bytes,
        });
        break;
    }

    let upload =
        upload.ok_or_else(|| AppError::Validation("Missing multipart field 'file'".to_string()))?;
    let resume = store_upload(&state, &auth.principal_id, upload).await?;
    Ok((StatusCode::CREATED, Json(resume)))
}

/// GET /api/v1/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<ResumeRow>>, AppError> {
    Ok(Json(state.store.list_resumes(&auth.principal_id).await?))
}

/// DELETE /api/v1/resumes/:id
///
/// Also removes the resume's revisions.
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(resume_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state
        .store
        .delete_resume(resume_id, &auth.principal_id)
        .await?
    {
        return Err(AppError::NotFound(format!("Resume {resume_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/resumes/:id/revisions
pub async fn handle_resume_revisions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<Vec<RevisionRow>>, AppError> {
    state
        .store
        .get_resume(resume_id, &auth.principal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;

    Ok(Json(
        state
            .store
            .list_revisions(&auth.principal_id, Some(resume_id))
            .await?,
    ))
}

/// GET /api/v1/revisions
pub async fn handle_list_revisions(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<RevisionRow>>, AppError> {
    Ok(Json(
        state
            .store
            .list_revisions(&auth.principal_id, None)
            .await?,
    ))
}
