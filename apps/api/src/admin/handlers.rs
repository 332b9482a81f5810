use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::events::{Event, EventCategory, Outcome};
use crate::models::analytics::AnalyticsSummary;
use crate::models::user::{Role, User, UserStatus};
use crate::state::AppState;

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub days: Option<i64>,
}

/// GET /api/v1/admin/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<User>>, AppError> {
    auth.require_admin()?;
    Ok(Json(state.store.list_users().await?))
}

/// PATCH /api/v1/admin/users/:id/status
pub async fn handle_set_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<User>, AppError> {
    auth.require_admin()?;
    let status: UserStatus = req.status.trim().parse().map_err(AppError::Validation)?;
    if user_id == auth.principal_id && status == UserStatus::Deactivated {
        return Err(AppError::Validation(
            "Admins cannot deactivate their own account".to_string(),
        ));
    }

    let user = state
        .store
        .set_user_status(&user_id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

    info!(admin_id = %auth.principal_id, %user_id, status = status.as_str(), "Changed user status");
    record_admin_action(&state, &auth, "set_status", &user_id, status.as_str()).await;
    Ok(Json(user))
}

/// PATCH /api/v1/admin/users/:id/role
pub async fn handle_set_role(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<String>,
    Json(req): Json<RoleUpdate>,
) -> Result<Json<User>, AppError> {
    auth.require_admin()?;
    let role: Role = req.role.trim().parse().map_err(AppError::Validation)?;

    let user = state
        .store
        .set_user_role(&user_id, role)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

    info!(admin_id = %auth.principal_id, %user_id, role = role.as_str(), "Changed user role");
    record_admin_action(&state, &auth, "set_role", &user_id, role.as_str()).await;
    Ok(Json(user))
}

/// GET /api/v1/admin/analytics?days=30
pub async fn handle_analytics(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<WindowQuery>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    auth.require_admin()?;
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }
    let since = Utc::now() - Duration::days(days);

    Ok(Json(AnalyticsSummary {
        since,
        total_users: state.store.count_users().await?,
        completed_revenue: state.store.completed_revenue_since(since).await?,
        events_by_type: state.store.count_events_by_type(since).await?,
    }))
}

async fn record_admin_action(
    state: &AppState,
    auth: &AuthContext,
    action: &str,
    target_user_id: &str,
    value: &str,
) {
    state
        .events
        .record(
            Event::new(EventCategory::Admin, Outcome::Success)
                .user(auth.principal_id.clone())
                .attr("action", action)
                .attr("target_user_id", target_user_id)
                .attr("value", value),
        )
        .await;
}
