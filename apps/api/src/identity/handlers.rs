use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::{AuthContext, Principal};
use crate::errors::AppError;
use crate::identity::service::SyncOutcome;
use crate::ledger::Entitlement;
use crate::models::user::{IdentityProfile, User};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: User,
    pub entitlement: Entitlement,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub user: User,
    pub entitlement: Entitlement,
    pub outcome: SyncOutcome,
}

/// POST /api/v1/auth/sync
///
/// Called by the web app after every sign-in with the identity provider's profile.
pub async fn handle_sync(
    State(state): State<AppState>,
    Principal(principal_id): Principal,
    Json(profile): Json<IdentityProfile>,
) -> Result<Json<SyncResponse>, AppError> {
    let result = state.identity.sync(&principal_id, profile).await?;

    Ok(Json(SyncResponse {
        entitlement: Entitlement::of(&result.user),
        user: result.user,
        outcome: result.outcome,
    }))
}

/// GET /api/v1/me
pub async fn handle_me(auth: AuthContext) -> Json<AccountResponse> {
    let user = auth.user().clone();
    Json(AccountResponse {
        entitlement: Entitlement::of(&user),
        user,
    })
}
