//! Request principal resolution. The upstream gateway authenticates the caller and
//! forwards the identity in `x-principal-id`; handlers only ever see the resolved form.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// The raw authenticated id, before any user row is required to exist.
/// Used by identity sync, which is what creates that row.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Principal(id.to_string()))
            .ok_or(AppError::Unauthenticated)
    }
}

/// An authenticated, known and active user.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal_id: String,
    pub role: Role,
    user: User,
}

impl AuthContext {
    pub fn from_user(user: User) -> Result<Self, AppError> {
        if !user.is_active() {
            return Err(AppError::Forbidden("Account is deactivated".to_string()));
        }
        Ok(Self {
            principal_id: user.id.clone(),
            role: user.role(),
            user,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin role required".to_string()))
        }
    }

    /// The user row as loaded for this request.
    pub fn user(&self) -> &User {
        &self.user
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Principal(id) = Principal::from_request_parts(parts, state).await?;
        let user = state
            .store
            .get_user(&id)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        AuthContext::from_user(user)
    }
}
