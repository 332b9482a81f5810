use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthContext;
use crate::billing::catalog::{Plan, PLANS};
use crate::billing::checkout::CheckoutResponse;
use crate::errors::AppError;
use crate::models::payment::PaymentRow;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: &'static [Plan],
}

/// GET /api/v1/billing/plans
pub async fn handle_list_plans() -> Json<PlansResponse> {
    Json(PlansResponse { plans: PLANS })
}

/// POST /api/v1/billing/checkout
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let response = state
        .checkout
        .create_checkout(auth.user(), req.plan_id.trim())
        .await?;
    Ok(Json(response))
}

/// GET /api/v1/billing/payments
pub async fn handle_list_payments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<PaymentRow>>, AppError> {
    Ok(Json(state.store.list_payments(&auth.principal_id).await?))
}

/// POST /api/v1/billing/webhook
///
/// Unauthenticated; trust comes from the signature over the raw body, so the body is
/// taken as bytes and never re-serialized before verification.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state.checkout.handle_webhook(&body, signature).await?;
    Ok(Json(json!({ "received": true })))
}
