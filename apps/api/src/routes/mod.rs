pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};

use crate::admin::handlers as admin;
use crate::billing::handlers as billing;
use crate::generation::handlers as generation;
use crate::identity::handlers as identity;
use crate::registry::handlers as prompts;
use crate::resumes::handlers as resumes;
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Identity
        .route("/api/v1/auth/sync", post(identity::handle_sync))
        .route("/api/v1/me", get(identity::handle_me))
        // Resumes & tailoring
        .route(
            "/api/v1/resumes",
            get(resumes::handle_list_resumes)
                .post(resumes::handle_upload)
                .layer(DefaultBodyLimit::max(
                    resumes::MAX_UPLOAD_BYTES + UPLOAD_OVERHEAD_BYTES,
                )),
        )
        .route("/api/v1/resumes/:id", delete(resumes::handle_delete_resume))
        .route(
            "/api/v1/resumes/:id/revisions",
            get(resumes::handle_resume_revisions),
        )
        .route("/api/v1/resumes/:id/tailor", post(generation::handle_tailor))
        .route("/api/v1/revisions", get(resumes::handle_list_revisions))
        // Billing
        .route("/api/v1/billing/plans", get(billing::handle_list_plans))
        .route("/api/v1/billing/checkout", post(billing::handle_create_checkout))
        .route("/api/v1/billing/payments", get(billing::handle_list_payments))
        .route("/api/v1/billing/webhook", post(billing::handle_webhook))
        // Admin
        .route("/api/v1/admin/users", get(admin::handle_list_users))
        .route(
            "/api/v1/admin/users/:id/status",
            patch(admin::handle_set_status),
        )
        .route("/api/v1/admin/users/:id/role", patch(admin::handle_set_role))
        .route("/api/v1/admin/analytics", get(admin::handle_analytics))
        .route(
            "/api/v1/admin/prompts",
            get(prompts::handle_list_prompts).post(prompts::handle_create_prompt),
        )
        .route("/api/v1/admin/prompts/:id", get(prompts::handle_get_prompt))
        .route(
            "/api/v1/admin/prompts/:id/activate",
            post(prompts::handle_activate_prompt),
        )
        .route(
            "/api/v1/admin/prompts/:id/test",
            post(prompts::handle_test_prompt),
        )
        .route(
            "/api/v1/admin/prompts/:id/test-runs",
            get(prompts::handle_list_test_runs),
        )
        .with_state(state)
}
