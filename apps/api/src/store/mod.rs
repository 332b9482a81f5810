//! Persistent store. Every durable read and write goes through the `Store` trait.
//!
//! `PgStore` is the production backend. Tests run against `memory::MemoryStore`,
//! which holds all state behind one mutex so each call is trivially atomic.
//!
//! Nothing here caches: counters and the active prompt are read fresh on every call,
//! since admins and webhooks change them out-of-band.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::ConsumptionSource;
use crate::models::analytics::{EventTypeCount, NewAnalyticsEvent};
use crate::models::payment::{CheckoutCompletion, NewPayment, PaymentRow, Settlement};
use crate::models::prompt::{
    NewPromptTestRun, NewPromptVersion, PromptTestRunRow, PromptVersionRow,
};
use crate::models::resume::{NewResume, NewRevision, ResumeRow, RevisionRow};
use crate::models::user::{IdentityProfile, Role, User, UserStatus};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A uniqueness or atomicity constraint rejected the write; nothing was applied.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // ── Users ────────────────────────────────────────────────────────────────

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Insert-or-update keyed on `id`. Empty incoming profile fields never overwrite
    /// stored ones. Refreshes `last_login_at`. Returns the row and whether it was inserted.
    async fn upsert_user(&self, id: &str, profile: &IdentityProfile) -> StoreResult<(User, bool)>;

    /// Renames `old_id` to `new_id` and rewrites every reference to it, as one unit.
    async fn migrate_user_id(
        &self,
        old_id: &str,
        new_id: &str,
        profile: &IdentityProfile,
    ) -> StoreResult<User>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn count_users(&self) -> StoreResult<i64>;

    async fn set_user_status(&self, id: &str, status: UserStatus) -> StoreResult<Option<User>>;

    async fn set_user_role(&self, id: &str, role: Role) -> StoreResult<Option<User>>;

    /// Stores the billing customer id unless one is already set. Returns the id that is
    /// stored afterwards, or `None` when the user does not exist.
    async fn set_billing_customer_id(
        &self,
        id: &str,
        customer_id: &str,
    ) -> StoreResult<Option<String>>;

    // ── Ledger ───────────────────────────────────────────────────────────────

    /// Debits one entitlement from `source` (floor-checked against `free_limit` or zero)
    /// and inserts the revision in the same unit. A free reservation whose free use was
    /// taken concurrently is charged to a paid credit instead; `was_free` on the returned
    /// row says which bucket paid. Returns `None`, having written nothing, when neither
    /// floor check passes.
    async fn settle_generation(
        &self,
        source: ConsumptionSource,
        free_limit: i32,
        revision: &NewRevision,
    ) -> StoreResult<Option<RevisionRow>>;

    // ── Resumes & revisions ──────────────────────────────────────────────────

    async fn create_resume(&self, resume: &NewResume) -> StoreResult<ResumeRow>;

    async fn get_resume(&self, id: Uuid, user_id: &str) -> StoreResult<Option<ResumeRow>>;

    async fn list_resumes(&self, user_id: &str) -> StoreResult<Vec<ResumeRow>>;

    async fn delete_resume(&self, id: Uuid, user_id: &str) -> StoreResult<bool>;

    async fn list_revisions(
        &self,
        user_id: &str,
        resume_id: Option<Uuid>,
    ) -> StoreResult<Vec<RevisionRow>>;

    // ── Payments ─────────────────────────────────────────────────────────────

    /// Records an opened checkout. A row already present for the session is left as is.
    async fn create_pending_payment(&self, payment: &NewPayment) -> StoreResult<()>;

    async fn get_payment_by_session(&self, session_id: &str) -> StoreResult<Option<PaymentRow>>;

    /// Moves the session's payment to `completed` (creating the row if absent) and grants
    /// the credits, both at most once per session.
    async fn complete_checkout(&self, completion: &CheckoutCompletion) -> StoreResult<Settlement>;

    /// Marks a pending payment as failed. Returns false when no pending row matched.
    async fn fail_checkout(&self, session_id: &str) -> StoreResult<bool>;

    async fn list_payments(&self, user_id: &str) -> StoreResult<Vec<PaymentRow>>;

    async fn completed_revenue_since(&self, since: DateTime<Utc>) -> StoreResult<i64>;

    // ── Prompt versions ──────────────────────────────────────────────────────

    async fn create_prompt_version(
        &self,
        version: &NewPromptVersion,
    ) -> StoreResult<PromptVersionRow>;

    async fn get_prompt_version(&self, id: Uuid) -> StoreResult<Option<PromptVersionRow>>;

    async fn list_prompt_versions(&self) -> StoreResult<Vec<PromptVersionRow>>;

    /// Clears the active flag everywhere and sets it on `id`, atomically.
    /// Returns false (and changes nothing) when `id` does not exist.
    async fn activate_prompt_version(&self, id: Uuid) -> StoreResult<bool>;

    async fn active_prompt_version(&self) -> StoreResult<Option<PromptVersionRow>>;

    async fn default_prompt_version(&self) -> StoreResult<Option<PromptVersionRow>>;

    async fn create_prompt_test_run(&self, run: &NewPromptTestRun)
        -> StoreResult<PromptTestRunRow>;

    async fn list_prompt_test_runs(&self, version_id: Uuid) -> StoreResult<Vec<PromptTestRunRow>>;

    // ── Analytics ────────────────────────────────────────────────────────────

    async fn insert_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()>;

    async fn count_events_by_type(&self, since: DateTime<Utc>) -> StoreResult<Vec<EventTypeCount>>;
}
