//! In-memory `Store` used by unit tests. One mutex guards all tables, so each trait
//! call observes and applies a consistent snapshot, like a serializable transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ledger::ConsumptionSource;
use crate::models::analytics::{AnalyticsEventRow, EventTypeCount, NewAnalyticsEvent};
use crate::models::payment::{
    CheckoutCompletion, NewPayment, PaymentRow, PaymentStatus, Settlement,
};
use crate::models::prompt::{
    NewPromptTestRun, NewPromptVersion, PromptTestRunRow, PromptVersionRow,
};
use crate::models::resume::{NewResume, NewRevision, ResumeRow, RevisionRow};
use crate::models::user::{IdentityProfile, Role, User, UserStatus};
use crate::store::{Store, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryState {
    pub users: Vec<User>,
    pub resumes: Vec<ResumeRow>,
    pub revisions: Vec<RevisionRow>,
    pub payments: Vec<PaymentRow>,
    pub prompt_versions: Vec<PromptVersionRow>,
    pub prompt_test_runs: Vec<PromptTestRunRow>,
    pub events: Vec<AnalyticsEventRow>,
    /// Number of mutating calls that changed something.
    pub writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn writes(&self) -> usize {
        self.state.lock().await.writes
    }

    pub async fn events_of_type(&self, event_type: &str) -> Vec<AnalyticsEventRow> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Direct access for arranging fixtures.
    pub async fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    /// Inserts a user with the given counters, bypassing identity sync.
    pub async fn seed_user(&self, id: &str, email: &str, free_used: i32, paid: i32) -> User {
        let now = Utc::now();
        let user = User {
            id: id.to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            avatar_url: None,
            role: Role::User.as_str().to_string(),
            status: UserStatus::Active.as_str().to_string(),
            free_uses_consumed: free_used,
            paid_credits_remaining: paid,
            billing_customer_id: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.users.push(user.clone());
        user
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn upsert_user(&self, id: &str, profile: &IdentityProfile) -> StoreResult<(User, bool)> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if !profile.email.is_empty()
            && state
                .users
                .iter()
                .any(|u| u.email == profile.email && u.id != id)
        {
            return Err(StoreError::Conflict(format!(
                "email {} already in use",
                profile.email
            )));
        }

        state.writes += 1;
        if let Some(user) = state.users.iter_mut().find(|u| u.id == id) {
            if !profile.email.is_empty() {
                user.email = profile.email.clone();
            }
            if let Some(v) = non_empty(&profile.first_name) {
                user.first_name = Some(v);
            }
            if let Some(v) = non_empty(&profile.last_name) {
                user.last_name = Some(v);
            }
            if let Some(v) = non_empty(&profile.avatar_url) {
                user.avatar_url = Some(v);
            }
            user.last_login_at = Some(now);
            user.updated_at = now;
            return Ok((user.clone(), false));
        }

        let user = User {
            id: id.to_string(),
            email: profile.email.clone(),
            first_name: non_empty(&profile.first_name),
            last_name: non_empty(&profile.last_name),
            avatar_url: non_empty(&profile.avatar_url),
            role: Role::User.as_str().to_string(),
            status: UserStatus::Active.as_str().to_string(),
            free_uses_consumed: 0,
            paid_credits_remaining: 0,
            billing_customer_id: None,
            last_login_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok((user, true))
    }

    async fn migrate_user_id(
        &self,
        old_id: &str,
        new_id: &str,
        profile: &IdentityProfile,
    ) -> StoreResult<User> {
        let mut state = self.state.lock().await;

        if state.users.iter().any(|u| u.id == new_id) {
            return Err(StoreError::Conflict(format!("user {new_id} already exists")));
        }
        let Some(index) = state.users.iter().position(|u| u.id == old_id) else {
            return Err(StoreError::Conflict(format!(
                "user {old_id} disappeared during id migration"
            )));
        };

        let new_ref = Some(new_id.to_string());
        for r in state.resumes.iter_mut().filter(|r| r.user_id == old_id) {
            r.user_id = new_id.to_string();
        }
        for r in state.revisions.iter_mut().filter(|r| r.user_id == old_id) {
            r.user_id = new_id.to_string();
        }
        for p in state.payments.iter_mut().filter(|p| p.user_id == old_id) {
            p.user_id = new_id.to_string();
        }
        for e in state
            .events
            .iter_mut()
            .filter(|e| e.user_id.as_deref() == Some(old_id))
        {
            e.user_id = new_ref.clone();
        }
        for v in state
            .prompt_versions
            .iter_mut()
            .filter(|v| v.created_by.as_deref() == Some(old_id))
        {
            v.created_by = new_ref.clone();
        }
        for t in state
            .prompt_test_runs
            .iter_mut()
            .filter(|t| t.created_by.as_deref() == Some(old_id))
        {
            t.created_by = new_ref.clone();
        }

        let now = Utc::now();
        let user = &mut state.users[index];
        user.id = new_id.to_string();
        if let Some(v) = non_empty(&profile.first_name) {
            user.first_name = Some(v);
        }
        if let Some(v) = non_empty(&profile.last_name) {
            user.last_name = Some(v);
        }
        if let Some(v) = non_empty(&profile.avatar_url) {
            user.avatar_url = Some(v);
        }
        user.last_login_at = Some(now);
        user.updated_at = now;
        let user = user.clone();
        state.writes += 1;
        Ok(user)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.state.lock().await.users.clone())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.state.lock().await.users.len() as i64)
    }

    async fn set_user_status(&self, id: &str, status: UserStatus) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.status = status.as_str().to_string();
        let user = user.clone();
        state.writes += 1;
        Ok(Some(user))
    }

    async fn set_user_role(&self, id: &str, role: Role) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.role = role.as_str().to_string();
        let user = user.clone();
        state.writes += 1;
        Ok(Some(user))
    }

    async fn set_billing_customer_id(
        &self,
        id: &str,
        customer_id: &str,
    ) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        let stored = user
            .billing_customer_id
            .get_or_insert_with(|| customer_id.to_string())
            .clone();
        state.writes += 1;
        Ok(Some(stored))
    }

    async fn settle_generation(
        &self,
        source: ConsumptionSource,
        free_limit: i32,
        revision: &NewRevision,
    ) -> StoreResult<Option<RevisionRow>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.iter_mut().find(|u| u.id == revision.user_id) else {
            return Ok(None);
        };

        let charged = if source == ConsumptionSource::Free && user.free_uses_consumed < free_limit
        {
            user.free_uses_consumed += 1;
            ConsumptionSource::Free
        } else if user.paid_credits_remaining > 0 {
            user.paid_credits_remaining -= 1;
            ConsumptionSource::Paid
        } else {
            return Ok(None);
        };

        let row = RevisionRow {
            id: Uuid::new_v4(),
            resume_id: revision.resume_id,
            user_id: revision.user_id.clone(),
            target_industry: revision.target_industry.clone(),
            target_role: revision.target_role.clone(),
            tailored_content: revision.tailored_content.clone(),
            was_free: charged == ConsumptionSource::Free,
            prompt_version_id: revision.prompt_version_id,
            created_at: Utc::now(),
        };
        state.revisions.push(row.clone());
        state.writes += 1;
        Ok(Some(row))
    }

    async fn create_resume(&self, resume: &NewResume) -> StoreResult<ResumeRow> {
        let mut state = self.state.lock().await;
        let row = ResumeRow {
            id: Uuid::new_v4(),
            user_id: resume.user_id.clone(),
            original_filename: resume.original_filename.clone(),
            file_type: resume.file_type.as_str().to_string(),
            extracted_text: resume.extracted_text.clone(),
            created_at: Utc::now(),
        };
        state.resumes.push(row.clone());
        state.writes += 1;
        Ok(row)
    }

    async fn get_resume(&self, id: Uuid, user_id: &str) -> StoreResult<Option<ResumeRow>> {
        let state = self.state.lock().await;
        Ok(state
            .resumes
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn list_resumes(&self, user_id: &str) -> StoreResult<Vec<ResumeRow>> {
        let state = self.state.lock().await;
        Ok(state
            .resumes
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_resume(&self, id: Uuid, user_id: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.resumes.len();
        state.resumes.retain(|r| !(r.id == id && r.user_id == user_id));
        let deleted = state.resumes.len() < before;
        if deleted {
            state.revisions.retain(|r| r.resume_id != id);
            state.writes += 1;
        }
        Ok(deleted)
    }

    async fn list_revisions(
        &self,
        user_id: &str,
        resume_id: Option<Uuid>,
    ) -> StoreResult<Vec<RevisionRow>> {
        let state = self.state.lock().await;
        Ok(state
            .revisions
            .iter()
            .filter(|r| r.user_id == user_id && resume_id.map_or(true, |id| r.resume_id == id))
            .cloned()
            .collect())
    }

    async fn create_pending_payment(&self, payment: &NewPayment) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .payments
            .iter()
            .any(|p| p.provider_session_id == payment.provider_session_id)
        {
            return Ok(());
        }
        state.payments.push(PaymentRow {
            id: Uuid::new_v4(),
            user_id: payment.user_id.clone(),
            provider_session_id: payment.provider_session_id.clone(),
            provider_payment_intent_id: None,
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: PaymentStatus::Pending.as_str().to_string(),
            credits_granted: payment.credits_granted,
            created_at: Utc::now(),
        });
        state.writes += 1;
        Ok(())
    }

    async fn get_payment_by_session(&self, session_id: &str) -> StoreResult<Option<PaymentRow>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.provider_session_id == session_id)
            .cloned())
    }

    async fn complete_checkout(&self, completion: &CheckoutCompletion) -> StoreResult<Settlement> {
        let mut state = self.state.lock().await;

        if !state.users.iter().any(|u| u.id == completion.user_id) {
            return Err(StoreError::Conflict(format!(
                "user {} not found while granting credits",
                completion.user_id
            )));
        }

        let existing = state
            .payments
            .iter_mut()
            .find(|p| p.provider_session_id == completion.provider_session_id);

        let payment_id = match existing {
            Some(payment) if payment.is_completed() => {
                return Ok(Settlement::AlreadyCompleted {
                    payment_id: payment.id,
                });
            }
            Some(payment) => {
                payment.status = PaymentStatus::Completed.as_str().to_string();
                payment.provider_payment_intent_id = completion.provider_payment_intent_id.clone();
                payment.amount = completion.amount;
                payment.currency = completion.currency.clone();
                payment.credits_granted = completion.credits;
                payment.id
            }
            None => {
                let id = Uuid::new_v4();
                state.payments.push(PaymentRow {
                    id,
                    user_id: completion.user_id.clone(),
                    provider_session_id: completion.provider_session_id.clone(),
                    provider_payment_intent_id: completion.provider_payment_intent_id.clone(),
                    amount: completion.amount,
                    currency: completion.currency.clone(),
                    status: PaymentStatus::Completed.as_str().to_string(),
                    credits_granted: completion.credits,
                    created_at: Utc::now(),
                });
                id
            }
        };

        if let Some(user) = state.users.iter_mut().find(|u| u.id == completion.user_id) {
            user.paid_credits_remaining += completion.credits;
        }
        state.writes += 1;
        Ok(Settlement::Granted {
            payment_id,
            credits: completion.credits,
        })
    }

    async fn fail_checkout(&self, session_id: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(payment) = state.payments.iter_mut().find(|p| {
            p.provider_session_id == session_id && p.status == PaymentStatus::Pending.as_str()
        }) else {
            return Ok(false);
        };
        payment.status = PaymentStatus::Failed.as_str().to_string();
        state.writes += 1;
        Ok(true)
    }

    async fn list_payments(&self, user_id: &str) -> StoreResult<Vec<PaymentRow>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn completed_revenue_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.is_completed() && p.created_at >= since)
            .map(|p| p.amount)
            .sum())
    }

    async fn create_prompt_version(
        &self,
        version: &NewPromptVersion,
    ) -> StoreResult<PromptVersionRow> {
        let mut state = self.state.lock().await;
        if version.is_default && state.prompt_versions.iter().any(|v| v.is_default) {
            return Err(StoreError::Conflict(
                "a default prompt version already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let row = PromptVersionRow {
            id: Uuid::new_v4(),
            name: version.name.clone(),
            description: version.description.clone(),
            system_prompt: version.system_prompt.clone(),
            user_prompt_template: version.user_prompt_template.clone(),
            is_active: false,
            is_default: version.is_default,
            created_by: version.created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        state.prompt_versions.push(row.clone());
        state.writes += 1;
        Ok(row)
    }

    async fn get_prompt_version(&self, id: Uuid) -> StoreResult<Option<PromptVersionRow>> {
        let state = self.state.lock().await;
        Ok(state.prompt_versions.iter().find(|v| v.id == id).cloned())
    }

    async fn list_prompt_versions(&self) -> StoreResult<Vec<PromptVersionRow>> {
        Ok(self.state.lock().await.prompt_versions.clone())
    }

    async fn activate_prompt_version(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if !state.prompt_versions.iter().any(|v| v.id == id) {
            return Ok(false);
        }
        let now = Utc::now();
        for version in state.prompt_versions.iter_mut() {
            let active = version.id == id;
            if version.is_active != active {
                version.is_active = active;
                version.updated_at = now;
            }
        }
        state.writes += 1;
        Ok(true)
    }

    async fn active_prompt_version(&self) -> StoreResult<Option<PromptVersionRow>> {
        let state = self.state.lock().await;
        Ok(state.prompt_versions.iter().find(|v| v.is_active).cloned())
    }

    async fn default_prompt_version(&self) -> StoreResult<Option<PromptVersionRow>> {
        let state = self.state.lock().await;
        Ok(state.prompt_versions.iter().find(|v| v.is_default).cloned())
    }

    async fn create_prompt_test_run(
        &self,
        run: &NewPromptTestRun,
    ) -> StoreResult<PromptTestRunRow> {
        let mut state = self.state.lock().await;
        let row = PromptTestRunRow {
            id: Uuid::new_v4(),
            prompt_version_id: run.prompt_version_id,
            test_input: run.test_input.clone(),
            target_industry: run.target_industry.clone(),
            target_role: run.target_role.clone(),
            output: run.output.clone(),
            execution_time_ms: run.execution_time_ms,
            created_by: Some(run.created_by.clone()),
            created_at: Utc::now(),
        };
        state.prompt_test_runs.push(row.clone());
        state.writes += 1;
        Ok(row)
    }

    async fn list_prompt_test_runs(&self, version_id: Uuid) -> StoreResult<Vec<PromptTestRunRow>> {
        let state = self.state.lock().await;
        Ok(state
            .prompt_test_runs
            .iter()
            .filter(|t| t.prompt_version_id == version_id)
            .cloned()
            .collect())
    }

    // Events are an append-only log and do not count towards `writes`.
    async fn insert_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.events.push(AnalyticsEventRow {
            id: Uuid::new_v4(),
            event_type: event.event_type.clone(),
            user_id: event.user_id.clone(),
            metadata: event.metadata.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn count_events_by_type(&self, since: DateTime<Utc>) -> StoreResult<Vec<EventTypeCount>> {
        let state = self.state.lock().await;
        let mut counts: Vec<EventTypeCount> = Vec::new();
        for event in state.events.iter().filter(|e| e.created_at >= since) {
            match counts.iter_mut().find(|c| c.event_type == event.event_type) {
                Some(c) => c.count += 1,
                None => counts.push(EventTypeCount {
                    event_type: event.event_type.clone(),
                    count: 1,
                }),
            }
        }
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(counts)
    }
}
