use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::ConsumptionSource;
use crate::models::analytics::{EventTypeCount, NewAnalyticsEvent};
use crate::models::payment::{CheckoutCompletion, NewPayment, PaymentRow, Settlement};
use crate::models::prompt::{
    NewPromptTestRun, NewPromptVersion, PromptTestRunRow, PromptVersionRow,
};
use crate::models::resume::{NewResume, NewRevision, ResumeRow, RevisionRow};
use crate::models::user::{IdentityProfile, Role, User, UserStatus};
use crate::store::{Store, StoreError, StoreResult};

/// Arbitrary key for the transaction-scoped advisory lock taken while activating a prompt.
const PROMPT_ACTIVATION_LOCK: i64 = 0x7072_6f6d_7074;

/// Tables whose user reference is rewritten when an identity migrates to a new id.
const USER_REFERENCES: &[(&str, &str)] = &[
    ("resumes", "user_id"),
    ("revisions", "user_id"),
    ("payments", "user_id"),
    ("analytics_events", "user_id"),
    ("prompt_versions", "created_by"),
    ("prompt_test_runs", "created_by"),
];

#[derive(FromRow)]
struct UpsertedUser {
    #[sqlx(flatten)]
    user: User,
    inserted: bool,
}

#[derive(FromRow)]
struct CompletedPayment {
    id: Uuid,
    user_id: String,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }
}

/// Turns unique/foreign-key violations into `StoreError::Conflict`.
fn conflict_on_constraint(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
            return StoreError::Conflict(format!("{what}: {}", db_err.message()));
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn upsert_user(&self, id: &str, profile: &IdentityProfile) -> StoreResult<(User, bool)> {
        // xmax = 0 only for a freshly inserted tuple.
        let row = sqlx::query_as::<_, UpsertedUser>(
            r#"
            INSERT INTO users (id, email, first_name, last_name, avatar_url, last_login_at)
            VALUES ($1, $2, NULLIF($3, ''), NULLIF($4, ''), NULLIF($5, ''), now())
            ON CONFLICT (id) DO UPDATE SET
                email = COALESCE(NULLIF(EXCLUDED.email, ''), users.email),
                first_name = COALESCE(EXCLUDED.first_name, users.first_name),
                last_name = COALESCE(EXCLUDED.last_name, users.last_name),
                avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url),
                last_login_at = now(),
                updated_at = now()
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(id)
        .bind(&profile.email)
        .bind(profile.first_name.as_deref().unwrap_or_default())
        .bind(profile.last_name.as_deref().unwrap_or_default())
        .bind(profile.avatar_url.as_deref().unwrap_or_default())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, "user upsert"))?;

        Ok((row.user, row.inserted))
    }

    async fn migrate_user_id(
        &self,
        old_id: &str,
        new_id: &str,
        profile: &IdentityProfile,
    ) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        // FKs to users(id) are DEFERRABLE; checking them at commit lets the primary key
        // and its references move in any order within this transaction.
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut *tx)
            .await?;

        let moved = sqlx::query("UPDATE users SET id = $1, updated_at = now() WHERE id = $2")
            .bind(new_id)
            .bind(old_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_constraint(e, "user id migration"))?;

        if moved.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!(
                "user {old_id} disappeared during id migration"
            )));
        }

        for (table, column) in USER_REFERENCES {
            let result = sqlx::query(&format!(
                "UPDATE {table} SET {column} = $1 WHERE {column} = $2"
            ))
            .bind(new_id)
            .bind(old_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_constraint(e, "user reference rewrite"))?;

            if result.rows_affected() > 0 {
                info!(
                    table = *table,
                    rows = result.rows_affected(),
                    "Rewrote user references during id migration"
                );
            }
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE(NULLIF($2, ''), first_name),
                last_name = COALESCE(NULLIF($3, ''), last_name),
                avatar_url = COALESCE(NULLIF($4, ''), avatar_url),
                last_login_at = now(),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(new_id)
        .bind(profile.first_name.as_deref().unwrap_or_default())
        .bind(profile.last_name.as_deref().unwrap_or_default())
        .bind(profile.avatar_url.as_deref().unwrap_or_default())
        .fetch_one(&mut *tx)
        .await?;

        // Deferred constraints are checked here; a violation rolls everything back.
        tx.commit()
            .await
            .map_err(|e| conflict_on_constraint(e, "user id migration commit"))?;

        Ok(user)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_user_status(&self, id: &str, status: UserStatus) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_user_role(&self, id: &str, role: Role) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET role = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(role.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_billing_customer_id(
        &self,
        id: &str,
        customer_id: &str,
    ) -> StoreResult<Option<String>> {
        Ok(sqlx::query_scalar::<_, Option<String>>(
            r#"
            UPDATE users
            SET billing_customer_id = COALESCE(billing_customer_id, $1), updated_at = now()
            WHERE id = $2
            RETURNING billing_customer_id
            "#,
        )
        .bind(customer_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .flatten())
    }

    async fn settle_generation(
        &self,
        source: ConsumptionSource,
        free_limit: i32,
        revision: &NewRevision,
    ) -> StoreResult<Option<RevisionRow>> {
        let mut tx = self.pool.begin().await?;

        // Conditional UPDATEs: concurrent requests serialize on the row lock and the
        // loser re-evaluates the floor check against the committed value. A free
        // reservation that lost the last free use falls through to a paid credit.
        let mut charged = None;
        if source == ConsumptionSource::Free {
            let debited = sqlx::query(
                r#"
                UPDATE users
                SET free_uses_consumed = free_uses_consumed + 1, updated_at = now()
                WHERE id = $1 AND free_uses_consumed < $2
                "#,
            )
            .bind(&revision.user_id)
            .bind(free_limit)
            .execute(&mut *tx)
            .await?;
            if debited.rows_affected() > 0 {
                charged = Some(ConsumptionSource::Free);
            }
        }
        if charged.is_none() {
            let debited = sqlx::query(
                r#"
                UPDATE users
                SET paid_credits_remaining = paid_credits_remaining - 1, updated_at = now()
                WHERE id = $1 AND paid_credits_remaining > 0
                "#,
            )
            .bind(&revision.user_id)
            .execute(&mut *tx)
            .await?;
            if debited.rows_affected() > 0 {
                charged = Some(ConsumptionSource::Paid);
            }
        }

        let Some(charged) = charged else {
            tx.rollback().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, RevisionRow>(
            r#"
            INSERT INTO revisions
                (id, resume_id, user_id, target_industry, target_role,
                 tailored_content, was_free, prompt_version_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(revision.resume_id)
        .bind(&revision.user_id)
        .bind(&revision.target_industry)
        .bind(&revision.target_role)
        .bind(&revision.tailored_content)
        .bind(charged == ConsumptionSource::Free)
        .bind(revision.prompt_version_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn create_resume(&self, resume: &NewResume) -> StoreResult<ResumeRow> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resumes (id, user_id, original_filename, file_type, extracted_text)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&resume.user_id)
        .bind(&resume.original_filename)
        .bind(resume.file_type.as_str())
        .bind(&resume.extracted_text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_resume(&self, id: Uuid, user_id: &str) -> StoreResult<Option<ResumeRow>> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_resumes(&self, user_id: &str) -> StoreResult<Vec<ResumeRow>> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_resume(&self, id: Uuid, user_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_revisions(
        &self,
        user_id: &str,
        resume_id: Option<Uuid>,
    ) -> StoreResult<Vec<RevisionRow>> {
        Ok(sqlx::query_as::<_, RevisionRow>(
            r#"
            SELECT * FROM revisions
            WHERE user_id = $1 AND ($2::uuid IS NULL OR resume_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(resume_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_pending_payment(&self, payment: &NewPayment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, user_id, provider_session_id, amount, currency, status, credits_granted)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            ON CONFLICT (provider_session_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&payment.user_id)
        .bind(&payment.provider_session_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.credits_granted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_payment_by_session(&self, session_id: &str) -> StoreResult<Option<PaymentRow>> {
        Ok(sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE provider_session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn complete_checkout(&self, completion: &CheckoutCompletion) -> StoreResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        // Inserts the row if the webhook beat the checkout response, otherwise flips it.
        // The WHERE on the conflict branch makes an already-completed row yield nothing,
        // and the row lock makes a concurrent duplicate wait and then yield nothing too.
        let transitioned = sqlx::query_as::<_, CompletedPayment>(
            r#"
            INSERT INTO payments
                (id, user_id, provider_session_id, provider_payment_intent_id,
                 amount, currency, status, credits_granted)
            VALUES ($1, $2, $3, $4, $5, $6, 'completed', $7)
            ON CONFLICT (provider_session_id) DO UPDATE SET
                status = 'completed',
                provider_payment_intent_id = EXCLUDED.provider_payment_intent_id,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                credits_granted = EXCLUDED.credits_granted
            WHERE payments.status <> 'completed'
            RETURNING id, user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&completion.user_id)
        .bind(&completion.provider_session_id)
        .bind(&completion.provider_payment_intent_id)
        .bind(completion.amount)
        .bind(&completion.currency)
        .bind(completion.credits)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_on_constraint(e, "payment completion"))?;

        let Some(payment) = transitioned else {
            tx.rollback().await?;
            let existing = self
                .get_payment_by_session(&completion.provider_session_id)
                .await?
                .ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "payment for session {} vanished",
                        completion.provider_session_id
                    ))
                })?;
            return Ok(Settlement::AlreadyCompleted {
                payment_id: existing.id,
            });
        };

        if payment.user_id != completion.user_id {
            warn!(
                payment_id = %payment.id,
                row_user = %payment.user_id,
                event_user = %completion.user_id,
                "Checkout metadata user differs from payment row; crediting metadata user"
            );
        }

        let granted = sqlx::query(
            r#"
            UPDATE users
            SET paid_credits_remaining = paid_credits_remaining + $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(completion.credits)
        .bind(&completion.user_id)
        .execute(&mut *tx)
        .await?;

        if granted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!(
                "user {} not found while granting credits",
                completion.user_id
            )));
        }

        tx.commit().await?;
        Ok(Settlement::Granted {
            payment_id: payment.id,
            credits: completion.credits,
        })
    }

    async fn fail_checkout(&self, session_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'failed' WHERE provider_session_id = $1 AND status = 'pending'",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_payments(&self, user_id: &str) -> StoreResult<Vec<PaymentRow>> {
        Ok(sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn completed_revenue_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payments WHERE status = 'completed' AND created_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_prompt_version(
        &self,
        version: &NewPromptVersion,
    ) -> StoreResult<PromptVersionRow> {
        sqlx::query_as::<_, PromptVersionRow>(
            r#"
            INSERT INTO prompt_versions
                (id, name, description, system_prompt, user_prompt_template,
                 is_active, is_default, created_by)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&version.name)
        .bind(&version.description)
        .bind(&version.system_prompt)
        .bind(&version.user_prompt_template)
        .bind(version.is_default)
        .bind(&version.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, "prompt version insert"))
    }

    async fn get_prompt_version(&self, id: Uuid) -> StoreResult<Option<PromptVersionRow>> {
        Ok(
            sqlx::query_as::<_, PromptVersionRow>("SELECT * FROM prompt_versions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_prompt_versions(&self) -> StoreResult<Vec<PromptVersionRow>> {
        Ok(sqlx::query_as::<_, PromptVersionRow>(
            "SELECT * FROM prompt_versions ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn activate_prompt_version(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Serializes activations so two concurrent calls cannot each clear a stale
        // snapshot and then both set a row active.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PROMPT_ACTIVATION_LOCK)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE prompt_versions SET is_active = FALSE, updated_at = now() WHERE is_active",
        )
        .execute(&mut *tx)
        .await?;

        let activated = sqlx::query(
            "UPDATE prompt_versions SET is_active = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if activated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn active_prompt_version(&self) -> StoreResult<Option<PromptVersionRow>> {
        Ok(sqlx::query_as::<_, PromptVersionRow>(
            "SELECT * FROM prompt_versions WHERE is_active LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn default_prompt_version(&self) -> StoreResult<Option<PromptVersionRow>> {
        Ok(sqlx::query_as::<_, PromptVersionRow>(
            "SELECT * FROM prompt_versions WHERE is_default LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_prompt_test_run(
        &self,
        run: &NewPromptTestRun,
    ) -> StoreResult<PromptTestRunRow> {
        Ok(sqlx::query_as::<_, PromptTestRunRow>(
            r#"
            INSERT INTO prompt_test_runs
                (id, prompt_version_id, test_input, target_industry, target_role,
                 output, execution_time_ms, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(run.prompt_version_id)
        .bind(&run.test_input)
        .bind(&run.target_industry)
        .bind(&run.target_role)
        .bind(&run.output)
        .bind(run.execution_time_ms)
        .bind(&run.created_by)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_prompt_test_runs(&self, version_id: Uuid) -> StoreResult<Vec<PromptTestRunRow>> {
        Ok(sqlx::query_as::<_, PromptTestRunRow>(
            "SELECT * FROM prompt_test_runs WHERE prompt_version_id = $1 ORDER BY created_at DESC",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO analytics_events (id, event_type, user_id, metadata) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(&event.event_type)
        .bind(&event.user_id)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_events_by_type(&self, since: DateTime<Utc>) -> StoreResult<Vec<EventTypeCount>> {
        Ok(sqlx::query_as::<_, EventTypeCount>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM analytics_events
            WHERE created_at >= $1
            GROUP BY event_type
            ORDER BY count DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }
}
