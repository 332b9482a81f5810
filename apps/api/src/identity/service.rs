use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::errors::AppError;
use crate::events::{Event, EventCategory, EventRecorder, Outcome};
use crate::models::user::{IdentityProfile, User};
use crate::store::Store;

/// How the principal was matched to a user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A row already carried this id.
    Existing,
    /// A row with the same email was re-keyed to this id.
    Migrated { previous_id: String },
    Created,
}

#[derive(Debug, Clone)]
pub struct SyncResult {
    pub user: User,
    pub outcome: SyncOutcome,
}

fn reject_deactivated(user: &User) -> Result<(), AppError> {
    if user.is_active() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Account is deactivated".to_string()))
    }
}

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn Store>,
    events: Arc<dyn EventRecorder>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventRecorder>) -> Self {
        Self { store, events }
    }

    /// Reconciles an authenticated principal with the user table.
    ///
    /// The identity provider can re-issue ids (e.g. after an account relink), so a
    /// principal with an unknown id but a known email takes over that email's row,
    /// together with everything the row owns.
    pub async fn sync(
        &self,
        candidate_id: &str,
        profile: IdentityProfile,
    ) -> Result<SyncResult, AppError> {
        let candidate_id = candidate_id.trim();
        if candidate_id.is_empty() {
            return Err(AppError::Unauthenticated);
        }
        let profile = IdentityProfile {
            email: profile.email.trim().to_lowercase(),
            ..profile
        };

        if let Some(existing) = self.store.get_user(candidate_id).await? {
            reject_deactivated(&existing)?;
            let (user, _) = self.store.upsert_user(candidate_id, &profile).await?;
            return Ok(self.finish(user, SyncOutcome::Existing).await);
        }

        if !profile.email.is_empty() {
            let holder = self
                .store
                .find_user_by_email(&profile.email)
                .await?
                .filter(|u| u.id != candidate_id);
            if let Some(existing) = holder {
                reject_deactivated(&existing)?;
                let previous_id = existing.id;
                info!(%previous_id, new_id = candidate_id, "Migrating user to new principal id");
                let user = self
                    .store
                    .migrate_user_id(&previous_id, candidate_id, &profile)
                    .await
                    .map_err(|e| {
                        error!(%previous_id, new_id = candidate_id, "User id migration rolled back: {e}");
                        AppError::from(e)
                    })?;
                return Ok(self.finish(user, SyncOutcome::Migrated { previous_id }).await);
            }
        }

        if profile.email.is_empty() || !profile.email.contains('@') {
            return Err(AppError::Validation(
                "A valid email is required to create an account".to_string(),
            ));
        }

        // Concurrent first syncs for one id converge here; only one sees `inserted`.
        let (user, inserted) = self.store.upsert_user(candidate_id, &profile).await?;
        let outcome = if inserted {
            SyncOutcome::Created
        } else {
            SyncOutcome::Existing
        };
        Ok(self.finish(user, outcome).await)
    }

    async fn finish(&self, user: User, outcome: SyncOutcome) -> SyncResult {
        let category = match outcome {
            SyncOutcome::Created => EventCategory::Signup,
            _ => EventCategory::Login,
        };
        let mut event = Event::new(category, Outcome::Success).user(user.id.clone());
        if let SyncOutcome::Migrated { previous_id } = &outcome {
            event = event.attr("migrated_from", previous_id.clone());
        }
        self.events.record(event).await;

        SyncResult { user, outcome }
    }
}
