//! Entitlement ledger. Decides whether a generation may run and debits exactly one
//! entitlement once it has succeeded.
//!
//! Reservation is a read-only precondition evaluated before the model call. The debit
//! happens in `Ledger::settle`, together with the revision insert, only after the
//! generation produced text. A failed generation therefore never touches the counters.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::AppError;
use crate::models::resume::{NewRevision, RevisionRow};
use crate::models::user::User;
use crate::store::Store;

/// Generations every account gets before it needs purchased credits.
pub const FREE_LIMIT: i32 = 3;

/// Which bucket a generation is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionSource {
    Free,
    Paid,
}

/// A user's remaining entitlements, as shown on the account page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub free_remaining: i32,
    pub paid_credits_remaining: i32,
    pub total: i32,
}

impl Entitlement {
    pub fn of(user: &User) -> Self {
        let free_remaining = (FREE_LIMIT - user.free_uses_consumed).max(0);
        let paid_credits_remaining = user.paid_credits_remaining.max(0);
        Self {
            free_remaining,
            paid_credits_remaining,
            total: free_remaining + paid_credits_remaining,
        }
    }
}

/// Picks the bucket the next generation will be charged to, preferring the free tier.
/// Fails with an entitlement-exhausted `Forbidden` when nothing is left. Mutates nothing.
pub fn check_and_reserve(user: &User) -> Result<ConsumptionSource, AppError> {
    let entitlement = Entitlement::of(user);
    if entitlement.total <= 0 {
        return Err(AppError::entitlement_exhausted());
    }
    if entitlement.free_remaining > 0 {
        Ok(ConsumptionSource::Free)
    } else {
        Ok(ConsumptionSource::Paid)
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Debits one entitlement from `source` and stores the revision it paid for.
    ///
    /// The store applies a floor-checked decrement. A free reservation that lost the last
    /// free use to a concurrent request is charged to a paid credit when one is left;
    /// when nothing is left this fails with the exhausted error and nothing is written.
    pub async fn settle(
        &self,
        source: ConsumptionSource,
        revision: &NewRevision,
    ) -> Result<RevisionRow, AppError> {
        self.store
            .settle_generation(source, FREE_LIMIT, revision)
            .await?
            .ok_or_else(AppError::entitlement_exhausted)
    }
}
