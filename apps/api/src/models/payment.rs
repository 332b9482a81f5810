use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub user_id: String,
    pub provider_session_id: String,
    pub provider_payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub credits_granted: i32,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// A checkout that has been opened at the provider but not yet confirmed.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: String,
    pub provider_session_id: String,
    pub amount: i64,
    pub currency: String,
    pub credits_granted: i32,
}

/// The facts a "checkout completed" notification carries.
#[derive(Debug, Clone)]
pub struct CheckoutCompletion {
    pub user_id: String,
    pub provider_session_id: String,
    pub provider_payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub credits: i32,
}

/// Result of applying a completion to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The payment moved to `completed` and credits were granted.
    Granted { payment_id: Uuid, credits: i32 },
    /// The session had already been completed; nothing changed.
    AlreadyCompleted { payment_id: Uuid },
}
