use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::billing::catalog::{find_plan, Plan};
use crate::billing::provider::{CheckoutSessionRequest, PaymentProvider};
use crate::errors::AppError;
use crate::events::{Event, EventCategory, EventRecorder, Outcome};
use crate::models::payment::{CheckoutCompletion, NewPayment, Settlement};
use crate::models::user::User;
use crate::store::{Store, StoreError};

const SESSION_COMPLETED: &str = "checkout.session.completed";
const SESSION_ASYNC_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
const SESSION_EXPIRED: &str = "checkout.session.expired";
const SESSION_ASYNC_FAILED: &str = "checkout.session.async_payment_failed";

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
    pub plan: Plan,
}

/// What a verified webhook delivery did. Every variant is acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Granted { session_id: String, credits: i32 },
    Duplicate { session_id: String },
    Failed { session_id: String },
    Ignored { reason: String },
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl SessionObject {
    /// Metadata values come back as strings, but tolerate numbers too.
    fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn credits(&self) -> Option<i32> {
        self.metadata_str("credits")?
            .parse::<i32>()
            .ok()
            .filter(|c| *c > 0)
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    events: Arc<dyn EventRecorder>,
    app_base_url: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        events: Arc<dyn EventRecorder>,
        app_base_url: String,
    ) -> Self {
        Self {
            store,
            provider,
            events,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Opens a hosted checkout for a catalog plan and records it as a pending payment
    /// before handing back the URL.
    pub async fn create_checkout(
        &self,
        user: &User,
        plan_id: &str,
    ) -> Result<CheckoutResponse, AppError> {
        let plan = find_plan(plan_id).ok_or_else(|| AppError::invalid_plan(plan_id))?;

        let customer_id = self.ensure_customer(user).await?;
        let success_url = format!(
            "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.app_base_url
        );
        let cancel_url = format!("{}/billing/cancel", self.app_base_url);

        let session = self
            .provider
            .create_checkout_session(&CheckoutSessionRequest {
                customer_id: &customer_id,
                plan,
                user_id: &user.id,
                success_url: &success_url,
                cancel_url: &cancel_url,
            })
            .await
            .map_err(|e| {
                error!(user_id = %user.id, plan_id, "Checkout session creation failed: {e}");
                AppError::PaymentProvider(e.to_string())
            })?;

        self.store
            .create_pending_payment(&NewPayment {
                user_id: user.id.clone(),
                provider_session_id: session.id.clone(),
                amount: plan.amount,
                currency: plan.currency.to_string(),
                credits_granted: plan.credits,
            })
            .await?;

        info!(user_id = %user.id, plan_id, session_id = %session.id, "Checkout session opened");
        self.events
            .record(
                Event::new(EventCategory::Checkout, Outcome::Success)
                    .user(user.id.clone())
                    .attr("plan_id", plan.id)
                    .attr("amount", plan.amount)
                    .attr("credits", plan.credits)
                    .attr("session_id", session.id.clone()),
            )
            .await;

        Ok(CheckoutResponse {
            session_id: session.id,
            checkout_url: session.url,
            plan: *plan,
        })
    }

    async fn ensure_customer(&self, user: &User) -> Result<String, AppError> {
        if let Some(id) = user.billing_customer_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }

        let created = self
            .provider
            .create_customer(&user.email, &user.id)
            .await
            .map_err(|e| {
                error!(user_id = %user.id, "Billing customer creation failed: {e}");
                AppError::PaymentProvider(e.to_string())
            })?;

        // A concurrent checkout may have stored one first; use whichever won.
        self.store
            .set_billing_customer_id(&user.id, &created)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user.id)))
    }

    /// Verifies and applies a provider notification. Only a bad signature is an error;
    /// everything else is acknowledged so the provider stops redelivering.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        if let Err(reason) = self.provider.verify_webhook(payload, signature_header) {
            warn!(%reason, "Rejected webhook with invalid signature");
            return Err(AppError::InvalidSignature);
        }

        let event: WebhookEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Acknowledging unparseable webhook payload: {e}");
                return Ok(WebhookOutcome::Ignored {
                    reason: "unparseable payload".to_string(),
                });
            }
        };

        match event.event_type.as_str() {
            SESSION_COMPLETED | SESSION_ASYNC_SUCCEEDED => self.apply_completion(&event).await,
            SESSION_EXPIRED | SESSION_ASYNC_FAILED => self.apply_failure(&event).await,
            other => {
                info!(event_id = %event.id, event_type = other, "Ignoring unhandled webhook event");
                Ok(WebhookOutcome::Ignored {
                    reason: format!("unhandled event type {other}"),
                })
            }
        }
    }

    async fn apply_completion(&self, event: &WebhookEvent) -> Result<WebhookOutcome, AppError> {
        let Some(session) = self.parse_session(event).await else {
            return Ok(WebhookOutcome::Ignored {
                reason: "malformed session object".to_string(),
            });
        };

        // Completed with a delayed payment method: wait for async_payment_succeeded.
        if session.payment_status.as_deref() == Some("unpaid") {
            info!(event_id = %event.id, session_id = %session.id, "Checkout completed but unpaid, awaiting async payment");
            self.record_payment(event, &session, None, Outcome::Noop, "awaiting_payment")
                .await;
            return Ok(WebhookOutcome::Ignored {
                reason: "payment not yet settled".to_string(),
            });
        }

        let user_id = session.metadata_str("user_id");
        let (Some(user_id), Some(credits), Some(amount)) =
            (user_id.clone(), session.credits(), session.amount_total)
        else {
            warn!(event_id = %event.id, session_id = %session.id, "Completion event is missing user_id, credits or amount");
            self.record_payment(event, &session, user_id, Outcome::Failure, "malformed_metadata")
                .await;
            return Ok(WebhookOutcome::Ignored {
                reason: "missing metadata".to_string(),
            });
        };

        let completion = CheckoutCompletion {
            user_id: user_id.clone(),
            provider_session_id: session.id.clone(),
            provider_payment_intent_id: session.payment_intent.clone(),
            amount,
            currency: session.currency.clone().unwrap_or_else(|| "usd".to_string()),
            credits,
        };

        match self.store.complete_checkout(&completion).await {
            Ok(Settlement::Granted { payment_id, credits }) => {
                info!(%user_id, session_id = %session.id, %payment_id, credits, "Granted purchased credits");
                self.record_payment(event, &session, Some(user_id), Outcome::Success, "granted")
                    .await;
                Ok(WebhookOutcome::Granted {
                    session_id: session.id,
                    credits,
                })
            }
            Ok(Settlement::AlreadyCompleted { payment_id }) => {
                info!(%user_id, session_id = %session.id, %payment_id, "Duplicate completion, nothing granted");
                self.record_payment(event, &session, Some(user_id), Outcome::Noop, "duplicate")
                    .await;
                Ok(WebhookOutcome::Duplicate {
                    session_id: session.id,
                })
            }
            Err(StoreError::Conflict(reason)) => {
                error!(%user_id, session_id = %session.id, "Could not settle checkout: {reason}");
                self.record_payment(event, &session, Some(user_id), Outcome::Failure, "unknown_user")
                    .await;
                Ok(WebhookOutcome::Ignored {
                    reason: "user not found".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_failure(&self, event: &WebhookEvent) -> Result<WebhookOutcome, AppError> {
        let Some(session) = self.parse_session(event).await else {
            return Ok(WebhookOutcome::Ignored {
                reason: "malformed session object".to_string(),
            });
        };

        let user_id = session.metadata_str("user_id");
        if self.store.fail_checkout(&session.id).await? {
            info!(session_id = %session.id, event_type = %event.event_type, "Marked payment failed");
            self.record_payment(event, &session, user_id, Outcome::Failure, "failed")
                .await;
            Ok(WebhookOutcome::Failed {
                session_id: session.id,
            })
        } else {
            info!(session_id = %session.id, "No pending payment to fail");
            self.record_payment(event, &session, user_id, Outcome::Noop, "no_pending_payment")
                .await;
            Ok(WebhookOutcome::Ignored {
                reason: "no pending payment".to_string(),
            })
        }
    }

    async fn parse_session(&self, event: &WebhookEvent) -> Option<SessionObject> {
        match serde_json::from_value::<SessionObject>(event.data.object.clone()) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(event_id = %event.id, event_type = %event.event_type, "Malformed session object: {e}");
                self.events
                    .record(
                        Event::new(EventCategory::Payment, Outcome::Failure)
                            .attr("event_id", event.id.clone())
                            .attr("event_type", event.event_type.clone())
                            .attr("result", "malformed_session"),
                    )
                    .await;
                None
            }
        }
    }

    async fn record_payment(
        &self,
        event: &WebhookEvent,
        session: &SessionObject,
        user_id: Option<String>,
        outcome: Outcome,
        result: &str,
    ) {
        let mut recorded = Event::new(EventCategory::Payment, outcome)
            .attr("event_id", event.id.clone())
            .attr("event_type", event.event_type.clone())
            .attr("session_id", session.id.clone())
            .attr("result", result);
        if let Some(amount) = session.amount_total {
            recorded = recorded.attr("amount", amount);
        }
        if let Some(credits) = session.credits() {
            recorded = recorded.attr("credits", credits);
        }
        if let Some(user_id) = user_id {
            recorded = recorded.user(user_id);
        }
        self.events.record(recorded).await;
    }
}
