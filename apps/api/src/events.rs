//! Typed usage events. Services describe what happened with an `Event`; the injected
//! `EventRecorder` decides where it goes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::models::analytics::NewAnalyticsEvent;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Upload,
    Tailor,
    Checkout,
    Payment,
    Login,
    Signup,
    Prompt,
    Admin,
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Upload => "upload",
            EventCategory::Tailor => "tailor",
            EventCategory::Checkout => "checkout",
            EventCategory::Payment => "payment",
            EventCategory::Login => "login",
            EventCategory::Signup => "signup",
            EventCategory::Prompt => "prompt",
            EventCategory::Admin => "admin",
            EventCategory::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Handled without effect, e.g. a duplicate webhook delivery.
    Noop,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Noop => "noop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub category: EventCategory,
    pub outcome: Outcome,
    pub user_id: Option<String>,
    pub attributes: Map<String, Value>,
}

impl Event {
    pub fn new(category: EventCategory, outcome: Outcome) -> Self {
        Self {
            category,
            outcome,
            user_id: None,
            attributes: Map::new(),
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Never fails: losing an analytics row must not fail the request that produced it.
    async fn record(&self, event: Event);
}

/// Logs every event through `tracing` and appends it to the analytics table.
pub struct AnalyticsRecorder {
    store: Arc<dyn Store>,
}

impl AnalyticsRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventRecorder for AnalyticsRecorder {
    async fn record(&self, event: Event) {
        let metadata = Value::Object(event.attributes.clone());
        info!(
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            user_id = event.user_id.as_deref().unwrap_or("-"),
            attributes = %metadata,
            "event"
        );

        let mut stored = event.attributes;
        stored.insert(
            "outcome".to_string(),
            Value::String(event.outcome.as_str().to_string()),
        );
        let row = NewAnalyticsEvent {
            event_type: event.category.as_str().to_string(),
            user_id: event.user_id,
            metadata: Value::Object(stored),
        };
        if let Err(e) = self.store.insert_event(&row).await {
            warn!(event_type = %row.event_type, "Failed to persist analytics event: {e}");
        }
    }
}
