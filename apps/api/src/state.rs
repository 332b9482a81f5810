use std::sync::Arc;

use crate::billing::checkout::CheckoutService;
use crate::billing::provider::PaymentProvider;
use crate::config::Config;
use crate::events::{AnalyticsRecorder, EventRecorder};
use crate::generation::generator::GenerationService;
use crate::identity::service::IdentityService;
use crate::ledger::Ledger;
use crate::llm_client::LanguageModel;
use crate::registry::service::PromptRegistry;
use crate::resumes::extraction::TextExtractor;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
/// Services hold no mutable state of their own; everything durable lives in the store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn EventRecorder>,
    pub extractor: Arc<dyn TextExtractor>,
    pub generator: GenerationService,
    pub ledger: Ledger,
    pub registry: PromptRegistry,
    pub checkout: CheckoutService,
    pub identity: IdentityService,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LanguageModel>,
        payments: Arc<dyn PaymentProvider>,
        extractor: Arc<dyn TextExtractor>,
        config: Config,
    ) -> Self {
        let events: Arc<dyn EventRecorder> = Arc::new(AnalyticsRecorder::new(store.clone()));
        let generator = GenerationService::new(llm, store.clone(), config.llm_timeout);

        AppState {
            ledger: Ledger::new(store.clone()),
            registry: PromptRegistry::new(store.clone(), generator.clone(), events.clone()),
            checkout: CheckoutService::new(
                store.clone(),
                payments,
                events.clone(),
                config.app_base_url.clone(),
            ),
            identity: IdentityService::new(store.clone(), events.clone()),
            generator,
            store,
            events,
            extractor,
            config,
        }
    }
}
