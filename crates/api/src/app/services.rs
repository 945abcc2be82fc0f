//! Service wiring: stores, event bus and the optional external clients.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use shopfront_core::Currency;
use shopfront_events::{EventBus, InMemoryEventBus, StoreEvent, Topic};
use shopfront_infra::{AppConfig, Stores};
use shopfront_lockers::{
    CachedGeocoder, GeocodeError, Geocoder, LockerProvider, NominatimGeocoder, ProviderError,
    PudoHttpProvider,
};
use shopfront_orders::ShippingRates;
use shopfront_payments::{WebhookError, WebhookVerifier};

const GEOCODE_CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("webhook secret: {0}")]
    Webhook(#[from] WebhookError),
    #[error("locker provider: {0}")]
    Lockers(#[from] ProviderError),
    #[error("geocoder: {0}")]
    Geocoder(#[from] GeocodeError),
}

/// Shared state handed to every handler via `Extension`.
pub struct AppServices {
    pub stores: Stores,
    pub bus: Arc<InMemoryEventBus<StoreEvent>>,
    pub currency: Currency,
    pub rates: ShippingRates,
    /// `None` when no webhook secret is configured; webhooks answer 503.
    pub webhooks: Option<WebhookVerifier>,
    pub locker_provider: Option<Arc<dyn LockerProvider>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl AppServices {
    /// Stores plus defaults; external clients are attached with the `with_*` builders.
    pub fn new(stores: Stores, currency: Currency, rates: ShippingRates) -> Self {
        Self {
            stores,
            bus: Arc::new(InMemoryEventBus::new()),
            currency,
            rates,
            webhooks: None,
            locker_provider: None,
            geocoder: None,
        }
    }

    pub fn from_config(config: &AppConfig, stores: Stores) -> Result<Self, SetupError> {
        let rates = ShippingRates {
            courier_cents: config.courier_rate_cents,
            locker_cents: config.locker_rate_cents,
        };
        let mut services = Self::new(stores, config.currency, rates);

        match &config.webhook_secret {
            Some(secret) => {
                services.webhooks = Some(WebhookVerifier::new(secret, config.webhook_tolerance_secs)?);
            }
            None => warn!("YOCO_WEBHOOK_SECRET not set; payment webhooks are disabled"),
        }
        if let Some(pudo) = &config.pudo {
            let provider = PudoHttpProvider::new(&pudo.api_url, &pudo.api_key)?;
            services.locker_provider = Some(Arc::new(provider));
        }
        if let Some(url) = &config.geocoder_url {
            let cached = CachedGeocoder::new(
                NominatimGeocoder::new(url)?,
                GEOCODE_CACHE_CAPACITY,
                config.geocoder_cache_ttl,
            );
            services.geocoder = Some(Arc::new(cached));
        }
        Ok(services)
    }

    pub fn with_webhooks(mut self, verifier: WebhookVerifier) -> Self {
        self.webhooks = Some(verifier);
        self
    }

    pub fn with_locker_provider(mut self, provider: Arc<dyn LockerProvider>) -> Self {
        self.locker_provider = Some(provider);
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Publish a committed change. Delivery is best effort: the write has
    /// already happened, so a failure is only logged.
    pub fn emit(&self, topic: Topic, entity_id: impl Into<Uuid>, payload: &impl Serialize) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(topic = topic.as_str(), error = %e, "event payload not serializable");
                return;
            }
        };
        let event = StoreEvent::new(topic, entity_id, Utc::now(), payload);
        if let Err(e) = self.bus.publish(event) {
            warn!(topic = topic.as_str(), error = ?e, "event publish failed");
        }
    }
}
