//! Webhook event payloads.

use serde::{Deserialize, Serialize};

use shopfront_core::{CheckoutId, Currency};
use shopfront_orders::PaymentConfirmation;

use crate::webhook::WebhookError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default, rename = "checkoutId", alias = "checkout_id")]
    pub checkout_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Set on refund payloads: the payment being refunded.
    #[serde(default, rename = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: PaymentPayload,
}

/// What the store needs to do for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded {
        checkout_id: CheckoutId,
        confirmation: PaymentConfirmation,
    },
    Failed {
        checkout_id: CheckoutId,
        payment_id: String,
    },
    Refunded {
        payment_id: String,
        amount_cents: i64,
    },
    /// Acknowledged but not acted on.
    Ignored { event_type: String },
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    fn checkout_id(&self) -> Result<CheckoutId, WebhookError> {
        let raw = self
            .payload
            .metadata
            .as_ref()
            .and_then(|m| m.checkout_id.as_deref())
            .ok_or_else(|| WebhookError::InvalidPayload("metadata.checkoutId missing".into()))?;
        raw.parse()
            .map_err(|_| WebhookError::InvalidPayload(format!("invalid checkoutId '{raw}'")))
    }

    pub fn classify(&self) -> Result<PaymentEvent, WebhookError> {
        match self.event_type.as_str() {
            "payment.succeeded" => {
                let currency: Currency = self
                    .payload
                    .currency
                    .as_deref()
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| WebhookError::InvalidPayload("unsupported currency".into()))?;
                Ok(PaymentEvent::Succeeded {
                    checkout_id: self.checkout_id()?,
                    confirmation: PaymentConfirmation {
                        payment_id: self.payload.id.clone(),
                        amount_cents: self.payload.amount,
                        currency,
                    },
                })
            }
            "payment.failed" => Ok(PaymentEvent::Failed {
                checkout_id: self.checkout_id()?,
                payment_id: self.payload.id.clone(),
            }),
            "refund.succeeded" => Ok(PaymentEvent::Refunded {
                payment_id: self
                    .payload
                    .payment_id
                    .clone()
                    .ok_or_else(|| WebhookError::InvalidPayload("paymentId missing".into()))?,
                amount_cents: self.payload.amount,
            }),
            other => Ok(PaymentEvent::Ignored { event_type: other.to_string() }),
        }
    }
}
