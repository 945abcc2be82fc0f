//! YoCo payment webhooks: signature verification and event parsing.

pub mod event;
pub mod webhook;

pub use event::{PaymentEvent, PaymentMetadata, PaymentPayload, WebhookEvent};
pub use webhook::{
    sign, WebhookError, WebhookHeaders, WebhookVerifier, HEADER_ID, HEADER_SIGNATURE,
    HEADER_TIMESTAMP,
};
