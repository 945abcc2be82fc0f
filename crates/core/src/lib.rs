//! `shopfront-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod money;
pub mod page;
pub mod patch;
pub mod slug;
pub mod version;

pub use error::{DomainError, DomainResult, FieldError, ValidationErrors};
pub use id::{
    AttributeId, AttributeValueId, CheckoutId, DraftId, ImageId, OrderId, OrderLineId, ProductId,
    PromotionId, ShipmentId, SupplierOrderId, UserId, VariantId,
};
pub use money::{Currency, Money};
pub use page::{Page, Paged};
pub use slug::{is_valid_slug, slugify};
pub use version::ExpectedVersion;
