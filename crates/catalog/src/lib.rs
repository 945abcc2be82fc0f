//! Catalog domain: attributes, mutable product drafts, published products and
//! the draft -> product publication plan.
//!
//! Everything here is pure; persistence and the publication transaction live
//! in `shopfront-infra`.

pub mod attribute;
pub mod draft;
pub mod product;
pub mod publication;

pub use attribute::{
    Attribute, AttributeKind, AttributeUpdate, AttributeValue, NewAttribute, NewAttributeValue,
};
pub use draft::{
    DraftAttribute, DraftImage, DraftPatch, DraftStatus, DraftVariant, NewDraft, ProductDraft,
    SupplierInfo, VariantOption, MAX_WIZARD_STEP,
};
pub use product::{
    Product, ProductAttributeValue, ProductDetail, ProductFilter, ProductImage, ProductStatus,
    ProductVariant, PricedItem,
};
pub use publication::{PublicationPlan, PublishOutcome};
