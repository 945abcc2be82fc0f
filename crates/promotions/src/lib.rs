//! Promotions: discount rules and cart evaluation.

pub mod evaluate;
pub mod promotion;

pub use evaluate::{evaluate, AppliedPromotion, CartLine, PromotionCart, PromotionOutcome};
pub use promotion::{
    normalize_code, NewPromotion, Promotion, PromotionKind, PromotionUpdate,
};
