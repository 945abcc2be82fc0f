//! Promotion definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::patch::double_option;
use shopfront_core::{DomainResult, ProductId, PromotionId, ValidationErrors};

/// What a promotion gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionKind {
    /// 1..=10000 basis points (10000 = 100%).
    PercentageOff { basis_points: u32 },
    FixedAmountOff { amount_cents: i64 },
    FreeShipping,
}

impl PromotionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionKind::PercentageOff { .. } => "percentage_off",
            PromotionKind::FixedAmountOff { .. } => "fixed_amount_off",
            PromotionKind::FreeShipping => "free_shipping",
        }
    }

    fn check(&self, errs: &mut ValidationErrors) {
        match *self {
            PromotionKind::PercentageOff { basis_points } => errs.check(
                (1..=10_000).contains(&basis_points),
                "kind.basis_points",
                "must be between 1 and 10000",
            ),
            PromotionKind::FixedAmountOff { amount_cents } => {
                errs.check(amount_cents > 0, "kind.amount_cents", "must be greater than zero")
            }
            PromotionKind::FreeShipping => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub name: String,
    /// `None` for automatic promotions.
    pub code: Option<String>,
    pub kind: PromotionKind,
    pub min_subtotal_cents: Option<i64>,
    pub min_quantity: Option<u32>,
    /// Restricts the discount to these products; empty means every product.
    pub product_ids: Vec<ProductId>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub active: bool,
    pub stackable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    pub fn is_automatic(&self) -> bool {
        self.code.is_none()
    }

    /// Active and inside its time window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.is_none_or(|s| now >= s)
            && self.ends_at.is_none_or(|e| now < e)
    }

    pub fn has_capacity(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.usage_count < limit)
    }

    pub fn applies_to(&self, product_id: ProductId) -> bool {
        self.product_ids.is_empty() || self.product_ids.contains(&product_id)
    }

    pub fn matches_code(&self, code: Option<&str>) -> bool {
        match (&self.code, code) {
            (None, _) => true,
            (Some(own), Some(given)) => own.eq_ignore_ascii_case(given.trim()),
            (Some(_), None) => false,
        }
    }

    /// Count one redemption.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.updated_at = now;
    }

    pub fn apply_update(&mut self, update: PromotionUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(name) = update.name {
            next.name = name.trim().to_string();
        }
        if let Some(code) = update.code {
            next.code = code.as_deref().map(normalize_code);
        }
        if let Some(kind) = update.kind {
            next.kind = kind;
        }
        if let Some(v) = update.min_subtotal_cents {
            next.min_subtotal_cents = v;
        }
        if let Some(v) = update.min_quantity {
            next.min_quantity = v;
        }
        if let Some(ids) = update.product_ids {
            next.product_ids = ids;
        }
        if let Some(v) = update.starts_at {
            next.starts_at = v;
        }
        if let Some(v) = update.ends_at {
            next.ends_at = v;
        }
        if let Some(v) = update.usage_limit {
            next.usage_limit = v;
        }
        if let Some(active) = update.active {
            next.active = active;
        }
        if let Some(stackable) = update.stackable {
            next.stackable = stackable;
        }
        next.validate()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = ValidationErrors::new();
        let name_len = self.name.trim().chars().count();
        errs.check((1..=120).contains(&name_len), "name", "must be 1 to 120 characters");
        if let Some(code) = &self.code {
            errs.check(
                is_valid_code(code),
                "code",
                "must be 3 to 32 characters of A-Z, 0-9, '-' or '_'",
            );
        }
        self.kind.check(&mut errs);
        if let Some(min) = self.min_subtotal_cents {
            errs.check(min >= 0, "min_subtotal_cents", "must not be negative");
        }
        if let Some(q) = self.min_quantity {
            errs.check(q >= 1, "min_quantity", "must be at least 1");
        }
        if let (Some(s), Some(e)) = (self.starts_at, self.ends_at) {
            errs.check(e > s, "ends_at", "must be after starts_at");
        }
        if let Some(limit) = self.usage_limit {
            errs.check(limit >= 1, "usage_limit", "must be at least 1");
        }
        errs.into_result()
    }
}

/// Uppercase, trimmed form used for storage and comparison.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn is_valid_code(code: &str) -> bool {
    (3..=32).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPromotion {
    pub name: String,
    pub code: Option<String>,
    pub kind: PromotionKind,
    pub min_subtotal_cents: Option<i64>,
    pub min_quantity: Option<u32>,
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub stackable: bool,
}

fn default_true() -> bool {
    true
}

impl NewPromotion {
    pub fn into_promotion(self, now: DateTime<Utc>) -> DomainResult<Promotion> {
        let promo = Promotion {
            id: PromotionId::new(),
            name: self.name.trim().to_string(),
            code: self
                .code
                .as_deref()
                .map(normalize_code)
                .filter(|c| !c.is_empty()),
            kind: self.kind,
            min_subtotal_cents: self.min_subtotal_cents,
            min_quantity: self.min_quantity,
            product_ids: self.product_ids,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            usage_limit: self.usage_limit,
            usage_count: 0,
            active: self.active,
            stackable: self.stackable,
            created_at: now,
            updated_at: now,
        };
        promo.validate()?;
        Ok(promo)
    }
}

/// Partial update; `null` clears nullable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PromotionUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub code: Option<Option<String>>,
    pub kind: Option<PromotionKind>,
    #[serde(default, deserialize_with = "double_option")]
    pub min_subtotal_cents: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub min_quantity: Option<Option<u32>>,
    pub product_ids: Option<Vec<ProductId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub usage_limit: Option<Option<u32>>,
    pub active: Option<bool>,
    pub stackable: Option<bool>,
}
