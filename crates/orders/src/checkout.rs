//! Storefront checkouts.
//!
//! A checkout freezes cart pricing server-side before the shopper pays. The
//! payment webhook later turns a pending checkout into an order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_catalog::ProductDetail;
use shopfront_core::{
    CheckoutId, Currency, DomainError, DomainResult, Money, ProductId, PromotionId,
    ValidationErrors, VariantId,
};
use shopfront_promotions::{evaluate, CartLine, Promotion, PromotionCart};

const MAX_LINES: usize = 50;
const MAX_QUANTITY: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

impl Customer {
    fn check(&self, errs: &mut ValidationErrors) {
        errs.check(is_plausible_email(&self.email), "customer.email", "must be a valid email address");
        let len = self.name.trim().chars().count();
        errs.check((1..=120).contains(&len), "customer.name", "must be 1 to 120 characters");
        if let Some(phone) = &self.phone {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            errs.check((9..=15).contains(&digits), "customer.phone", "must have 9 to 15 digits");
        }
    }

    /// Case-insensitive email match used by the public tracking lookup.
    pub fn email_matches(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub suburb: Option<String>,
    pub city: String,
    pub province: Option<String>,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "ZA".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    Courier { address: ShippingAddress },
    Locker { locker_code: String },
}

impl Delivery {
    pub fn locker_code(&self) -> Option<&str> {
        match self {
            Delivery::Locker { locker_code } => Some(locker_code),
            Delivery::Courier { .. } => None,
        }
    }

    fn check(&self, errs: &mut ValidationErrors) {
        match self {
            Delivery::Courier { address } => {
                errs.check(!address.line1.trim().is_empty(), "delivery.address.line1", "required");
                errs.check(!address.city.trim().is_empty(), "delivery.address.city", "required");
                errs.check(
                    !address.postal_code.trim().is_empty(),
                    "delivery.address.postal_code",
                    "required",
                );
            }
            Delivery::Locker { locker_code } => {
                errs.check(!locker_code.trim().is_empty(), "delivery.locker_code", "required")
            }
        }
    }
}

/// Flat shipping fees per delivery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingRates {
    pub courier_cents: i64,
    pub locker_cents: i64,
}

impl ShippingRates {
    pub fn for_delivery(&self, delivery: &Delivery, currency: Currency) -> Money {
        match delivery {
            Delivery::Courier { .. } => Money::new(self.courier_cents, currency),
            Delivery::Locker { .. } => Money::new(self.locker_cents, currency),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCheckout {
    pub customer: Customer,
    pub delivery: Delivery,
    pub items: Vec<CartItem>,
    pub promotion_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Pending => "pending",
            CheckoutStatus::Paid => "paid",
            CheckoutStatus::Failed => "failed",
            CheckoutStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CheckoutStatus::Pending),
            "paid" => Some(CheckoutStatus::Paid),
            "failed" => Some(CheckoutStatus::Failed),
            "expired" => Some(CheckoutStatus::Expired),
            _ => None,
        }
    }
}

/// A confirmed payment as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_id: String,
    pub amount_cents: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub id: CheckoutId,
    pub customer: Customer,
    pub delivery: Delivery,
    pub lines: Vec<CheckoutLine>,
    pub promotion_code: Option<String>,
    pub promotion_ids: Vec<PromotionId>,
    pub currency: Currency,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub grand_total: Money,
    pub status: CheckoutStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkout {
    /// Price a cart against the live catalog and promotions.
    ///
    /// `products` must hold the details of every product referenced by the
    /// cart; unknown products are reported as field errors.
    pub fn price(
        new: NewCheckout,
        products: &[ProductDetail],
        promotions: &[Promotion],
        rates: ShippingRates,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut errs = ValidationErrors::new();
        new.customer.check(&mut errs);
        new.delivery.check(&mut errs);
        errs.check(!new.items.is_empty(), "items", "cart is empty");
        errs.check(new.items.len() <= MAX_LINES, "items", "too many lines");

        // Merge repeated product/variant pairs, keeping first-seen order.
        let mut merged: Vec<CartItem> = Vec::new();
        let mut index: BTreeMap<(ProductId, Option<VariantId>), usize> = BTreeMap::new();
        for (i, item) in new.items.iter().enumerate() {
            errs.check(
                (1..=MAX_QUANTITY).contains(&item.quantity),
                format!("items[{i}].quantity"),
                format!("must be between 1 and {MAX_QUANTITY}"),
            );
            match index.get(&(item.product_id, item.variant_id)) {
                Some(&at) => merged[at].quantity = merged[at].quantity.saturating_add(item.quantity),
                None => {
                    index.insert((item.product_id, item.variant_id), merged.len());
                    merged.push(*item);
                }
            }
        }
        for (i, item) in merged.iter().enumerate() {
            if item.quantity > MAX_QUANTITY && !errs.has_field(&format!("items[{i}].quantity")) {
                errs.push(
                    format!("items[{i}].quantity"),
                    format!("combined quantity must not exceed {MAX_QUANTITY}"),
                );
            }
        }

        let mut lines = Vec::with_capacity(merged.len());
        for (i, item) in merged.iter().enumerate() {
            let Some(detail) = products.iter().find(|d| d.product.id == item.product_id) else {
                errs.push(format!("items[{i}].product_id"), "unknown product");
                continue;
            };
            let priced = match detail.price_for(item.variant_id) {
                Ok(p) => p,
                Err(DomainError::Validation(e)) => {
                    for fe in e.errors() {
                        errs.push(format!("items[{i}].{}", fe.field), fe.message.clone());
                    }
                    continue;
                }
                Err(other) => return Err(other),
            };
            if priced.unit_price.currency != currency {
                errs.push(format!("items[{i}].product_id"), "priced in another currency");
                continue;
            }
            if priced.stock_quantity < i64::from(item.quantity) {
                errs.push(
                    format!("items[{i}].quantity"),
                    format!("only {} of '{}' in stock", priced.stock_quantity.max(0), priced.sku),
                );
                continue;
            }
            lines.push(CheckoutLine {
                product_id: priced.product_id,
                variant_id: priced.variant_id,
                sku: priced.sku,
                title: priced.title,
                quantity: item.quantity,
                line_total: priced.unit_price.times(item.quantity)?,
                unit_price: priced.unit_price,
            });
        }
        errs.into_result()?;

        let cart = PromotionCart {
            currency,
            lines: lines
                .iter()
                .map(|l| CartLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
        };
        let code = new
            .promotion_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let outcome = evaluate(promotions, &cart, code, now)?;
        if code.is_some() && !outcome.code_applied {
            return Err(DomainError::validation(
                "promotion_code",
                "code is invalid or does not apply to this cart",
            ));
        }

        let shipping_total = if outcome.free_shipping {
            Money::zero(currency)
        } else {
            rates.for_delivery(&new.delivery, currency)
        };
        let grand_total = outcome
            .subtotal
            .checked_sub(&outcome.discount_total)?
            .checked_add(&shipping_total)?;

        Ok(Self {
            id: CheckoutId::new(),
            customer: Customer {
                email: new.customer.email.trim().to_lowercase(),
                name: new.customer.name.trim().to_string(),
                phone: new.customer.phone,
            },
            delivery: new.delivery,
            lines,
            promotion_code: code.map(str::to_ascii_uppercase),
            promotion_ids: outcome.promotion_ids(),
            currency,
            subtotal: outcome.subtotal,
            discount_total: outcome.discount_total,
            shipping_total,
            grand_total,
            status: CheckoutStatus::Pending,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// A paid amount must match the frozen grand total exactly.
    pub fn verify_payment(&self, payment: &PaymentConfirmation) -> DomainResult<()> {
        let mut errs = ValidationErrors::new();
        errs.check(
            payment.currency == self.currency,
            "currency",
            format!("expected {}, got {}", self.currency, payment.currency),
        );
        errs.check(
            payment.amount_cents == self.grand_total.amount_cents,
            "amount",
            format!(
                "expected {} cents, got {} cents",
                self.grand_total.amount_cents, payment.amount_cents
            ),
        );
        errs.into_result()
    }

    /// Failed checkouts can still be paid: the shopper may retry the widget.
    pub fn mark_paid(&mut self, payment_id: &str, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            CheckoutStatus::Pending | CheckoutStatus::Failed => {
                self.status = CheckoutStatus::Paid;
                self.payment_reference = Some(payment_id.to_string());
                self.updated_at = now;
                Ok(())
            }
            other => Err(DomainError::invariant(format!(
                "checkout {} is {} and cannot be paid",
                self.id,
                other.as_str()
            ))),
        }
    }

    /// Returns `false` when the checkout was already past the point where a
    /// failure matters (e.g. paid by a later attempt).
    pub fn mark_failed(&mut self, payment_id: &str, now: DateTime<Utc>) -> bool {
        if self.status != CheckoutStatus::Pending {
            return false;
        }
        self.status = CheckoutStatus::Failed;
        self.payment_reference = Some(payment_id.to_string());
        self.updated_at = now;
        true
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != CheckoutStatus::Pending {
            return Err(DomainError::invariant(format!(
                "only pending checkouts expire; checkout {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = CheckoutStatus::Expired;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shopfront_catalog::{Product, ProductImage, ProductStatus, ProductVariant, SupplierInfo};
    use shopfront_core::{slugify, DraftId, ImageId};
    use shopfront_promotions::{NewPromotion, PromotionKind};

    pub(crate) fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    pub(crate) fn rates() -> ShippingRates {
        ShippingRates { courier_cents: 9_900, locker_cents: 6_000 }
    }

    pub(crate) fn product(title: &str, price: i64, stock: i64, supplier: bool) -> ProductDetail {
        let id = ProductId::new();
        ProductDetail {
            product: Product {
                id,
                draft_id: DraftId::new(),
                slug: slugify(title),
                title: title.into(),
                description: None,
                brand: None,
                category: None,
                tags: vec![],
                sku: slugify(title).to_uppercase(),
                price: Money::new(price, Currency::Zar),
                compare_at_price: None,
                cost_price: None,
                stock_quantity: stock,
                weight_grams: None,
                supplier: supplier.then(|| SupplierInfo {
                    name: "Acme Wholesale".into(),
                    sku: Some("ACME-1".into()),
                    url: None,
                    cost_cents: Some(price / 2),
                }),
                seo_title: None,
                seo_description: None,
                status: ProductStatus::Active,
                revision: 1,
                published_at: now(),
                updated_at: now(),
            },
            images: vec![ProductImage {
                id: ImageId::new(),
                product_id: id,
                url: "https://cdn.example/x.jpg".into(),
                alt: None,
                position: 0,
                is_primary: true,
            }],
            attributes: vec![],
            variants: Vec::<ProductVariant>::new(),
        }
    }

    pub(crate) fn customer() -> Customer {
        Customer {
            email: " Thandi@Example.co.za ".into(),
            name: "Thandi Mokoena".into(),
            phone: Some("082 555 0101".into()),
        }
    }

    pub(crate) fn courier() -> Delivery {
        Delivery::Courier {
            address: ShippingAddress {
                line1: "12 Long Street".into(),
                line2: None,
                suburb: None,
                city: "Cape Town".into(),
                province: Some("Western Cape".into()),
                postal_code: "8001".into(),
                country: "ZA".into(),
            },
        }
    }

    pub(crate) fn checkout_for(products: &[ProductDetail], qty: u32) -> Checkout {
        let items = products
            .iter()
            .map(|p| CartItem { product_id: p.product.id, variant_id: None, quantity: qty })
            .collect();
        Checkout::price(
            NewCheckout { customer: customer(), delivery: courier(), items, promotion_code: None },
            products,
            &[],
            rates(),
            Currency::Zar,
            now(),
        )
        .unwrap()
    }

    #[test]
    fn prices_cart_with_shipping() {
        let tongs = product("Braai Tongs", 25_000, 10, false);
        let c = checkout_for(std::slice::from_ref(&tongs), 2);
        assert_eq!(c.subtotal.amount_cents, 50_000);
        assert_eq!(c.shipping_total.amount_cents, 9_900);
        assert_eq!(c.grand_total.amount_cents, 59_900);
        assert_eq!(c.customer.email, "thandi@example.co.za");
        assert_eq!(c.status, CheckoutStatus::Pending);
    }

    #[test]
    fn duplicate_items_are_merged_before_stock_check() {
        let tongs = product("Braai Tongs", 25_000, 3, false);
        let item = CartItem { product_id: tongs.product.id, variant_id: None, quantity: 2 };
        let res = Checkout::price(
            NewCheckout { customer: customer(), delivery: courier(), items: vec![item, item], promotion_code: None },
            std::slice::from_ref(&tongs),
            &[],
            rates(),
            Currency::Zar,
            now(),
        );
        let Err(DomainError::Validation(errs)) = res else {
            panic!("expected stock failure");
        };
        assert!(errs.has_field("items[0].quantity"));
    }

    #[test]
    fn merged_lines_respect_the_quantity_cap() {
        let tongs = product("Braai Tongs", 25_000, 1_000, false);
        let item = CartItem { product_id: tongs.product.id, variant_id: None, quantity: 60 };
        let res = Checkout::price(
            NewCheckout { customer: customer(), delivery: courier(), items: vec![item, item], promotion_code: None },
            std::slice::from_ref(&tongs),
            &[],
            rates(),
            Currency::Zar,
            now(),
        );
        let Err(DomainError::Validation(errs)) = res else {
            panic!("expected the combined quantity to be rejected");
        };
        assert!(errs.has_field("items[0].quantity"));
    }

    #[test]
    fn unknown_product_and_bad_customer_are_reported_together() {
        let res = Checkout::price(
            NewCheckout {
                customer: Customer { email: "nope".into(), name: "".into(), phone: None },
                delivery: Delivery::Locker { locker_code: " ".into() },
                items: vec![CartItem { product_id: ProductId::new(), variant_id: None, quantity: 1 }],
                promotion_code: None,
            },
            &[],
            &[],
            rates(),
            Currency::Zar,
            now(),
        );
        let Err(DomainError::Validation(errs)) = res else {
            panic!("expected validation failure");
        };
        assert!(errs.has_field("customer.email"));
        assert!(errs.has_field("customer.name"));
        assert!(errs.has_field("delivery.locker_code"));
        assert!(errs.has_field("items[0].product_id"));
    }

    #[test]
    fn free_shipping_promotion_zeroes_locker_fee() {
        let tongs = product("Braai Tongs", 25_000, 10, false);
        let promo = NewPromotion {
            name: "Locker launch".into(),
            code: Some("LOCKER".into()),
            kind: PromotionKind::FreeShipping,
            min_subtotal_cents: None,
            min_quantity: None,
            product_ids: vec![],
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            active: true,
            stackable: true,
        }
        .into_promotion(now())
        .unwrap();

        let c = Checkout::price(
            NewCheckout {
                customer: customer(),
                delivery: Delivery::Locker { locker_code: "CG45".into() },
                items: vec![CartItem { product_id: tongs.product.id, variant_id: None, quantity: 1 }],
                promotion_code: Some("locker".into()),
            },
            std::slice::from_ref(&tongs),
            std::slice::from_ref(&promo),
            rates(),
            Currency::Zar,
            now(),
        )
        .unwrap();
        assert!(c.shipping_total.is_zero());
        assert_eq!(c.grand_total.amount_cents, 25_000);
        assert_eq!(c.promotion_ids, vec![promo.id]);
        assert_eq!(c.promotion_code.as_deref(), Some("LOCKER"));
    }

    #[test]
    fn unknown_promotion_code_is_rejected() {
        let tongs = product("Braai Tongs", 25_000, 10, false);
        let res = Checkout::price(
            NewCheckout {
                customer: customer(),
                delivery: courier(),
                items: vec![CartItem { product_id: tongs.product.id, variant_id: None, quantity: 1 }],
                promotion_code: Some("NOPE".into()),
            },
            std::slice::from_ref(&tongs),
            &[],
            rates(),
            Currency::Zar,
            now(),
        );
        assert!(matches!(res, Err(DomainError::Validation(ref e)) if e.has_field("promotion_code")));
    }

    #[test]
    fn payment_must_match_grand_total() {
        let tongs = product("Braai Tongs", 25_000, 10, false);
        let c = checkout_for(std::slice::from_ref(&tongs), 1);
        let ok = PaymentConfirmation {
            payment_id: "p_1".into(),
            amount_cents: c.grand_total.amount_cents,
            currency: Currency::Zar,
        };
        assert!(c.verify_payment(&ok).is_ok());

        let short = PaymentConfirmation { amount_cents: 100, ..ok };
        assert!(matches!(c.verify_payment(&short), Err(DomainError::Validation(ref e)) if e.has_field("amount")));
    }

    #[test]
    fn failed_checkout_can_still_be_paid() {
        let tongs = product("Braai Tongs", 25_000, 10, false);
        let mut c = checkout_for(std::slice::from_ref(&tongs), 1);
        assert!(c.mark_failed("p_1", now()));
        c.mark_paid("p_2", now()).unwrap();
        assert!(!c.mark_failed("p_3", now()));
        assert_eq!(c.payment_reference.as_deref(), Some("p_2"));
        assert!(c.expire(now()).is_err());
    }

    #[test]
    fn delivery_serialises_with_type_tag() {
        let json = serde_json::to_value(Delivery::Locker { locker_code: "CG45".into() }).unwrap();
        assert_eq!(json["type"], "locker");
        assert_eq!(json["locker_code"], "CG45");
    }
}
