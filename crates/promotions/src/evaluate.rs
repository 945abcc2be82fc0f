//! Cart evaluation.
//!
//! Automatic promotions and the one matching the shopper's code are
//! considered. At most one non-stackable promotion applies (the one giving
//! the largest discount); every eligible stackable promotion applies on top.
//! The discount total never exceeds the cart subtotal.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::{Currency, DomainResult, Money, ProductId, PromotionId};

use crate::promotion::{Promotion, PromotionKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCart {
    pub currency: Currency,
    pub lines: Vec<CartLine>,
}

impl PromotionCart {
    pub fn subtotal(&self) -> DomainResult<Money> {
        self.lines.iter().try_fold(Money::zero(self.currency), |acc, l| {
            acc.checked_add(&l.unit_price.times(l.quantity)?)
        })
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    fn subtotal_for(&self, promo: &Promotion) -> DomainResult<Money> {
        self.lines
            .iter()
            .filter(|l| promo.applies_to(l.product_id))
            .try_fold(Money::zero(self.currency), |acc, l| {
                acc.checked_add(&l.unit_price.times(l.quantity)?)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPromotion {
    pub id: PromotionId,
    pub name: String,
    pub code: Option<String>,
    pub discount: Money,
    pub free_shipping: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionOutcome {
    pub applied: Vec<AppliedPromotion>,
    pub subtotal: Money,
    pub discount_total: Money,
    pub free_shipping: bool,
    /// Whether the supplied code matched an applied promotion.
    pub code_applied: bool,
}

impl PromotionOutcome {
    pub fn promotion_ids(&self) -> Vec<PromotionId> {
        self.applied.iter().map(|a| a.id).collect()
    }
}

struct Candidate<'a> {
    promo: &'a Promotion,
    discount: Money,
    free_shipping: bool,
}

pub fn evaluate(
    promotions: &[Promotion],
    cart: &PromotionCart,
    code: Option<&str>,
    now: DateTime<Utc>,
) -> DomainResult<PromotionOutcome> {
    let code = code.map(str::trim).filter(|c| !c.is_empty());
    let subtotal = cart.subtotal()?;
    let quantity = cart.item_count();

    let mut candidates = Vec::new();
    for promo in promotions {
        if !promo.is_live(now) || !promo.has_capacity() || !promo.matches_code(code) {
            continue;
        }
        if promo.min_subtotal_cents.is_some_and(|min| subtotal.amount_cents < min) {
            continue;
        }
        if promo.min_quantity.is_some_and(|min| quantity < min) {
            continue;
        }
        if !cart.lines.iter().any(|l| promo.applies_to(l.product_id)) {
            continue;
        }

        let eligible = cart.subtotal_for(promo)?;
        let (discount, free_shipping) = match promo.kind {
            PromotionKind::PercentageOff { basis_points } => (eligible.basis_points(basis_points), false),
            PromotionKind::FixedAmountOff { amount_cents } => {
                (Money::new(amount_cents, cart.currency).min(eligible), false)
            }
            PromotionKind::FreeShipping => (Money::zero(cart.currency), true),
        };
        candidates.push(Candidate { promo, discount, free_shipping });
    }

    let best_exclusive = candidates
        .iter()
        .filter(|c| !c.promo.stackable)
        .max_by_key(|c| (c.discount.amount_cents, c.free_shipping, Reverse(c.promo.id)));
    let mut stackable: Vec<&Candidate> = candidates.iter().filter(|c| c.promo.stackable).collect();
    stackable.sort_by_key(|c| c.promo.id);

    let mut remaining = subtotal;
    let mut applied = Vec::new();
    for c in best_exclusive.into_iter().chain(stackable) {
        let discount = c.discount.min(remaining);
        remaining = remaining.checked_sub(&discount)?;
        applied.push(AppliedPromotion {
            id: c.promo.id,
            name: c.promo.name.clone(),
            code: c.promo.code.clone(),
            discount,
            free_shipping: c.free_shipping,
        });
    }

    let discount_total = subtotal.checked_sub(&remaining)?;
    let free_shipping = applied.iter().any(|a| a.free_shipping);
    let code_applied = applied.iter().any(|a| a.code.is_some());
    Ok(PromotionOutcome {
        applied,
        subtotal,
        discount_total,
        free_shipping,
        code_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promotion::NewPromotion;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn promo(name: &str, code: Option<&str>, kind: PromotionKind, stackable: bool) -> Promotion {
        NewPromotion {
            name: name.into(),
            code: code.map(Into::into),
            kind,
            min_subtotal_cents: None,
            min_quantity: None,
            product_ids: vec![],
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            active: true,
            stackable,
        }
        .into_promotion(now())
        .unwrap()
    }

    fn zar(c: i64) -> Money {
        Money::new(c, Currency::Zar)
    }

    fn cart(lines: &[(ProductId, u32, i64)]) -> PromotionCart {
        PromotionCart {
            currency: Currency::Zar,
            lines: lines
                .iter()
                .map(|&(product_id, quantity, cents)| CartLine {
                    product_id,
                    quantity,
                    unit_price: zar(cents),
                })
                .collect(),
        }
    }

    #[test]
    fn best_non_stackable_wins() {
        let ten = promo("10% off", None, PromotionKind::PercentageOff { basis_points: 1_000 }, false);
        let fifty = promo("R50 off", None, PromotionKind::FixedAmountOff { amount_cents: 5_000 }, false);
        let c = cart(&[(ProductId::new(), 2, 20_000)]);

        let out = evaluate(&[ten, fifty.clone()], &c, None, now()).unwrap();
        // 10% of R400 = R40 < R50
        assert_eq!(out.applied.len(), 1);
        assert_eq!(out.applied[0].id, fifty.id);
        assert_eq!(out.discount_total, zar(5_000));
    }

    #[test]
    fn stackable_promotions_combine() {
        let ten = promo("10% off", None, PromotionKind::PercentageOff { basis_points: 1_000 }, false);
        let ship = promo("Free delivery", None, PromotionKind::FreeShipping, true);
        let extra = promo("R20 off", None, PromotionKind::FixedAmountOff { amount_cents: 2_000 }, true);
        let c = cart(&[(ProductId::new(), 1, 10_000)]);

        let out = evaluate(&[ten, ship, extra], &c, None, now()).unwrap();
        assert_eq!(out.applied.len(), 3);
        assert_eq!(out.discount_total, zar(3_000));
        assert!(out.free_shipping);
    }

    #[test]
    fn coded_promotion_requires_matching_code() {
        let coded = promo("VIP", Some("VIP-2026"), PromotionKind::PercentageOff { basis_points: 2_000 }, false);
        let c = cart(&[(ProductId::new(), 1, 10_000)]);

        let without = evaluate(&[coded.clone()], &c, None, now()).unwrap();
        assert!(without.applied.is_empty());
        assert!(!without.code_applied);

        let with = evaluate(&[coded], &c, Some("vip-2026"), now()).unwrap();
        assert_eq!(with.discount_total, zar(2_000));
        assert!(with.code_applied);
    }

    #[test]
    fn product_restriction_limits_discount_base() {
        let (shoes, socks) = (ProductId::new(), ProductId::new());
        let mut p = promo("Shoe deal", None, PromotionKind::PercentageOff { basis_points: 5_000 }, false);
        p.product_ids = vec![shoes];
        let c = cart(&[(shoes, 1, 80_000), (socks, 3, 5_000)]);

        let out = evaluate(&[p], &c, None, now()).unwrap();
        assert_eq!(out.subtotal, zar(95_000));
        assert_eq!(out.discount_total, zar(40_000));
    }

    #[test]
    fn thresholds_usage_and_window_filter_candidates() {
        let mut min_sub = promo("Big spender", None, PromotionKind::FixedAmountOff { amount_cents: 1_000 }, true);
        min_sub.min_subtotal_cents = Some(100_000);
        let mut min_qty = promo("Bulk", None, PromotionKind::FixedAmountOff { amount_cents: 1_000 }, true);
        min_qty.min_quantity = Some(5);
        let mut used_up = promo("Used up", None, PromotionKind::FixedAmountOff { amount_cents: 1_000 }, true);
        used_up.usage_limit = Some(1);
        used_up.usage_count = 1;
        let mut expired = promo("Expired", None, PromotionKind::FixedAmountOff { amount_cents: 1_000 }, true);
        expired.ends_at = Some(now());

        let c = cart(&[(ProductId::new(), 2, 10_000)]);
        let out = evaluate(&[min_sub, min_qty, used_up, expired], &c, None, now()).unwrap();
        assert!(out.applied.is_empty());
        assert!(out.discount_total.is_zero());
    }

    #[test]
    fn discount_total_is_capped_at_subtotal() {
        let a = promo("A", None, PromotionKind::FixedAmountOff { amount_cents: 8_000 }, true);
        let b = promo("B", None, PromotionKind::FixedAmountOff { amount_cents: 8_000 }, true);
        let c = cart(&[(ProductId::new(), 1, 10_000)]);

        let out = evaluate(&[a, b], &c, None, now()).unwrap();
        assert_eq!(out.discount_total, zar(10_000));
        assert_eq!(out.applied[1].discount, zar(2_000));
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_subtotal(
            prices in proptest::collection::vec(1i64..500_000, 1..5),
            bps in 1u32..=10_000,
            fixed in 1i64..1_000_000,
        ) {
            let lines: Vec<_> = prices.iter().map(|p| (ProductId::new(), 1, *p)).collect();
            let c = cart(&lines);
            let promos = [
                promo("pct", None, PromotionKind::PercentageOff { basis_points: bps }, true),
                promo("fixed", None, PromotionKind::FixedAmountOff { amount_cents: fixed }, true),
            ];
            let out = evaluate(&promos, &c, None, now()).unwrap();
            prop_assert!(out.discount_total.amount_cents >= 0);
            prop_assert!(out.discount_total.amount_cents <= out.subtotal.amount_cents);
        }
    }
}
