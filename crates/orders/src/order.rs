//! Paid customer orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_catalog::ProductDetail;
use shopfront_core::{
    CheckoutId, DomainError, DomainResult, Money, OrderId, OrderLineId, ProductId, PromotionId,
    VariantId,
};

use crate::checkout::{Checkout, Customer, Delivery, PaymentConfirmation};
use crate::shipment::Shipment;
use crate::supplier_order::SupplierOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(OrderStatus::Paid),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, to) {
            (Refunded, _) => false,
            (_, Refunded) => true,
            (Paid, Processing) | (Paid, Shipped) | (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (Paid, Cancelled) | (Processing, Cancelled) => true,
            _ => false,
        }
    }
}

/// `SF-000123`.
pub fn format_order_number(sequence: u64) -> String {
    format!("SF-{sequence:06}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub checkout_id: CheckoutId,
    pub payment_id: String,
    pub customer: Customer,
    pub delivery: Delivery,
    pub lines: Vec<OrderLine>,
    pub promotion_ids: Vec<PromotionId>,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub grand_total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn line(&self, id: OrderLineId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.id == id)
    }

    /// Move to `to`, returning the previous status.
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> DomainResult<OrderStatus> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(DomainError::invariant(format!(
                "order {} cannot move from {} to {}",
                self.order_number,
                from.as_str(),
                to.as_str()
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(from)
    }

    /// Transition only when the order is currently in one of `from`.
    /// Returns the previous status when a move happened.
    pub fn advance_from(
        &mut self,
        from: &[OrderStatus],
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Option<OrderStatus> {
        if from.contains(&self.status) && self.status.can_transition_to(to) {
            let prev = self.status;
            self.status = to;
            self.updated_at = now;
            Some(prev)
        } else {
            None
        }
    }
}

/// Stock to take off a product or one of its variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

impl StockChange {
    /// New stock level, floored at zero, and how many units were short.
    pub fn apply_to(&self, current: i64) -> (i64, i64) {
        let wanted = i64::from(self.quantity);
        let short = (wanted - current.max(0)).max(0);
        ((current - wanted).max(0), short)
    }
}

/// Everything the store writes when a payment lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    pub order: Order,
    pub supplier_orders: Vec<SupplierOrder>,
    pub stock_changes: Vec<StockChange>,
}

impl OrderPlan {
    /// `products` supplies supplier info for dropshipped lines; lines whose
    /// product is missing or has no supplier get no supplier order.
    pub fn build(
        checkout: &Checkout,
        payment: &PaymentConfirmation,
        products: &[ProductDetail],
        sequence: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        checkout.verify_payment(payment)?;

        let lines: Vec<OrderLine> = checkout
            .lines
            .iter()
            .map(|l| OrderLine {
                id: OrderLineId::new(),
                product_id: l.product_id,
                variant_id: l.variant_id,
                sku: l.sku.clone(),
                title: l.title.clone(),
                quantity: l.quantity,
                unit_price: l.unit_price,
                line_total: l.line_total,
            })
            .collect();

        let order = Order {
            id: OrderId::new(),
            order_number: format_order_number(sequence),
            checkout_id: checkout.id,
            payment_id: payment.payment_id.clone(),
            customer: checkout.customer.clone(),
            delivery: checkout.delivery.clone(),
            lines,
            promotion_ids: checkout.promotion_ids.clone(),
            subtotal: checkout.subtotal,
            discount_total: checkout.discount_total,
            shipping_total: checkout.shipping_total,
            grand_total: checkout.grand_total,
            status: OrderStatus::Paid,
            created_at: now,
            updated_at: now,
        };

        let supplier_orders = order
            .lines
            .iter()
            .filter_map(|line| {
                let detail = products.iter().find(|d| d.product.id == line.product_id)?;
                let supplier = detail.product.supplier.as_ref()?;
                Some(SupplierOrder::for_line(&order, line, supplier, now))
            })
            .collect();

        let stock_changes = order
            .lines
            .iter()
            .map(|l| StockChange {
                product_id: l.product_id,
                variant_id: l.variant_id,
                quantity: l.quantity,
            })
            .collect();

        Ok(Self { order, supplier_orders, stock_changes })
    }
}

/// Result of turning a payment into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    /// `false` when the payment had already produced this order.
    pub created: bool,
}

/// Public tracking view: no prices, no contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTracking {
    pub order_number: String,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub items: Vec<TrackingItem>,
    pub shipments: Vec<Shipment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingItem {
    pub title: String,
    pub quantity: u32,
}

impl OrderTracking {
    pub fn new(order: &Order, shipments: Vec<Shipment>) -> Self {
        Self {
            order_number: order.order_number.clone(),
            status: order.status,
            placed_at: order.created_at,
            items: order
                .lines
                .iter()
                .map(|l| TrackingItem { title: l.title.clone(), quantity: l.quantity })
                .collect(),
            shipments,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::checkout::tests::{checkout_for, now, product};
    use shopfront_core::Currency;

    pub(crate) fn paid(checkout: &Checkout) -> PaymentConfirmation {
        PaymentConfirmation {
            payment_id: "ch_123".into(),
            amount_cents: checkout.grand_total.amount_cents,
            currency: Currency::Zar,
        }
    }

    pub(crate) fn placed(products: &[ProductDetail]) -> OrderPlan {
        let c = checkout_for(products, 1);
        OrderPlan::build(&c, &paid(&c), products, 42, now()).unwrap()
    }

    #[test]
    fn order_number_is_zero_padded() {
        assert_eq!(format_order_number(123), "SF-000123");
        assert_eq!(format_order_number(1_234_567), "SF-1234567");
    }

    #[test]
    fn plan_copies_checkout_and_creates_supplier_orders() {
        let own = product("Braai Tongs", 25_000, 10, false);
        let dropship = product("Potjie Pot", 90_000, 4, true);
        let products = [own, dropship.clone()];
        let plan = placed(&products);

        assert_eq!(plan.order.order_number, "SF-000042");
        assert_eq!(plan.order.status, OrderStatus::Paid);
        assert_eq!(plan.order.lines.len(), 2);
        assert_eq!(plan.stock_changes.len(), 2);

        assert_eq!(plan.supplier_orders.len(), 1);
        let so = &plan.supplier_orders[0];
        assert_eq!(so.product_id, dropship.product.id);
        assert_eq!(so.order_line_id, plan.order.lines[1].id);
        assert_eq!(so.supplier_name, "Acme Wholesale");
    }

    #[test]
    fn mismatched_amount_produces_no_plan() {
        let products = [product("Braai Tongs", 25_000, 10, false)];
        let c = checkout_for(&products, 1);
        let mut payment = paid(&c);
        payment.amount_cents -= 1;
        let err = OrderPlan::build(&c, &payment, &products, 1, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn status_machine() {
        let products = [product("Braai Tongs", 25_000, 10, false)];
        let mut order = placed(&products).order;

        assert!(order.transition(OrderStatus::Delivered, now()).is_err());
        assert_eq!(order.transition(OrderStatus::Processing, now()).unwrap(), OrderStatus::Paid);
        order.transition(OrderStatus::Shipped, now()).unwrap();
        assert!(order.transition(OrderStatus::Cancelled, now()).is_err());
        order.transition(OrderStatus::Delivered, now()).unwrap();
        order.transition(OrderStatus::Refunded, now()).unwrap();
        assert!(order.transition(OrderStatus::Refunded, now()).is_err());
    }

    #[test]
    fn advance_from_only_moves_listed_states() {
        let products = [product("Braai Tongs", 25_000, 10, false)];
        let mut order = placed(&products).order;
        assert_eq!(order.advance_from(&[OrderStatus::Shipped], OrderStatus::Delivered, now()), None);
        assert_eq!(
            order.advance_from(&[OrderStatus::Paid], OrderStatus::Processing, now()),
            Some(OrderStatus::Paid)
        );
    }

    #[test]
    fn stock_change_floors_at_zero() {
        let change = StockChange { product_id: ProductId::new(), variant_id: None, quantity: 5 };
        assert_eq!(change.apply_to(8), (3, 0));
        assert_eq!(change.apply_to(2), (0, 3));
        assert_eq!(change.apply_to(-1), (0, 5));
    }

    #[test]
    fn tracking_view_hides_prices() {
        let products = [product("Braai Tongs", 25_000, 10, false)];
        let order = placed(&products).order;
        let view = OrderTracking::new(&order, vec![]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["order_number"], "SF-000042");
        assert!(json.get("grand_total").is_none());
        assert!(json.get("customer").is_none());
    }
}
