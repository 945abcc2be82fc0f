//! Orders domain: checkouts, paid orders, supplier (dropship) orders and
//! shipments. Pure state machines; the store runs them transactionally.

pub mod checkout;
pub mod order;
pub mod shipment;
pub mod supplier_order;

pub use checkout::{
    CartItem, Checkout, CheckoutLine, CheckoutStatus, Customer, Delivery, NewCheckout,
    PaymentConfirmation, ShippingAddress, ShippingRates,
};
pub use order::{
    format_order_number, Order, OrderLine, OrderPlan, OrderStatus, OrderTracking, PlacedOrder,
    StockChange, TrackingItem,
};
pub use shipment::{
    NewShipment, NewTrackingEvent, Shipment, ShipmentMethod, ShipmentStatus, TrackingEvent,
};
pub use supplier_order::{
    all_received, SupplierOrder, SupplierOrderStatus, SupplierOrderTransition,
};
