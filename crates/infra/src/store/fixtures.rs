//! Shared test data for store tests.

use chrono::{DateTime, Duration, Utc};

use shopfront_catalog::{
    Attribute, AttributeKind, DraftAttribute, DraftImage, DraftPatch, NewAttribute,
    NewAttributeValue, NewDraft, ProductDetail, ProductDraft, SupplierInfo,
};
use shopfront_core::{AttributeValueId, Currency, ExpectedVersion};
use shopfront_lockers::Locker;
use shopfront_orders::{
    CartItem, Checkout, Customer, Delivery, NewCheckout, PaymentConfirmation, ShippingAddress,
    ShippingRates,
};
use shopfront_promotions::{NewPromotion, Promotion, PromotionKind};

use crate::store::{CatalogStore, OrderStore, PromotionStore};

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-06-10T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + Duration::seconds(secs)
}

pub(crate) struct SeedAttrs {
    pub colour: Attribute,
    pub black: AttributeValueId,
}

fn value(v: &str) -> NewAttributeValue {
    NewAttributeValue { value: v.into(), label: None, sort_order: None }
}

pub(crate) async fn seeded_draft<S: CatalogStore>(store: &S) -> (ProductDraft, SeedAttrs) {
    let colour = NewAttribute {
        name: "Colour".into(),
        slug: None,
        kind: AttributeKind::Select,
        unit: None,
        is_variant_axis: true,
        is_filterable: true,
        values: vec![value("Black"), value("White")],
    }
    .into_attribute(at(0))
    .unwrap();
    store.create_attribute(colour.clone()).await.unwrap();
    let black = colour.values.iter().find(|v| v.value == "Black").unwrap().id;
    let attrs = SeedAttrs { colour, black };

    let draft = draft_with(store, &attrs, "Speckled planter", "POT-3", "speckled-planter").await;
    (draft, attrs)
}

pub(crate) async fn draft_with<S: CatalogStore>(
    store: &S,
    attrs: &SeedAttrs,
    title: &str,
    sku: &str,
    slug: &str,
) -> ProductDraft {
    let mut draft = ProductDraft::create(
        NewDraft { title: title.into(), slug: Some(slug.into()), currency: None },
        Currency::Zar,
        at(0),
    )
    .unwrap();
    draft
        .apply_patch(
            DraftPatch {
                sku: Some(Some(sku.into())),
                price_cents: Some(Some(89_900)),
                stock_quantity: Some(10),
                images: Some(vec![
                    DraftImage { url: "https://cdn.example/pot-side.jpg".into(), alt: None, position: 2 },
                    DraftImage { url: "https://cdn.example/pot.jpg".into(), alt: Some("Pot".into()), position: 1 },
                ]),
                attributes: Some(vec![DraftAttribute {
                    attribute_id: attrs.colour.id,
                    value_ids: vec![attrs.black],
                    text_value: None,
                }]),
                supplier: Some(Some(SupplierInfo {
                    name: "Clayworks".into(),
                    sku: Some("CW-1".into()),
                    url: None,
                    cost_cents: Some(40_000),
                })),
                ..Default::default()
            },
            at(0),
        )
        .unwrap();
    store.create_draft(draft.clone()).await.unwrap();
    draft
}

pub(crate) async fn published_product<S: CatalogStore>(store: &S) -> ProductDetail {
    let (draft, _) = seeded_draft(store).await;
    let outcome = store.publish_draft(draft.id, ExpectedVersion::Any, at(1)).await.unwrap();
    store.get_product(outcome.product_id).await.unwrap()
}

fn new_checkout(product: &ProductDetail, quantity: u32, code: Option<&str>) -> NewCheckout {
    NewCheckout {
        customer: Customer {
            email: "Thandi@Example.co.za".into(),
            name: "Thandi Mokoena".into(),
            phone: None,
        },
        delivery: Delivery::Courier {
            address: ShippingAddress {
                line1: "12 Kloof Street".into(),
                line2: None,
                suburb: Some("Gardens".into()),
                city: "Cape Town".into(),
                province: Some("Western Cape".into()),
                postal_code: "8001".into(),
                country: "ZA".into(),
            },
        },
        items: vec![CartItem { product_id: product.product.id, variant_id: None, quantity }],
        promotion_code: code.map(str::to_string),
    }
}

async fn price_and_store<S: OrderStore + PromotionStore>(
    store: &S,
    products: &[ProductDetail],
    new: NewCheckout,
) -> Checkout {
    let promos = store.live_promotions(at(50)).await.unwrap();
    let rates = ShippingRates { courier_cents: 9_900, locker_cents: 6_000 };
    let checkout = Checkout::price(new, products, &promos, rates, Currency::Zar, at(50)).unwrap();
    store.create_checkout(checkout.clone()).await.unwrap();
    checkout
}

pub(crate) async fn checkout_for<S: OrderStore + PromotionStore>(
    store: &S,
    product: &ProductDetail,
    quantity: u32,
) -> Checkout {
    price_and_store(store, std::slice::from_ref(product), new_checkout(product, quantity, None)).await
}

/// One unit of each product in a single cart.
pub(crate) async fn checkout_for_each<S: OrderStore + PromotionStore>(
    store: &S,
    products: &[ProductDetail],
) -> Checkout {
    let mut new = new_checkout(&products[0], 1, None);
    new.items = products
        .iter()
        .map(|p| CartItem { product_id: p.product.id, variant_id: None, quantity: 1 })
        .collect();
    price_and_store(store, products, new).await
}

pub(crate) async fn checkout_with_code<S: OrderStore + PromotionStore>(
    store: &S,
    product: &ProductDetail,
    code: &str,
) -> Checkout {
    price_and_store(store, std::slice::from_ref(product), new_checkout(product, 1, Some(code))).await
}

pub(crate) fn payment_for(checkout: &Checkout, payment_id: &str) -> PaymentConfirmation {
    PaymentConfirmation {
        payment_id: payment_id.into(),
        amount_cents: checkout.grand_total.amount_cents,
        currency: checkout.currency,
    }
}

pub(crate) fn promotion(code: &str, now: DateTime<Utc>) -> Promotion {
    NewPromotion {
        name: "Winter sale".into(),
        code: Some(code.into()),
        kind: PromotionKind::PercentageOff { basis_points: 1_000 },
        min_subtotal_cents: None,
        min_quantity: None,
        product_ids: Vec::new(),
        starts_at: None,
        ends_at: None,
        usage_limit: Some(100),
        active: true,
        stackable: false,
    }
    .into_promotion(now)
    .unwrap()
}

pub(crate) fn locker(code: &str) -> Locker {
    Locker {
        code: code.into(),
        name: format!("Locker {code}"),
        address: "Canal Walk, Century City".into(),
        city: Some("Cape Town".into()),
        province: Some("Western Cape".into()),
        postal_code: Some("7441".into()),
        latitude: -33.893,
        longitude: 18.511,
        opening_hours: None,
        active: true,
        updated_at: at(0),
    }
}
