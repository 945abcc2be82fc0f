//! Query strings, request bodies and public response shapes.
//!
//! Admin responses serialize domain types directly; the storefront gets
//! trimmed views so supplier and cost data never leave the back-office.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_catalog::{
    DraftStatus, ProductAttributeValue, ProductDetail, ProductFilter, ProductImage, ProductStatus,
    VariantOption,
};
use shopfront_core::{AttributeValueId, Money, OrderId, Page, ProductId, VariantId};
use shopfront_orders::{CartItem, OrderStatus, SupplierOrderStatus};

use crate::app::errors::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// `?search&category&attribute_value&min_price_cents&max_price_cents&status&limit&offset`
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub attribute_value: Option<AttributeValueId>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub status: Option<ProductStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ProductListQuery {
    pub fn filter(&self) -> ProductFilter {
        ProductFilter {
            search: self.search.clone(),
            category: self.category.clone(),
            attribute_value: self.attribute_value,
            min_price_cents: self.min_price_cents,
            max_price_cents: self.max_price_cents,
            status: self.status,
        }
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DraftListQuery {
    pub status: Option<DraftStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SupplierOrderListQuery {
    pub status: Option<SupplierOrderStatus>,
    pub order_id: Option<OrderId>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShipmentListQuery {
    pub order_id: Option<OrderId>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackingQuery {
    pub email: Option<String>,
}

pub const DEFAULT_NEARBY_LIMIT: usize = 10;
pub const MAX_NEARBY_LIMIT: usize = 50;
pub const DEFAULT_NEARBY_KM: f64 = 25.0;
pub const MAX_NEARBY_KM: f64 = 500.0;

/// `?lat&lng` or `?address`, plus `limit` and `max_km`.
#[derive(Debug, Default, Deserialize)]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
    pub limit: Option<usize>,
    pub max_km: Option<f64>,
}

/// Where a nearby search starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum NearbyOrigin {
    Coordinates { lat: f64, lng: f64 },
    Address(String),
}

impl NearbyQuery {
    pub fn origin(&self) -> Result<NearbyOrigin, ApiError> {
        match (self.lat, self.lng, self.address.as_deref().map(str::trim)) {
            (Some(lat), Some(lng), _) => Ok(NearbyOrigin::Coordinates { lat, lng }),
            (None, None, Some(address)) if !address.is_empty() => {
                Ok(NearbyOrigin::Address(address.to_string()))
            }
            _ => Err(ApiError::BadRequest(
                "provide both lat and lng, or an address".into(),
            )),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_NEARBY_LIMIT).clamp(1, MAX_NEARBY_LIMIT)
    }

    pub fn max_km(&self) -> f64 {
        match self.max_km {
            Some(km) if km.is_finite() && km > 0.0 => km.min(MAX_NEARBY_KM),
            _ => DEFAULT_NEARBY_KM,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct EvaluatePromotionsRequest {
    pub items: Vec<CartItem>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorefrontVariant {
    pub id: VariantId,
    pub sku: String,
    pub price: Money,
    pub in_stock: bool,
    pub options: Vec<VariantOption>,
}

/// Published product as shoppers see it.
#[derive(Debug, Clone, Serialize)]
pub struct StorefrontProduct {
    pub id: ProductId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub sku: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub in_stock: bool,
    pub weight_grams: Option<u32>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub images: Vec<ProductImage>,
    pub attributes: Vec<ProductAttributeValue>,
    pub variants: Vec<StorefrontVariant>,
    pub published_at: DateTime<Utc>,
}

impl From<ProductDetail> for StorefrontProduct {
    fn from(detail: ProductDetail) -> Self {
        let ProductDetail { product, images, attributes, variants } = detail;
        let in_stock = if variants.is_empty() {
            product.stock_quantity > 0
        } else {
            variants.iter().any(|v| v.stock_quantity > 0)
        };
        Self {
            id: product.id,
            slug: product.slug,
            title: product.title,
            description: product.description,
            brand: product.brand,
            category: product.category,
            tags: product.tags,
            sku: product.sku,
            price: product.price,
            compare_at_price: product.compare_at_price,
            in_stock,
            weight_grams: product.weight_grams,
            seo_title: product.seo_title,
            seo_description: product.seo_description,
            images,
            attributes,
            variants: variants
                .into_iter()
                .map(|v| StorefrontVariant {
                    id: v.id,
                    sku: v.sku,
                    price: v.price,
                    in_stock: v.stock_quantity > 0,
                    options: v.options,
                })
                .collect(),
            published_at: product.published_at,
        }
    }
}

/// Parse a path id, answering 400 on garbage.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = shopfront_core::DomainError>,
{
    raw.parse::<T>().map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfront_core::{DraftId, ProductId};

    #[test]
    fn nearby_needs_a_full_origin() {
        let q = NearbyQuery { lat: Some(-33.9), ..Default::default() };
        assert!(q.origin().is_err());

        let q = NearbyQuery { address: Some("  ".into()), ..Default::default() };
        assert!(q.origin().is_err());

        let q = NearbyQuery { lat: Some(-33.9), lng: Some(18.4), ..Default::default() };
        assert_eq!(q.origin().unwrap(), NearbyOrigin::Coordinates { lat: -33.9, lng: 18.4 });

        let q = NearbyQuery { address: Some(" Sea Point ".into()), ..Default::default() };
        assert_eq!(q.origin().unwrap(), NearbyOrigin::Address("Sea Point".into()));
    }

    #[test]
    fn nearby_limits_are_clamped() {
        let q = NearbyQuery { limit: Some(1_000), max_km: Some(-3.0), ..Default::default() };
        assert_eq!(q.limit(), MAX_NEARBY_LIMIT);
        assert_eq!(q.max_km(), DEFAULT_NEARBY_KM);

        let q = NearbyQuery { max_km: Some(5_000.0), ..Default::default() };
        assert_eq!(q.max_km(), MAX_NEARBY_KM);
    }

    #[test]
    fn bad_path_ids_are_rejected() {
        assert!(parse_id::<DraftId>("not-a-uuid").is_err());
        let id = ProductId::new();
        assert_eq!(parse_id::<ProductId>(&id.to_string()).unwrap(), id);
    }
}
