//! Published products: the read-mostly shape the storefront serves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::{
    AttributeId, AttributeValueId, DomainError, DomainResult, DraftId, ImageId, Money, ProductId,
    VariantId,
};

use crate::draft::{SupplierInfo, VariantOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProductStatus::Active),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub draft_id: DraftId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub sku: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub cost_price: Option<Money>,
    pub stock_quantity: i64,
    pub weight_grams: Option<u32>,
    pub supplier: Option<SupplierInfo>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub status: ProductStatus,
    /// Bumped on every publication of the backing draft.
    pub revision: u32,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("product is already archived"));
        }
        self.status = ProductStatus::Archived;
        self.updated_at = now;
        Ok(())
    }

    pub fn unarchive(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == ProductStatus::Active {
            return Err(DomainError::invariant("product is not archived"));
        }
        self.status = ProductStatus::Active;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: ImageId,
    pub product_id: ProductId,
    pub url: String,
    pub alt: Option<String>,
    pub position: u32,
    pub is_primary: bool,
}

/// One row per selected value, or a single row carrying `text_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttributeValue {
    pub product_id: ProductId,
    pub attribute_id: AttributeId,
    pub value_id: Option<AttributeValueId>,
    pub text_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub price: Money,
    pub stock_quantity: i64,
    pub options: Vec<VariantOption>,
}

/// A product with all of its child rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub attributes: Vec<ProductAttributeValue>,
    pub variants: Vec<ProductVariant>,
}

/// What a shopper is actually buying: the product itself or one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub sku: String,
    pub title: String,
    pub unit_price: Money,
    pub stock_quantity: i64,
}

impl ProductDetail {
    pub fn primary_image(&self) -> Option<&ProductImage> {
        self.images
            .iter()
            .find(|i| i.is_primary)
            .or_else(|| self.images.first())
    }

    pub fn variant(&self, id: VariantId) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn has_value(&self, value_id: AttributeValueId) -> bool {
        self.attributes.iter().any(|a| a.value_id == Some(value_id))
            || self
                .variants
                .iter()
                .any(|v| v.options.iter().any(|o| o.value_id == value_id))
    }

    /// Resolve the sellable item. Products with variants must be bought
    /// through one of them.
    pub fn price_for(&self, variant_id: Option<VariantId>) -> DomainResult<PricedItem> {
        if !self.product.is_active() {
            return Err(DomainError::validation(
                "product_id",
                format!("product '{}' is not available", self.product.slug),
            ));
        }
        match variant_id {
            Some(vid) => {
                let v = self.variant(vid).ok_or_else(|| {
                    DomainError::validation("variant_id", format!("unknown variant {vid}"))
                })?;
                Ok(PricedItem {
                    product_id: self.product.id,
                    variant_id: Some(v.id),
                    sku: v.sku.clone(),
                    title: self.product.title.clone(),
                    unit_price: v.price,
                    stock_quantity: v.stock_quantity,
                })
            }
            None if !self.variants.is_empty() => Err(DomainError::validation(
                "variant_id",
                "product has variants; choose one",
            )),
            None => Ok(PricedItem {
                product_id: self.product.id,
                variant_id: None,
                sku: self.product.sku.clone(),
                title: self.product.title.clone(),
                unit_price: self.product.price,
                stock_quantity: self.product.stock_quantity,
            }),
        }
    }
}

/// Storefront/admin listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive match on title, brand and tags.
    pub search: Option<String>,
    pub category: Option<String>,
    pub attribute_value: Option<AttributeValueId>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub status: Option<ProductStatus>,
}

impl ProductFilter {
    /// Storefront listings only ever see active products.
    pub fn storefront(mut self) -> Self {
        self.status = Some(ProductStatus::Active);
        self
    }

    pub fn matches(&self, detail: &ProductDetail) -> bool {
        let p = &detail.product;
        if let Some(status) = self.status {
            if p.status != status {
                return false;
            }
        }
        if let Some(cat) = &self.category {
            if !p.category.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(cat)) {
                return false;
            }
        }
        if let Some(min) = self.min_price_cents {
            if p.price.amount_cents < min {
                return false;
            }
        }
        if let Some(max) = self.max_price_cents {
            if p.price.amount_cents > max {
                return false;
            }
        }
        if let Some(vid) = self.attribute_value {
            if !detail.has_value(vid) {
                return false;
            }
        }
        if let Some(q) = self.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            let hit = p.title.to_lowercase().contains(&q)
                || p.brand.as_deref().is_some_and(|b| b.to_lowercase().contains(&q))
                || p.tags.iter().any(|t| t.contains(&q));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::tests::{colour, complete_draft, material, now};
    use crate::publication::PublicationPlan;

    fn published() -> ProductDetail {
        let (c, m) = (colour(), material());
        let draft = complete_draft(&c, &m);
        PublicationPlan::build(&draft, &[c, m], None, now())
            .unwrap()
            .into_detail()
    }

    #[test]
    fn archive_twice_is_rejected() {
        let mut detail = published();
        detail.product.archive(now()).unwrap();
        assert!(detail.product.archive(now()).is_err());
        detail.product.unarchive(now()).unwrap();
        assert!(detail.product.is_active());
    }

    #[test]
    fn price_for_requires_variant_when_product_has_variants() {
        let detail = published();
        let err = detail.price_for(None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref e) if e.has_field("variant_id")));

        let white = &detail.variants[1];
        let item = detail.price_for(Some(white.id)).unwrap();
        assert_eq!(item.sku, "POT-3-WHT");
        assert_eq!(item.unit_price.amount_cents, 94_900);
    }

    #[test]
    fn archived_products_cannot_be_priced() {
        let mut detail = published();
        let vid = detail.variants[0].id;
        detail.product.archive(now()).unwrap();
        assert!(detail.price_for(Some(vid)).is_err());
    }

    #[test]
    fn filter_matches_search_category_and_price() {
        let detail = published();
        let f = ProductFilter {
            search: Some("POTJIE".into()),
            category: Some("Braai".into()),
            min_price_cents: Some(50_000),
            max_price_cents: Some(90_000),
            ..Default::default()
        }
        .storefront();
        assert!(f.matches(&detail));

        let too_cheap = ProductFilter { max_price_cents: Some(10_000), ..Default::default() };
        assert!(!too_cheap.matches(&detail));
    }

    #[test]
    fn filter_by_attribute_value_checks_variant_options() {
        let detail = published();
        let white = detail.variants[1].options[0].value_id;
        let f = ProductFilter { attribute_value: Some(white), ..Default::default() };
        assert!(f.matches(&detail));

        let f = ProductFilter {
            attribute_value: Some(AttributeValueId::new()),
            ..Default::default()
        };
        assert!(!f.matches(&detail));
    }

    #[test]
    fn primary_image_is_first_position() {
        let detail = published();
        assert_eq!(
            detail.primary_image().map(|i| i.url.as_str()),
            Some("https://cdn.example/pot.jpg")
        );
    }
}
