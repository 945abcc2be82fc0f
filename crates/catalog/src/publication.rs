//! Draft -> product publication.
//!
//! [`PublicationPlan::build`] is a pure function of the draft, the attribute
//! catalog and the currently published product (if any). The store applies
//! the plan inside one transaction so a product is never seen half-written.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use shopfront_core::{DomainError, DomainResult, ImageId, Money, ProductId, VariantId};

use crate::attribute::Attribute;
use crate::draft::ProductDraft;
use crate::product::{
    Product, ProductAttributeValue, ProductDetail, ProductImage, ProductStatus, ProductVariant,
};

/// Full replacement of a product's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationPlan {
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub attributes: Vec<ProductAttributeValue>,
    pub variants: Vec<ProductVariant>,
    pub is_republish: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub product_id: ProductId,
    pub revision: u32,
    /// `false` when an existing product was updated in place.
    pub created: bool,
}

impl PublicationPlan {
    pub fn build(
        draft: &ProductDraft,
        attributes: &[Attribute],
        existing: Option<&ProductDetail>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        draft.validate_for_publish(attributes)?;

        match (draft.published_product_id, existing) {
            (None, None) => {}
            (Some(pid), Some(detail)) if detail.product.id == pid => {}
            (Some(pid), None) => {
                return Err(DomainError::invariant(format!(
                    "draft {} points at missing product {pid}",
                    draft.id
                )));
            }
            (_, Some(detail)) => {
                return Err(DomainError::invariant(format!(
                    "product {} is not published from draft {}",
                    detail.product.id, draft.id
                )));
            }
        }

        // Both were checked by validate_for_publish.
        let (Some(sku), Some(price_cents)) = (draft.sku.clone(), draft.price_cents) else {
            return Err(DomainError::invariant("validated draft lacks sku or price"));
        };
        let currency = draft.currency;
        let price = Money::new(price_cents, currency);

        let (id, published_at, status, revision) = match existing {
            Some(d) => (
                d.product.id,
                d.product.published_at,
                d.product.status,
                d.product.revision + 1,
            ),
            None => (ProductId::new(), now, ProductStatus::Active, 1),
        };

        let product = Product {
            id,
            draft_id: draft.id,
            slug: draft.slug.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            brand: draft.brand.clone(),
            category: draft.category.clone(),
            tags: draft.tags.clone(),
            sku,
            price,
            compare_at_price: draft.compare_at_price_cents.map(|c| Money::new(c, currency)),
            cost_price: draft.cost_price_cents.map(|c| Money::new(c, currency)),
            stock_quantity: draft.stock_quantity,
            weight_grams: draft.weight_grams,
            supplier: draft.supplier.clone(),
            seo_title: draft.seo_title.clone(),
            seo_description: draft.seo_description.clone(),
            status,
            revision,
            published_at,
            updated_at: now,
        };

        let mut sorted = draft.images.clone();
        sorted.sort_by_key(|i| i.position);
        let images = sorted
            .into_iter()
            .enumerate()
            .map(|(i, img)| ProductImage {
                id: ImageId::new(),
                product_id: id,
                url: img.url.trim().to_string(),
                alt: img.alt,
                position: i as u32,
                is_primary: i == 0,
            })
            .collect();

        let mut attribute_rows = Vec::new();
        for da in &draft.attributes {
            if da.value_ids.is_empty() {
                attribute_rows.push(ProductAttributeValue {
                    product_id: id,
                    attribute_id: da.attribute_id,
                    value_id: None,
                    text_value: da.text_value.as_deref().map(|t| t.trim().to_string()),
                });
            } else {
                attribute_rows.extend(da.value_ids.iter().map(|vid| ProductAttributeValue {
                    product_id: id,
                    attribute_id: da.attribute_id,
                    value_id: Some(*vid),
                    text_value: None,
                }));
            }
        }

        let existing_variants: HashMap<&str, VariantId> = existing
            .map(|d| d.variants.iter().map(|v| (v.sku.as_str(), v.id)).collect())
            .unwrap_or_default();
        let variants = draft
            .variants
            .iter()
            .map(|v| {
                let sku = v.sku.trim().to_string();
                ProductVariant {
                    id: existing_variants
                        .get(sku.as_str())
                        .copied()
                        .unwrap_or_else(VariantId::new),
                    product_id: id,
                    price: v.price_cents.map_or(price, |c| Money::new(c, currency)),
                    stock_quantity: v.stock_quantity,
                    options: v.options.clone(),
                    sku,
                }
            })
            .collect();

        Ok(Self {
            product,
            images,
            attributes: attribute_rows,
            variants,
            is_republish: existing.is_some(),
        })
    }

    /// SKUs this plan claims (product and variants).
    pub fn skus(&self) -> Vec<&str> {
        std::iter::once(self.product.sku.as_str())
            .chain(self.variants.iter().map(|v| v.sku.as_str()))
            .collect()
    }

    pub fn outcome(&self) -> PublishOutcome {
        PublishOutcome {
            product_id: self.product.id,
            revision: self.product.revision,
            created: !self.is_republish,
        }
    }

    pub fn into_detail(self) -> ProductDetail {
        ProductDetail {
            product: self.product,
            images: self.images,
            attributes: self.attributes,
            variants: self.variants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::tests::{colour, complete_draft, material, now};
    use crate::draft::DraftPatch;
    use chrono::Duration;

    #[test]
    fn first_publication_maps_every_field() {
        let (c, m) = (colour(), material());
        let draft = complete_draft(&c, &m);
        let plan = PublicationPlan::build(&draft, &[c.clone(), m.clone()], None, now()).unwrap();

        let p = &plan.product;
        assert_eq!(p.draft_id, draft.id);
        assert_eq!(p.slug, draft.slug);
        assert_eq!(p.title, draft.title);
        assert_eq!(p.description, draft.description);
        assert_eq!(p.brand, draft.brand);
        assert_eq!(p.category, draft.category);
        assert_eq!(p.tags, draft.tags);
        assert_eq!(p.sku, "POT-3");
        assert_eq!(p.price.amount_cents, 89_900);
        assert_eq!(p.compare_at_price.map(|m| m.amount_cents), Some(99_900));
        assert_eq!(p.cost_price.map(|m| m.amount_cents), Some(45_000));
        assert_eq!(p.stock_quantity, 12);
        assert_eq!(p.weight_grams, Some(7_500));
        assert_eq!(p.supplier, draft.supplier);
        assert_eq!(p.seo_title, draft.seo_title);
        assert_eq!(p.seo_description, draft.seo_description);
        assert_eq!(p.status, ProductStatus::Active);
        assert_eq!(p.revision, 1);
        assert_eq!(p.published_at, now());

        assert_eq!(plan.images.len(), 2);
        assert!(plan.images[0].is_primary);
        assert_eq!(plan.images[0].url, "https://cdn.example/pot.jpg");
        assert_eq!(plan.images[1].position, 1);

        assert_eq!(plan.attributes.len(), 2);
        assert_eq!(plan.attributes[0].value_id, Some(c.values[0].id));
        assert_eq!(plan.attributes[1].text_value.as_deref(), Some("Cast iron"));

        // Unpriced variant inherits the product price.
        assert_eq!(plan.variants[0].price.amount_cents, 89_900);
        assert_eq!(plan.variants[1].price.amount_cents, 94_900);

        let outcome = plan.outcome();
        assert!(outcome.created);
        assert_eq!(outcome.revision, 1);
        assert_eq!(plan.skus(), vec!["POT-3", "POT-3-BLK", "POT-3-WHT"]);
    }

    #[test]
    fn republish_keeps_identity_and_variant_ids() {
        let (c, m) = (colour(), material());
        let attrs = [c.clone(), m.clone()];
        let mut draft = complete_draft(&c, &m);
        let first = PublicationPlan::build(&draft, &attrs, None, now()).unwrap();
        draft.mark_published(first.product.id, now());
        let mut live = first.into_detail();
        live.product.archive(now()).unwrap();

        draft
            .apply_patch(DraftPatch { title: Some("Potjie No. 3 (2026)".into()), ..Default::default() }, now())
            .unwrap();
        let later = now() + Duration::hours(2);
        let second = PublicationPlan::build(&draft, &attrs, Some(&live), later).unwrap();

        assert!(second.is_republish);
        assert!(!second.outcome().created);
        assert_eq!(second.product.id, live.product.id);
        assert_eq!(second.product.revision, 2);
        assert_eq!(second.product.published_at, now());
        assert_eq!(second.product.updated_at, later);
        assert_eq!(second.product.status, ProductStatus::Archived);
        assert_eq!(second.product.title, "Potjie No. 3 (2026)");
        assert_eq!(second.variants[0].id, live.variants[0].id);
        assert_eq!(second.variants[1].id, live.variants[1].id);
    }

    #[test]
    fn republishing_unchanged_draft_yields_same_rows() {
        let (c, m) = (colour(), material());
        let attrs = [c.clone(), m.clone()];
        let mut draft = complete_draft(&c, &m);
        let first = PublicationPlan::build(&draft, &attrs, None, now()).unwrap();
        draft.mark_published(first.product.id, now());
        let live = first.clone().into_detail();

        let again = PublicationPlan::build(&draft, &attrs, Some(&live), now()).unwrap();
        assert_eq!(again.product.id, first.product.id);
        assert_eq!(again.attributes, first.attributes);
        assert_eq!(again.variants, first.variants);
        assert_eq!(again.images.len(), first.images.len());
    }

    #[test]
    fn invalid_draft_produces_no_plan() {
        let (c, m) = (colour(), material());
        let mut draft = complete_draft(&c, &m);
        draft.images.clear();
        let err = PublicationPlan::build(&draft, &[c, m], None, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref e) if e.has_field("images")));
    }

    #[test]
    fn mismatched_existing_product_is_an_invariant_violation() {
        let (c, m) = (colour(), material());
        let attrs = [c.clone(), m.clone()];
        let draft = complete_draft(&c, &m);
        let other = PublicationPlan::build(&draft, &attrs, None, now())
            .unwrap()
            .into_detail();
        // Draft was never published, but a product is supplied.
        let err = PublicationPlan::build(&draft, &attrs, Some(&other), now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
