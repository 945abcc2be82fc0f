//! Product drafts: the mutable staging record edited through the admin
//! wizard. Nothing here is visible to shoppers until it is published.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::patch::double_option;
use shopfront_core::{
    is_valid_slug, slugify, AttributeId, AttributeValueId, Currency, DomainError, DomainResult,
    DraftId, ProductId, ValidationErrors,
};

use crate::attribute::{Attribute, AttributeKind};

/// Last step of the admin wizard (details, pricing, media, attributes,
/// variants, review).
pub const MAX_WIZARD_STEP: u8 = 5;

const MAX_IMAGES: usize = 20;
const MAX_TAGS: usize = 20;
const MAX_VARIANTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    /// Never published.
    Editing,
    /// Published and unchanged since.
    Published,
    /// Published, then edited: the live product lags behind the draft.
    Dirty,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Editing => "editing",
            DraftStatus::Published => "published",
            DraftStatus::Dirty => "dirty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "editing" => Some(DraftStatus::Editing),
            "published" => Some(DraftStatus::Published),
            "dirty" => Some(DraftStatus::Dirty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftImage {
    pub url: String,
    pub alt: Option<String>,
    #[serde(default)]
    pub position: u32,
}

/// Attribute assignment on a draft: listed values for select-like kinds,
/// `text_value` for text/number/boolean kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftAttribute {
    pub attribute_id: AttributeId,
    #[serde(default)]
    pub value_ids: Vec<AttributeValueId>,
    pub text_value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantOption {
    pub attribute_id: AttributeId,
    pub value_id: AttributeValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftVariant {
    pub sku: String,
    /// Falls back to the product price when absent.
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub stock_quantity: i64,
    pub options: Vec<VariantOption>,
}

/// Dropship source for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierInfo {
    pub name: String,
    pub sku: Option<String>,
    pub url: Option<String>,
    pub cost_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub id: DraftId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub sku: Option<String>,
    pub currency: Currency,
    pub price_cents: Option<i64>,
    pub compare_at_price_cents: Option<i64>,
    pub cost_price_cents: Option<i64>,
    pub stock_quantity: i64,
    pub weight_grams: Option<u32>,
    pub images: Vec<DraftImage>,
    pub attributes: Vec<DraftAttribute>,
    pub variants: Vec<DraftVariant>,
    pub supplier: Option<SupplierInfo>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub wizard_step: u8,
    pub status: DraftStatus,
    pub published_product_id: Option<ProductId>,
    pub last_published_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create-draft payload: the wizard's first step only needs a title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDraft {
    pub title: String,
    pub slug: Option<String>,
    pub currency: Option<Currency>,
}

impl ProductDraft {
    pub fn create(new: NewDraft, default_currency: Currency, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut errs = ValidationErrors::new();
        check_title(&mut errs, &new.title);
        let slug = match &new.slug {
            Some(s) => s.trim().to_string(),
            None => slugify(&new.title),
        };
        check_slug(&mut errs, &slug);
        errs.into_result()?;

        Ok(Self {
            id: DraftId::new(),
            title: new.title.trim().to_string(),
            slug,
            description: None,
            brand: None,
            category: None,
            tags: Vec::new(),
            sku: None,
            currency: new.currency.unwrap_or(default_currency),
            price_cents: None,
            compare_at_price_cents: None,
            cost_price_cents: None,
            stock_quantity: 0,
            weight_grams: None,
            images: Vec::new(),
            attributes: Vec::new(),
            variants: Vec::new(),
            supplier: None,
            seo_title: None,
            seo_description: None,
            wizard_step: 0,
            status: DraftStatus::Editing,
            published_product_id: None,
            last_published_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_published(&self) -> bool {
        self.published_product_id.is_some()
    }

    /// Only never-published drafts can be deleted; published ones are
    /// retired by archiving their product.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.is_published() {
            return Err(DomainError::conflict(
                "draft has been published; archive the product instead",
            ));
        }
        Ok(())
    }

    /// Apply a wizard edit. Shape checks only; completeness is checked at
    /// publication time.
    pub fn apply_patch(&mut self, patch: DraftPatch, now: DateTime<Utc>) -> DomainResult<()> {
        patch.validate()?;

        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(slug) = patch.slug {
            self.slug = slug.trim().to_string();
        }
        if let Some(v) = patch.description {
            self.description = clean(v);
        }
        if let Some(v) = patch.brand {
            self.brand = clean(v);
        }
        if let Some(v) = patch.category {
            self.category = clean(v);
        }
        if let Some(tags) = patch.tags {
            let mut seen = HashSet::new();
            self.tags = tags
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty() && seen.insert(t.clone()))
                .collect();
        }
        if let Some(v) = patch.sku {
            self.sku = clean(v);
        }
        if let Some(c) = patch.currency {
            self.currency = c;
        }
        if let Some(v) = patch.price_cents {
            self.price_cents = v;
        }
        if let Some(v) = patch.compare_at_price_cents {
            self.compare_at_price_cents = v;
        }
        if let Some(v) = patch.cost_price_cents {
            self.cost_price_cents = v;
        }
        if let Some(v) = patch.stock_quantity {
            self.stock_quantity = v;
        }
        if let Some(v) = patch.weight_grams {
            self.weight_grams = v;
        }
        if let Some(mut images) = patch.images {
            images.sort_by_key(|i| i.position);
            self.images = images;
        }
        if let Some(attrs) = patch.attributes {
            self.attributes = attrs;
        }
        if let Some(variants) = patch.variants {
            self.variants = variants;
        }
        if let Some(v) = patch.supplier {
            self.supplier = v;
        }
        if let Some(v) = patch.seo_title {
            self.seo_title = clean(v);
        }
        if let Some(v) = patch.seo_description {
            self.seo_description = clean(v);
        }
        if let Some(step) = patch.wizard_step {
            self.wizard_step = step;
        }

        if self.status == DraftStatus::Published {
            self.status = DraftStatus::Dirty;
        }
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Record a successful publication.
    pub fn mark_published(&mut self, product_id: ProductId, now: DateTime<Utc>) {
        self.status = DraftStatus::Published;
        self.published_product_id = Some(product_id);
        self.last_published_at = Some(now);
        self.version += 1;
        self.updated_at = now;
    }

    /// Every reason this draft cannot be published yet, checked against the
    /// current attribute catalog.
    pub fn validate_for_publish(&self, attributes: &[Attribute]) -> DomainResult<()> {
        let mut errs = ValidationErrors::new();
        check_title(&mut errs, &self.title);
        check_slug(&mut errs, &self.slug);

        match self.sku.as_deref() {
            Some(sku) => check_sku(&mut errs, "sku", sku),
            None => errs.push("sku", "required"),
        }
        match self.price_cents {
            Some(p) if p > 0 => {
                if let Some(cmp) = self.compare_at_price_cents {
                    errs.check(cmp > p, "compare_at_price_cents", "must be greater than price");
                }
            }
            Some(_) => errs.push("price_cents", "must be greater than zero"),
            None => errs.push("price_cents", "required"),
        }
        errs.check(self.stock_quantity >= 0, "stock_quantity", "must not be negative");

        errs.check(!self.images.is_empty(), "images", "at least one image is required");
        for (i, img) in self.images.iter().enumerate() {
            errs.check(is_http_url(&img.url), format!("images[{i}].url"), "must be an http(s) URL");
        }

        if let Some(supplier) = &self.supplier {
            errs.check(!supplier.name.trim().is_empty(), "supplier.name", "required");
            if let Some(url) = &supplier.url {
                errs.check(is_http_url(url), "supplier.url", "must be an http(s) URL");
            }
        }

        let catalog: HashMap<AttributeId, &Attribute> = attributes.iter().map(|a| (a.id, a)).collect();
        self.validate_attributes(&catalog, &mut errs);
        self.validate_variants(&catalog, &mut errs);

        errs.into_result()
    }

    fn validate_attributes(
        &self,
        catalog: &HashMap<AttributeId, &Attribute>,
        errs: &mut ValidationErrors,
    ) {
        let mut seen = HashSet::new();
        for (i, da) in self.attributes.iter().enumerate() {
            let field = format!("attributes[{i}]");
            if !seen.insert(da.attribute_id) {
                errs.push(field, "attribute assigned twice");
                continue;
            }
            let Some(attr) = catalog.get(&da.attribute_id) else {
                errs.push(field, "unknown attribute");
                continue;
            };

            if attr.kind.has_values() {
                if da.value_ids.is_empty() {
                    errs.push(format!("{field}.value_ids"), "at least one value is required");
                } else if !attr.kind.is_multi() && da.value_ids.len() > 1 {
                    errs.push(format!("{field}.value_ids"), "attribute takes a single value");
                }
                for vid in &da.value_ids {
                    if !attr.has_value(*vid) {
                        errs.push(
                            format!("{field}.value_ids"),
                            format!("value {vid} does not belong to '{}'", attr.slug),
                        );
                    }
                }
            } else {
                let text = da.text_value.as_deref().map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    errs.push(format!("{field}.text_value"), "required");
                    continue;
                }
                match attr.kind {
                    AttributeKind::Number => errs.check(
                        text.parse::<f64>().map(f64::is_finite).unwrap_or(false),
                        format!("{field}.text_value"),
                        "must be a number",
                    ),
                    AttributeKind::Boolean => errs.check(
                        matches!(text, "true" | "false"),
                        format!("{field}.text_value"),
                        "must be true or false",
                    ),
                    _ => {}
                }
            }
        }
    }

    fn validate_variants(
        &self,
        catalog: &HashMap<AttributeId, &Attribute>,
        errs: &mut ValidationErrors,
    ) {
        if self.variants.is_empty() {
            return;
        }
        errs.check(self.variants.len() <= MAX_VARIANTS, "variants", "too many variants");

        let mut skus = HashSet::new();
        let mut combos = HashSet::new();
        let mut axes: Option<BTreeSet<AttributeId>> = None;

        for (i, v) in self.variants.iter().enumerate() {
            let field = format!("variants[{i}]");
            check_sku(errs, &format!("{field}.sku"), &v.sku);
            if !skus.insert(v.sku.trim().to_string()) {
                errs.push(format!("{field}.sku"), "duplicate variant sku");
            }
            if let Some(p) = v.price_cents {
                errs.check(p > 0, format!("{field}.price_cents"), "must be greater than zero");
            }
            errs.check(v.stock_quantity >= 0, format!("{field}.stock_quantity"), "must not be negative");

            let mut this_axes = BTreeSet::new();
            for opt in &v.options {
                match catalog.get(&opt.attribute_id) {
                    Some(attr) if attr.is_variant_axis => {
                        if !attr.has_value(opt.value_id) {
                            errs.push(
                                format!("{field}.options"),
                                format!("value {} does not belong to '{}'", opt.value_id, attr.slug),
                            );
                        }
                    }
                    Some(attr) => errs.push(
                        format!("{field}.options"),
                        format!("'{}' is not a variant attribute", attr.slug),
                    ),
                    None => errs.push(format!("{field}.options"), "unknown attribute"),
                }
                if !this_axes.insert(opt.attribute_id) {
                    errs.push(format!("{field}.options"), "one option per attribute");
                }
            }
            if this_axes.is_empty() {
                errs.push(format!("{field}.options"), "at least one option is required");
            }

            match &axes {
                None => axes = Some(this_axes),
                Some(first) if *first != this_axes => errs.push(
                    format!("{field}.options"),
                    "all variants must use the same attributes",
                ),
                Some(_) => {}
            }

            let mut combo: Vec<VariantOption> = v.options.clone();
            combo.sort();
            if !combos.insert(combo) {
                errs.push(format!("{field}.options"), "duplicate option combination");
            }
        }
    }
}

/// Partial wizard update. Absent fields are untouched; `null` clears
/// nullable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DraftPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub brand: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub sku: Option<Option<String>>,
    pub currency: Option<Currency>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_cents: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub compare_at_price_cents: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub cost_price_cents: Option<Option<i64>>,
    pub stock_quantity: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub weight_grams: Option<Option<u32>>,
    pub images: Option<Vec<DraftImage>>,
    pub attributes: Option<Vec<DraftAttribute>>,
    pub variants: Option<Vec<DraftVariant>>,
    #[serde(default, deserialize_with = "double_option")]
    pub supplier: Option<Option<SupplierInfo>>,
    #[serde(default, deserialize_with = "double_option")]
    pub seo_title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub seo_description: Option<Option<String>>,
    pub wizard_step: Option<u8>,
    /// Optimistic concurrency guard (draft version the client edited).
    pub expected_version: Option<u64>,
}

impl DraftPatch {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = ValidationErrors::new();
        if let Some(t) = &self.title {
            check_title(&mut errs, t);
        }
        if let Some(s) = &self.slug {
            check_slug(&mut errs, s.trim());
        }
        for (field, v) in [
            ("price_cents", self.price_cents),
            ("compare_at_price_cents", self.compare_at_price_cents),
            ("cost_price_cents", self.cost_price_cents),
        ] {
            if let Some(Some(c)) = v {
                errs.check(c >= 0, field, "must not be negative");
            }
        }
        if let Some(q) = self.stock_quantity {
            errs.check(q >= 0, "stock_quantity", "must not be negative");
        }
        if let Some(tags) = &self.tags {
            errs.check(tags.len() <= MAX_TAGS, "tags", "too many tags");
        }
        if let Some(images) = &self.images {
            errs.check(images.len() <= MAX_IMAGES, "images", "too many images");
        }
        if let Some(Some(seo)) = &self.seo_title {
            errs.check(seo.chars().count() <= 70, "seo_title", "must be at most 70 characters");
        }
        if let Some(Some(seo)) = &self.seo_description {
            errs.check(
                seo.chars().count() <= 160,
                "seo_description",
                "must be at most 160 characters",
            );
        }
        if let Some(step) = self.wizard_step {
            errs.check(step <= MAX_WIZARD_STEP, "wizard_step", "out of range");
        }
        errs.into_result()
    }
}

fn clean(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn check_title(errs: &mut ValidationErrors, title: &str) {
    let len = title.trim().chars().count();
    errs.check((1..=200).contains(&len), "title", "must be 1 to 200 characters");
}

fn check_slug(errs: &mut ValidationErrors, slug: &str) {
    errs.check(
        is_valid_slug(slug),
        "slug",
        "must be lowercase letters, digits and single dashes",
    );
}

fn check_sku(errs: &mut ValidationErrors, field: &str, sku: &str) {
    let sku = sku.trim();
    errs.check(
        !sku.is_empty() && sku.len() <= 64 && !sku.contains(char::is_whitespace),
        field,
        "must be 1 to 64 characters without spaces",
    );
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    let Some(rest) = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://")) else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty() && !rest.contains(char::is_whitespace)
}
