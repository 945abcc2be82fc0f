//! Attributes, drafts, products and the publication transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, Postgres, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use shopfront_catalog::{
    Attribute, AttributeKind, AttributeUpdate, AttributeValue, DraftPatch, DraftStatus,
    NewAttributeValue, Product, ProductAttributeValue, ProductDetail, ProductDraft, ProductFilter,
    ProductImage, ProductStatus, ProductVariant, PublicationPlan, PublishOutcome, SupplierInfo,
    VariantOption,
};
use shopfront_core::{
    AttributeId, AttributeValueId, Currency, DraftId, ExpectedVersion, Money, Page, Paged,
    ProductId,
};

use super::{
    bodies, contains_pattern, decode_error, finish, get_body, get_u32, to_i32, to_i64, PgStore,
    UnknownValue,
};
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::store::{referenced_attribute_ids, CatalogStore};

const ATTRIBUTE_COLUMNS: &str =
    "id, name, slug, kind, unit, is_variant_axis, is_filterable, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, draft_id, slug, title, description, brand, category, tags, \
     sku, currency, price_cents, compare_at_price_cents, cost_price_cents, stock_quantity, \
     weight_grams, supplier, seo_title, seo_description, status, revision, published_at, updated_at";

struct AttributeRow {
    id: Uuid,
    name: String,
    slug: String,
    kind: String,
    unit: Option<String>,
    is_variant_axis: bool,
    is_filterable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for AttributeRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            kind: row.try_get("kind")?,
            unit: row.try_get("unit")?,
            is_variant_axis: row.try_get("is_variant_axis")?,
            is_filterable: row.try_get("is_filterable")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl AttributeRow {
    fn into_attribute(self, values: Vec<AttributeValue>) -> Result<Attribute, sqlx::Error> {
        let kind = AttributeKind::parse(&self.kind)
            .ok_or_else(|| decode_error("kind", UnknownValue(self.kind.clone())))?;
        Ok(Attribute {
            id: self.id.into(),
            name: self.name,
            slug: self.slug,
            kind,
            unit: self.unit,
            is_variant_axis: self.is_variant_axis,
            is_filterable: self.is_filterable,
            values,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn value_from_row(row: &PgRow) -> Result<(Uuid, AttributeValue), sqlx::Error> {
    let attribute_id: Uuid = row.try_get("attribute_id")?;
    let id: Uuid = row.try_get("id")?;
    Ok((
        attribute_id,
        AttributeValue {
            id: id.into(),
            value: row.try_get("value")?,
            label: row.try_get("label")?,
            sort_order: row.try_get("sort_order")?,
        },
    ))
}

struct ProductRow {
    id: Uuid,
    draft_id: Uuid,
    slug: String,
    title: String,
    description: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    tags: Json<Vec<String>>,
    sku: String,
    currency: String,
    price_cents: i64,
    compare_at_price_cents: Option<i64>,
    cost_price_cents: Option<i64>,
    stock_quantity: i64,
    weight_grams: Option<i32>,
    supplier: Option<Json<SupplierInfo>>,
    seo_title: Option<String>,
    seo_description: Option<String>,
    status: String,
    revision: u32,
    published_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for ProductRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            draft_id: row.try_get("draft_id")?,
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            brand: row.try_get("brand")?,
            category: row.try_get("category")?,
            tags: row.try_get("tags")?,
            sku: row.try_get("sku")?,
            currency: row.try_get("currency")?,
            price_cents: row.try_get("price_cents")?,
            compare_at_price_cents: row.try_get("compare_at_price_cents")?,
            cost_price_cents: row.try_get("cost_price_cents")?,
            stock_quantity: row.try_get("stock_quantity")?,
            weight_grams: row.try_get("weight_grams")?,
            supplier: row.try_get("supplier")?,
            seo_title: row.try_get("seo_title")?,
            seo_description: row.try_get("seo_description")?,
            status: row.try_get("status")?,
            revision: get_u32(row, "revision")?,
            published_at: row.try_get("published_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn parse_currency(raw: &str) -> Result<Currency, sqlx::Error> {
    raw.parse().map_err(|e| decode_error("currency", e))
}

impl ProductRow {
    fn into_product(self) -> Result<Product, sqlx::Error> {
        let currency = parse_currency(&self.currency)?;
        let status = ProductStatus::parse(&self.status)
            .ok_or_else(|| decode_error("status", UnknownValue(self.status.clone())))?;
        let weight_grams = self
            .weight_grams
            .map(u32::try_from)
            .transpose()
            .map_err(|e| decode_error("weight_grams", e))?;
        Ok(Product {
            id: self.id.into(),
            draft_id: self.draft_id.into(),
            slug: self.slug,
            title: self.title,
            description: self.description,
            brand: self.brand,
            category: self.category,
            tags: self.tags.0,
            sku: self.sku,
            price: Money::new(self.price_cents, currency),
            compare_at_price: self.compare_at_price_cents.map(|c| Money::new(c, currency)),
            cost_price: self.cost_price_cents.map(|c| Money::new(c, currency)),
            stock_quantity: self.stock_quantity,
            weight_grams,
            supplier: self.supplier.map(|s| s.0),
            seo_title: self.seo_title,
            seo_description: self.seo_description,
            status,
            revision: self.revision,
            published_at: self.published_at,
            updated_at: self.updated_at,
        })
    }
}

fn image_from_row(row: &PgRow) -> Result<ProductImage, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let product_id: Uuid = row.try_get("product_id")?;
    Ok(ProductImage {
        id: id.into(),
        product_id: product_id.into(),
        url: row.try_get("url")?,
        alt: row.try_get("alt")?,
        position: get_u32(row, "position")?,
        is_primary: row.try_get("is_primary")?,
    })
}

fn attribute_value_from_row(row: &PgRow) -> Result<ProductAttributeValue, sqlx::Error> {
    let product_id: Uuid = row.try_get("product_id")?;
    let attribute_id: Uuid = row.try_get("attribute_id")?;
    let value_id: Option<Uuid> = row.try_get("value_id")?;
    Ok(ProductAttributeValue {
        product_id: product_id.into(),
        attribute_id: attribute_id.into(),
        value_id: value_id.map(AttributeValueId::from),
        text_value: row.try_get("text_value")?,
    })
}

fn variant_from_row(row: &PgRow) -> Result<ProductVariant, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let product_id: Uuid = row.try_get("product_id")?;
    let currency: String = row.try_get("currency")?;
    let Json(options) = row.try_get::<Json<Vec<VariantOption>>, _>("options")?;
    Ok(ProductVariant {
        id: id.into(),
        product_id: product_id.into(),
        sku: row.try_get("sku")?,
        price: Money::new(row.try_get("price_cents")?, parse_currency(&currency)?),
        stock_quantity: row.try_get("stock_quantity")?,
        options,
    })
}

/// Attributes with their values; all of them when `ids` is `None`.
async fn fetch_attributes(
    conn: &mut PgConnection,
    ids: Option<Vec<Uuid>>,
    for_update: bool,
) -> StoreResult<Vec<Attribute>> {
    let sql = format!(
        "SELECT {ATTRIBUTE_COLUMNS} FROM attributes \
         WHERE ($1::uuid[] IS NULL OR id = ANY($1)) ORDER BY name, id{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let rows = sqlx::query(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_attributes", e))?;
    let headers = rows
        .iter()
        .map(AttributeRow::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("fetch_attributes", e))?;
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let attribute_ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
    let value_rows = sqlx::query(
        r#"
        SELECT id, attribute_id, value, label, sort_order
        FROM attribute_values
        WHERE attribute_id = ANY($1)
        ORDER BY sort_order, label
        "#,
    )
    .bind(&attribute_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_attribute_values", e))?;

    let mut values: HashMap<Uuid, Vec<AttributeValue>> = HashMap::new();
    for row in &value_rows {
        let (attribute_id, value) =
            value_from_row(row).map_err(|e| map_sqlx_error("fetch_attribute_values", e))?;
        values.entry(attribute_id).or_default().push(value);
    }

    headers
        .into_iter()
        .map(|h| {
            let vals = values.remove(&h.id).unwrap_or_default();
            h.into_attribute(vals)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("fetch_attributes", e))
}

async fn fetch_attribute(
    conn: &mut PgConnection,
    id: AttributeId,
    for_update: bool,
) -> StoreResult<Attribute> {
    fetch_attributes(conn, Some(vec![id.into()]), for_update)
        .await?
        .into_iter()
        .next()
        .ok_or(StoreError::NotFound)
}

async fn insert_value(
    conn: &mut PgConnection,
    attribute_id: AttributeId,
    value: &AttributeValue,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO attribute_values (id, attribute_id, value, label, sort_order)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(value.id.as_uuid())
    .bind(attribute_id.as_uuid())
    .bind(&value.value)
    .bind(&value.label)
    .bind(value.sort_order)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_attribute_value", e))?;
    Ok(())
}

async fn touch_attribute(conn: &mut PgConnection, attr: &Attribute) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE attributes
        SET name = $2, unit = $3, is_variant_axis = $4, is_filterable = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(attr.id.as_uuid())
    .bind(&attr.name)
    .bind(&attr.unit)
    .bind(attr.is_variant_axis)
    .bind(attr.is_filterable)
    .bind(attr.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("update_attribute", e))?;
    Ok(())
}

/// A published product references the attribute or the value.
async fn in_use(
    conn: &mut PgConnection,
    attribute_id: Option<AttributeId>,
    value_id: Option<AttributeValueId>,
) -> StoreResult<bool> {
    let row = sqlx::query(
        r#"
        SELECT
            EXISTS (
                SELECT 1 FROM product_attribute_values
                WHERE ($1::uuid IS NOT NULL AND attribute_id = $1)
                   OR ($2::uuid IS NOT NULL AND value_id = $2)
            )
            OR EXISTS (
                SELECT 1 FROM product_variants
                WHERE ($1::uuid IS NOT NULL
                       AND options @> jsonb_build_array(jsonb_build_object('attribute_id', $1::text)))
                   OR ($2::uuid IS NOT NULL
                       AND options @> jsonb_build_array(jsonb_build_object('value_id', $2::text)))
            ) AS used
        "#,
    )
    .bind(attribute_id.map(Uuid::from))
    .bind(value_id.map(Uuid::from))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("attribute_in_use", e))?;
    row.try_get("used").map_err(|e| map_sqlx_error("attribute_in_use", e))
}

/// Full details for `ids`, in the order given. Missing ids are skipped.
pub(super) async fn fetch_details(conn: &mut PgConnection, ids: &[Uuid]) -> StoreResult<Vec<ProductDetail>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let op = "fetch_product_details";
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
    let product_rows = sqlx::query(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
    let image_rows = sqlx::query(
        r#"
        SELECT id, product_id, url, alt, position, is_primary
        FROM product_images WHERE product_id = ANY($1)
        ORDER BY product_id, position
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(op, e))?;
    let attribute_rows = sqlx::query(
        r#"
        SELECT product_id, attribute_id, value_id, text_value
        FROM product_attribute_values WHERE product_id = ANY($1)
        ORDER BY product_id, attribute_id, value_id
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(op, e))?;
    let variant_rows = sqlx::query(
        r#"
        SELECT id, product_id, sku, currency, price_cents, stock_quantity, options
        FROM product_variants WHERE product_id = ANY($1)
        ORDER BY product_id, position
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(op, e))?;

    let decode = |e| map_sqlx_error(op, e);
    let mut images: HashMap<ProductId, Vec<ProductImage>> = HashMap::new();
    for row in &image_rows {
        let img = image_from_row(row).map_err(decode)?;
        images.entry(img.product_id).or_default().push(img);
    }
    let mut attributes: HashMap<ProductId, Vec<ProductAttributeValue>> = HashMap::new();
    for row in &attribute_rows {
        let av = attribute_value_from_row(row).map_err(decode)?;
        attributes.entry(av.product_id).or_default().push(av);
    }
    let mut variants: HashMap<ProductId, Vec<ProductVariant>> = HashMap::new();
    for row in &variant_rows {
        let v = variant_from_row(row).map_err(decode)?;
        variants.entry(v.product_id).or_default().push(v);
    }

    let mut details: HashMap<Uuid, ProductDetail> = HashMap::new();
    for row in &product_rows {
        let product = ProductRow::from_row(row)
            .and_then(ProductRow::into_product)
            .map_err(decode)?;
        let pid = product.id;
        details.insert(
            pid.into(),
            ProductDetail {
                product,
                images: images.remove(&pid).unwrap_or_default(),
                attributes: attributes.remove(&pid).unwrap_or_default(),
                variants: variants.remove(&pid).unwrap_or_default(),
            },
        );
    }
    Ok(ids.iter().filter_map(|id| details.remove(id)).collect())
}

async fn fetch_detail(conn: &mut PgConnection, id: ProductId) -> StoreResult<ProductDetail> {
    fetch_details(conn, &[id.into()])
        .await?
        .into_iter()
        .next()
        .ok_or(StoreError::NotFound)
}

async fn lock_product(conn: &mut PgConnection, id: ProductId) -> StoreResult<()> {
    sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?
        .ok_or(StoreError::NotFound)?;
    Ok(())
}

async fn fetch_draft(conn: &mut PgConnection, id: DraftId, for_update: bool) -> StoreResult<ProductDraft> {
    let sql = format!(
        "SELECT body FROM product_drafts WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_draft", e))?
        .ok_or(StoreError::NotFound)?;
    get_body(&row).map_err(|e| map_sqlx_error("fetch_draft", e))
}

async fn write_draft(conn: &mut PgConnection, draft: &ProductDraft) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE product_drafts
        SET status = $2, version = $3, published_product_id = $4, body = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(draft.id.as_uuid())
    .bind(draft.status.as_str())
    .bind(to_i64(draft.version))
    .bind(draft.published_product_id.map(Uuid::from))
    .bind(Json(draft))
    .bind(draft.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_draft", e))?;
    Ok(())
}

/// Another product already owns the plan's slug or one of its skus.
async fn find_collision(conn: &mut PgConnection, plan: &PublicationPlan) -> StoreResult<Option<String>> {
    let skus: Vec<String> = plan.skus().iter().map(|s| s.to_lowercase()).collect();
    let row = sqlx::query(
        r#"
        SELECT 'slug' AS what, slug AS taken, id AS owner FROM products
            WHERE id <> $1 AND slug = $2
        UNION ALL
        SELECT 'sku', sku, id FROM products
            WHERE id <> $1 AND lower(sku) = ANY($3)
        UNION ALL
        SELECT 'sku', sku, product_id FROM product_variants
            WHERE product_id <> $1 AND lower(sku) = ANY($3)
        LIMIT 1
        "#,
    )
    .bind(plan.product.id.as_uuid())
    .bind(&plan.product.slug)
    .bind(&skus)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("find_collision", e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let what: String = row.try_get("what").map_err(|e| map_sqlx_error("find_collision", e))?;
    let taken: String = row.try_get("taken").map_err(|e| map_sqlx_error("find_collision", e))?;
    let owner: Uuid = row.try_get("owner").map_err(|e| map_sqlx_error("find_collision", e))?;
    Ok(Some(format!("{what} '{taken}' is used by product {owner}")))
}

/// Upsert the product row and replace its dependent rows.
async fn write_plan(conn: &mut PgConnection, plan: &PublicationPlan) -> StoreResult<()> {
    let op = "write_publication";
    let p = &plan.product;
    sqlx::query(
        r#"
        INSERT INTO products (
            id, draft_id, slug, title, description, brand, category, tags, sku, currency,
            price_cents, compare_at_price_cents, cost_price_cents, stock_quantity, weight_grams,
            supplier, seo_title, seo_description, status, revision, published_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22)
        ON CONFLICT (id) DO UPDATE SET
            slug = EXCLUDED.slug,
            title = EXCLUDED.title,
            description = EXCLUDED.description,
            brand = EXCLUDED.brand,
            category = EXCLUDED.category,
            tags = EXCLUDED.tags,
            sku = EXCLUDED.sku,
            currency = EXCLUDED.currency,
            price_cents = EXCLUDED.price_cents,
            compare_at_price_cents = EXCLUDED.compare_at_price_cents,
            cost_price_cents = EXCLUDED.cost_price_cents,
            stock_quantity = EXCLUDED.stock_quantity,
            weight_grams = EXCLUDED.weight_grams,
            supplier = EXCLUDED.supplier,
            seo_title = EXCLUDED.seo_title,
            seo_description = EXCLUDED.seo_description,
            status = EXCLUDED.status,
            revision = EXCLUDED.revision,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(p.id.as_uuid())
    .bind(p.draft_id.as_uuid())
    .bind(&p.slug)
    .bind(&p.title)
    .bind(&p.description)
    .bind(&p.brand)
    .bind(&p.category)
    .bind(Json(&p.tags))
    .bind(&p.sku)
    .bind(p.price.currency.code())
    .bind(p.price.amount_cents)
    .bind(p.compare_at_price.map(|m| m.amount_cents))
    .bind(p.cost_price.map(|m| m.amount_cents))
    .bind(p.stock_quantity)
    .bind(p.weight_grams.map(to_i32))
    .bind(p.supplier.as_ref().map(Json))
    .bind(&p.seo_title)
    .bind(&p.seo_description)
    .bind(p.status.as_str())
    .bind(to_i32(p.revision))
    .bind(p.published_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(op, e))?;

    for table in ["product_images", "product_attribute_values", "product_variants"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE product_id = $1"))
            .bind(p.id.as_uuid())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
    }

    for img in &plan.images {
        sqlx::query(
            r#"
            INSERT INTO product_images (id, product_id, url, alt, position, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(img.id.as_uuid())
        .bind(p.id.as_uuid())
        .bind(&img.url)
        .bind(&img.alt)
        .bind(to_i32(img.position))
        .bind(img.is_primary)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
    }

    for av in &plan.attributes {
        sqlx::query(
            r#"
            INSERT INTO product_attribute_values (product_id, attribute_id, value_id, text_value)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(p.id.as_uuid())
        .bind(av.attribute_id.as_uuid())
        .bind(av.value_id.map(Uuid::from))
        .bind(&av.text_value)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
    }

    for (position, v) in plan.variants.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO product_variants (id, product_id, sku, currency, price_cents, stock_quantity, options, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(v.id.as_uuid())
        .bind(p.id.as_uuid())
        .bind(&v.sku)
        .bind(v.price.currency.code())
        .bind(v.price.amount_cents)
        .bind(v.stock_quantity)
        .bind(Json(&v.options))
        .bind(i32::try_from(position).unwrap_or(i32::MAX))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
    }
    Ok(())
}

async fn publish(
    conn: &mut PgConnection,
    id: DraftId,
    expected: ExpectedVersion,
    now: DateTime<Utc>,
) -> StoreResult<PublishOutcome> {
    let draft = fetch_draft(conn, id, true).await?;
    expected.check(draft.version)?;

    let attribute_ids: Vec<Uuid> = referenced_attribute_ids(&draft)
        .into_iter()
        .map(Uuid::from)
        .collect();
    // Locked so a concurrent value removal cannot orphan a variant option.
    let attributes = fetch_attributes(conn, Some(attribute_ids), true).await?;

    let existing = match draft.published_product_id {
        Some(pid) => {
            lock_product(conn, pid).await?;
            Some(fetch_detail(conn, pid).await?)
        }
        None => None,
    };

    let plan = PublicationPlan::build(&draft, &attributes, existing.as_ref(), now)?;
    if let Some(msg) = find_collision(conn, &plan).await? {
        return Err(StoreError::Conflict(msg));
    }
    write_plan(conn, &plan).await?;

    let outcome = plan.outcome();
    let mut published = draft;
    published.mark_published(outcome.product_id, now);
    write_draft(conn, &published).await?;
    Ok(outcome)
}

struct FilterArgs {
    status: Option<&'static str>,
    category: Option<String>,
    min_price_cents: Option<i64>,
    max_price_cents: Option<i64>,
    value_id: Option<Uuid>,
    search: Option<String>,
}

impl From<&ProductFilter> for FilterArgs {
    fn from(f: &ProductFilter) -> Self {
        Self {
            status: f.status.map(|s| s.as_str()),
            category: f.category.clone(),
            min_price_cents: f.min_price_cents,
            max_price_cents: f.max_price_cents,
            value_id: f.attribute_value.map(Uuid::from),
            search: f
                .search
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(|q| contains_pattern(&q.to_lowercase())),
        }
    }
}

const PRODUCT_FILTER: &str = r#"
    FROM products p
    WHERE ($1::text IS NULL OR p.status = $1)
      AND ($2::text IS NULL OR lower(p.category) = lower($2))
      AND ($3::bigint IS NULL OR p.price_cents >= $3)
      AND ($4::bigint IS NULL OR p.price_cents <= $4)
      AND ($5::uuid IS NULL
           OR EXISTS (SELECT 1 FROM product_attribute_values a
                      WHERE a.product_id = p.id AND a.value_id = $5)
           OR EXISTS (SELECT 1 FROM product_variants v
                      WHERE v.product_id = p.id
                        AND v.options @> jsonb_build_array(jsonb_build_object('value_id', $5::text))))
      AND ($6::text IS NULL
           OR lower(p.title) LIKE $6
           OR lower(coalesce(p.brand, '')) LIKE $6
           OR EXISTS (SELECT 1 FROM jsonb_array_elements_text(p.tags) t WHERE t LIKE $6))
"#;

fn filtered<'q>(sql: &'q str, args: &'q FilterArgs) -> Query<'q, Postgres, PgArguments> {
    sqlx::query(sql)
        .bind(args.status)
        .bind(args.category.as_deref())
        .bind(args.min_price_cents)
        .bind(args.max_price_cents)
        .bind(args.value_id)
        .bind(args.search.as_deref())
}

#[async_trait]
impl CatalogStore for PgStore {
    #[instrument(skip(self), err)]
    async fn list_attributes(&self) -> StoreResult<Vec<Attribute>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("list_attributes", e))?;
        fetch_attributes(&mut conn, None, false).await
    }

    #[instrument(skip(self), fields(attribute_id = %id), err)]
    async fn get_attribute(&self, id: AttributeId) -> StoreResult<Attribute> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_attribute", e))?;
        fetch_attribute(&mut conn, id, false).await
    }

    #[instrument(skip(self, attribute), fields(attribute_id = %attribute.id, slug = %attribute.slug), err)]
    async fn create_attribute(&self, attribute: Attribute) -> StoreResult<()> {
        let mut tx = self.begin("create_attribute").await?;
        let result: StoreResult<_> = async {
            sqlx::query(
                r#"
                INSERT INTO attributes (id, name, slug, kind, unit, is_variant_axis, is_filterable, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(attribute.id.as_uuid())
            .bind(&attribute.name)
            .bind(&attribute.slug)
            .bind(attribute.kind.as_str())
            .bind(&attribute.unit)
            .bind(attribute.is_variant_axis)
            .bind(attribute.is_filterable)
            .bind(attribute.created_at)
            .bind(attribute.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_attribute", e))?;
            for value in &attribute.values {
                insert_value(&mut tx, attribute.id, value).await?;
            }
            Ok(())
        }
        .await;
        finish(tx, result, "create_attribute").await
    }

    #[instrument(skip(self), fields(attribute_id = %id), err)]
    async fn update_attribute(
        &self,
        id: AttributeId,
        update: AttributeUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Attribute> {
        let mut tx = self.begin("update_attribute").await?;
        let result: StoreResult<_> = async {
            let mut attr = fetch_attribute(&mut tx, id, true).await?;
            attr.apply_update(update, now)?;
            touch_attribute(&mut tx, &attr).await?;
            Ok(attr)
        }
        .await;
        finish(tx, result, "update_attribute").await
    }

    #[instrument(skip(self), fields(attribute_id = %id), err)]
    async fn delete_attribute(&self, id: AttributeId) -> StoreResult<()> {
        let mut tx = self.begin("delete_attribute").await?;
        let result: StoreResult<_> = async {
            fetch_attribute(&mut tx, id, true).await?;
            if in_use(&mut tx, Some(id), None).await? {
                return Err(StoreError::Conflict(
                    "attribute is used by published products".into(),
                ));
            }
            sqlx::query("DELETE FROM attributes WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_attribute", e))?;
            Ok(())
        }
        .await;
        finish(tx, result, "delete_attribute").await
    }

    #[instrument(skip(self, value), fields(attribute_id = %id), err)]
    async fn add_attribute_value(
        &self,
        id: AttributeId,
        value: NewAttributeValue,
        now: DateTime<Utc>,
    ) -> StoreResult<(Attribute, AttributeValueId)> {
        let mut tx = self.begin("add_attribute_value").await?;
        let result: StoreResult<_> = async {
            let mut attr = fetch_attribute(&mut tx, id, true).await?;
            let value_id = attr.add_value(value, now)?;
            let added = attr.value(value_id).cloned().ok_or(StoreError::NotFound)?;
            insert_value(&mut tx, id, &added).await?;
            touch_attribute(&mut tx, &attr).await?;
            Ok((attr, value_id))
        }
        .await;
        finish(tx, result, "add_attribute_value").await
    }

    #[instrument(skip(self), fields(attribute_id = %id, value_id = %value_id), err)]
    async fn remove_attribute_value(
        &self,
        id: AttributeId,
        value_id: AttributeValueId,
        now: DateTime<Utc>,
    ) -> StoreResult<Attribute> {
        let mut tx = self.begin("remove_attribute_value").await?;
        let result: StoreResult<_> = async {
            let mut attr = fetch_attribute(&mut tx, id, true).await?;
            if !attr.has_value(value_id) {
                return Err(StoreError::NotFound);
            }
            if in_use(&mut tx, None, Some(value_id)).await? {
                return Err(StoreError::Conflict(
                    "attribute value is used by published products".into(),
                ));
            }
            attr.remove_value(value_id, now)?;
            sqlx::query("DELETE FROM attribute_values WHERE id = $1")
                .bind(value_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("remove_attribute_value", e))?;
            touch_attribute(&mut tx, &attr).await?;
            Ok(attr)
        }
        .await;
        finish(tx, result, "remove_attribute_value").await
    }

    #[instrument(skip(self, draft), fields(draft_id = %draft.id), err)]
    async fn create_draft(&self, draft: ProductDraft) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_drafts (id, status, version, published_product_id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(draft.id.as_uuid())
        .bind(draft.status.as_str())
        .bind(to_i64(draft.version))
        .bind(draft.published_product_id.map(Uuid::from))
        .bind(Json(&draft))
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_draft", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(draft_id = %id), err)]
    async fn get_draft(&self, id: DraftId) -> StoreResult<ProductDraft> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_draft", e))?;
        fetch_draft(&mut conn, id, false).await
    }

    #[instrument(skip(self), err)]
    async fn list_drafts(
        &self,
        status: Option<DraftStatus>,
        page: Page,
    ) -> StoreResult<Paged<ProductDraft>> {
        let status = status.map(|s| s.as_str());
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM product_drafts WHERE ($1::text IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("list_drafts", e))?;
        let rows = sqlx::query(
            r#"
            SELECT body FROM product_drafts
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY updated_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_drafts", e))?;
        let drafts = bodies(&rows, "list_drafts")?;
        Ok(Paged::new(drafts, total.max(0).unsigned_abs(), page))
    }

    #[instrument(skip(self, patch), fields(draft_id = %id), err)]
    async fn update_draft(
        &self,
        id: DraftId,
        patch: DraftPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<ProductDraft> {
        let mut tx = self.begin("update_draft").await?;
        let result: StoreResult<_> = async {
            let mut draft = fetch_draft(&mut tx, id, true).await?;
            ExpectedVersion::from_option(patch.expected_version).check(draft.version)?;
            draft.apply_patch(patch, now)?;
            write_draft(&mut tx, &draft).await?;
            Ok(draft)
        }
        .await;
        finish(tx, result, "update_draft").await
    }

    #[instrument(skip(self), fields(draft_id = %id), err)]
    async fn delete_draft(&self, id: DraftId) -> StoreResult<()> {
        let mut tx = self.begin("delete_draft").await?;
        let result: StoreResult<_> = async {
            fetch_draft(&mut tx, id, true).await?.ensure_deletable()?;
            sqlx::query("DELETE FROM product_drafts WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_draft", e))?;
            Ok(())
        }
        .await;
        finish(tx, result, "delete_draft").await
    }

    #[instrument(skip(self), fields(draft_id = %id), err)]
    async fn publish_draft(
        &self,
        id: DraftId,
        expected: ExpectedVersion,
        now: DateTime<Utc>,
    ) -> StoreResult<PublishOutcome> {
        let mut tx = self.begin("publish_draft").await?;
        let result = publish(&mut tx, id, expected, now).await;
        let outcome = finish(tx, result, "publish_draft").await?;
        info!(
            draft_id = %id,
            product_id = %outcome.product_id,
            revision = outcome.revision,
            created = outcome.created,
            "draft published"
        );
        Ok(outcome)
    }

    #[instrument(skip(self), err)]
    async fn list_products(
        &self,
        filter: ProductFilter,
        page: Page,
    ) -> StoreResult<Paged<ProductDetail>> {
        let args = FilterArgs::from(&filter);
        let count_sql = format!("SELECT COUNT(*) AS total {PRODUCT_FILTER}");
        let ids_sql = format!(
            "SELECT p.id {PRODUCT_FILTER} ORDER BY p.published_at DESC, p.id DESC LIMIT $7 OFFSET $8"
        );

        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("list_products", e))?;
        let total: i64 = filtered(&count_sql, &args)
            .fetch_one(&mut *conn)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("list_products", e))?;
        let ids: Vec<Uuid> = filtered(&ids_sql, &args)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_products", e))?;

        let details = fetch_details(&mut conn, &ids).await?;
        Ok(Paged::new(details, total.max(0).unsigned_abs(), page))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<ProductDetail> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_product", e))?;
        fetch_detail(&mut conn, id).await
    }

    #[instrument(skip(self), err)]
    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<ProductDetail> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("get_product_by_slug", e))?;
        let row = sqlx::query("SELECT id FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_product_by_slug", e))?
            .ok_or(StoreError::NotFound)?;
        let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("get_product_by_slug", e))?;
        fetch_detail(&mut conn, id.into()).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn products_by_ids(&self, ids: &[ProductId]) -> StoreResult<Vec<ProductDetail>> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("products_by_ids", e))?;
        fetch_details(&mut conn, &ids).await
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn set_product_archived(
        &self,
        id: ProductId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Product> {
        let mut tx = self.begin("set_product_archived").await?;
        let result: StoreResult<_> = async {
            lock_product(&mut tx, id).await?;
            let mut product = fetch_detail(&mut tx, id).await?.product;
            if archived {
                product.archive(now)?;
            } else {
                product.unarchive(now)?;
            }
            sqlx::query("UPDATE products SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(product.status.as_str())
                .bind(product.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_product_archived", e))?;
            Ok(product)
        }
        .await;
        finish(tx, result, "set_product_archived").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfront_catalog::{DraftPatch, DraftVariant, VariantOption};

    use super::super::scratch_store;
    use crate::store::fixtures::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_and_value_removal_do_not_both_succeed() {
        let Some(store) = scratch_store().await else {
            eprintln!("SHOPFRONT_TEST_DATABASE_URL not set; skipping");
            return;
        };
        let (draft, attrs) = seeded_draft(&store).await;
        let white = attrs.colour.values.iter().find(|v| v.value == "White").unwrap().id;
        let patch = DraftPatch {
            variants: Some(vec![DraftVariant {
                sku: "POT-3-WHT".into(),
                price_cents: None,
                stock_quantity: 4,
                options: vec![VariantOption { attribute_id: attrs.colour.id, value_id: white }],
            }]),
            ..Default::default()
        };
        store.update_draft(draft.id, patch, at(1)).await.unwrap();

        let (published, removed) = tokio::join!(
            store.publish_draft(draft.id, ExpectedVersion::Any, at(2)),
            store.remove_attribute_value(attrs.colour.id, white, at(2)),
        );
        assert!(published.is_ok() != removed.is_ok(), "exactly one side must win");
        if let Ok(outcome) = published {
            let detail = store.get_product(outcome.product_id).await.unwrap();
            let colour = store.get_attribute(attrs.colour.id).await.unwrap();
            for variant in &detail.variants {
                for option in &variant.options {
                    assert!(colour.has_value(option.value_id));
                }
            }
        }
    }
}
