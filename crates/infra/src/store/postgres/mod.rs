//! Postgres-backed stores.
//!
//! Catalog rows (products, images, attribute values, variants) are fully
//! relational. Checkouts, orders, supplier orders, shipments, promotions and
//! drafts are stored as JSONB documents next to the columns used for
//! filtering and uniqueness; the document is authoritative.
//!
//! Multi-row writes run in one transaction: a helper body does the work on
//! `&mut PgConnection` and `finish` commits on success or rolls back on
//! error.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::warn;

use crate::error::{map_sqlx_error, StoreResult};

mod catalog;
mod lockers;
mod orders;
mod promotions;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

/// Commit on success, roll back on error.
async fn finish<T>(
    tx: Transaction<'_, Postgres>,
    result: StoreResult<T>,
    operation: &str,
) -> StoreResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|e| map_sqlx_error(operation, e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                warn!(operation, error = %rb, "rollback failed");
            }
            Err(err)
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown value '{0}'")]
struct UnknownValue(String);

fn decode_error(
    column: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

fn get_body<T: DeserializeOwned>(row: &PgRow) -> Result<T, sqlx::Error> {
    let Json(body) = row.try_get::<Json<T>, _>("body")?;
    Ok(body)
}

fn get_u32(row: &PgRow, column: &str) -> Result<u32, sqlx::Error> {
    let raw: i32 = row.try_get(column)?;
    u32::try_from(raw).map_err(|e| decode_error(column, e))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Decode every row's JSONB `body`.
fn bodies<T: DeserializeOwned>(rows: &[PgRow], operation: &str) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(|row| get_body(row).map_err(|e| map_sqlx_error(operation, e)))
        .collect()
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards escaped.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// A store in a throwaway schema of `SHOPFRONT_TEST_DATABASE_URL`, or
/// `None` when that variable is unset.
#[cfg(test)]
async fn scratch_store() -> Option<PgStore> {
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    let url = std::env::var("SHOPFRONT_TEST_DATABASE_URL").ok()?;
    let schema = format!("shopfront_test_{}", uuid::Uuid::now_v7().simple());
    let admin = crate::db::connect(&url, 1).await.unwrap();
    sqlx::query(&format!("CREATE SCHEMA {schema}")).execute(&admin).await.unwrap();
    let options = url
        .parse::<PgConnectOptions>()
        .unwrap()
        .options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new().max_connections(4).connect_with(options).await.unwrap();
    crate::db::apply_schema(&pool).await.unwrap();
    Some(PgStore::new(pool))
}
