use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgConnection;
use tracing::instrument;

use shopfront_core::PromotionId;
use shopfront_promotions::{Promotion, PromotionUpdate};

use super::{bodies, finish, get_body, PgStore};
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::store::PromotionStore;

async fn fetch_promotion(
    conn: &mut PgConnection,
    id: PromotionId,
    for_update: bool,
) -> StoreResult<Promotion> {
    let sql = format!(
        "SELECT body FROM promotions WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_promotion", e))?
        .ok_or(StoreError::NotFound)?;
    get_body(&row).map_err(|e| map_sqlx_error("fetch_promotion", e))
}

/// Write the promotion document and its indexed columns.
pub(super) async fn write_promotion(conn: &mut PgConnection, promo: &Promotion) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE promotions
        SET code = $2, active = $3, starts_at = $4, ends_at = $5, body = $6, updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(promo.id.as_uuid())
    .bind(&promo.code)
    .bind(promo.active)
    .bind(promo.starts_at)
    .bind(promo.ends_at)
    .bind(Json(promo))
    .bind(promo.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_promotion", e))?;
    Ok(())
}

#[async_trait]
impl PromotionStore for PgStore {
    #[instrument(skip(self), err)]
    async fn list_promotions(&self) -> StoreResult<Vec<Promotion>> {
        let rows = sqlx::query("SELECT body FROM promotions ORDER BY created_at DESC, id DESC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_promotions", e))?;
        bodies(&rows, "list_promotions")
    }

    #[instrument(skip(self), fields(promotion_id = %id), err)]
    async fn get_promotion(&self, id: PromotionId) -> StoreResult<Promotion> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("get_promotion", e))?;
        fetch_promotion(&mut conn, id, false).await
    }

    #[instrument(skip(self, promotion), fields(promotion_id = %promotion.id), err)]
    async fn create_promotion(&self, promotion: Promotion) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO promotions (id, code, active, starts_at, ends_at, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(promotion.id.as_uuid())
        .bind(&promotion.code)
        .bind(promotion.active)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(Json(&promotion))
        .bind(promotion.created_at)
        .bind(promotion.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_promotion", e))?;
        Ok(())
    }

    #[instrument(skip(self, update), fields(promotion_id = %id), err)]
    async fn update_promotion(
        &self,
        id: PromotionId,
        update: PromotionUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Promotion> {
        let mut tx = self.begin("update_promotion").await?;
        let result: StoreResult<_> = async {
            let mut promo = fetch_promotion(&mut tx, id, true).await?;
            promo.apply_update(update, now)?;
            write_promotion(&mut tx, &promo).await?;
            Ok(promo)
        }
        .await;
        finish(tx, result, "update_promotion").await
    }

    #[instrument(skip(self), fields(promotion_id = %id), err)]
    async fn delete_promotion(&self, id: PromotionId) -> StoreResult<()> {
        let done = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_promotion", e))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn live_promotions(&self, now: DateTime<Utc>) -> StoreResult<Vec<Promotion>> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM promotions
            WHERE active
              AND (starts_at IS NULL OR starts_at <= $1)
              AND (ends_at IS NULL OR ends_at > $1)
            ORDER BY id
            "#,
        )
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("live_promotions", e))?;
        let promos: Vec<Promotion> = bodies(&rows, "live_promotions")?;
        Ok(promos.into_iter().filter(|p| p.is_live(now)).collect())
    }
}
