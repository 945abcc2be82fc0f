use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use tracing::{info, instrument};

use shopfront_lockers::Locker;

use super::{finish, PgStore};
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::store::LockerStore;

const LOCKER_COLUMNS: &str = "code, name, address, city, province, postal_code, latitude, \
     longitude, opening_hours, active, updated_at";

struct LockerRow(Locker);

impl FromRow<'_, PgRow> for LockerRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Locker {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            province: row.try_get("province")?,
            postal_code: row.try_get("postal_code")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            opening_hours: row.try_get("opening_hours")?,
            active: row.try_get("active")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

#[async_trait]
impl LockerStore for PgStore {
    #[instrument(skip(self, lockers), fields(count = lockers.len()), err)]
    async fn replace_lockers(&self, lockers: Vec<Locker>) -> StoreResult<usize> {
        let mut tx = self.begin("replace_lockers").await?;
        let result: StoreResult<_> = async {
            sqlx::query("DELETE FROM lockers")
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("replace_lockers", e))?;
            let mut stored = 0;
            for l in &lockers {
                let done = sqlx::query(
                    r#"
                    INSERT INTO lockers (code, name, address, city, province, postal_code,
                                         latitude, longitude, opening_hours, active, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    ON CONFLICT (code) DO UPDATE SET
                        name = EXCLUDED.name,
                        address = EXCLUDED.address,
                        city = EXCLUDED.city,
                        province = EXCLUDED.province,
                        postal_code = EXCLUDED.postal_code,
                        latitude = EXCLUDED.latitude,
                        longitude = EXCLUDED.longitude,
                        opening_hours = EXCLUDED.opening_hours,
                        active = EXCLUDED.active,
                        updated_at = EXCLUDED.updated_at
                    RETURNING (xmax = 0) AS inserted
                    "#,
                )
                .bind(&l.code)
                .bind(&l.name)
                .bind(&l.address)
                .bind(&l.city)
                .bind(&l.province)
                .bind(&l.postal_code)
                .bind(l.latitude)
                .bind(l.longitude)
                .bind(&l.opening_hours)
                .bind(l.active)
                .bind(l.updated_at)
                .fetch_one(&mut *tx)
                .await
                .and_then(|row| row.try_get::<bool, _>("inserted"))
                .map_err(|e| map_sqlx_error("replace_lockers", e))?;
                if done {
                    stored += 1;
                }
            }
            Ok(stored)
        }
        .await;
        let stored = finish(tx, result, "replace_lockers").await?;
        info!(lockers = stored, "locker directory replaced");
        Ok(stored)
    }

    #[instrument(skip(self), err)]
    async fn list_lockers(&self) -> StoreResult<Vec<Locker>> {
        let sql = format!("SELECT {LOCKER_COLUMNS} FROM lockers ORDER BY code");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_lockers", e))?;
        rows.iter()
            .map(|row| LockerRow::from_row(row).map(|r| r.0))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_lockers", e))
    }

    #[instrument(skip(self), err)]
    async fn get_locker(&self, code: &str) -> StoreResult<Locker> {
        let sql = format!("SELECT {LOCKER_COLUMNS} FROM lockers WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_locker", e))?
            .ok_or(StoreError::NotFound)?;
        LockerRow::from_row(&row)
            .map(|r| r.0)
            .map_err(|e| map_sqlx_error("get_locker", e))
    }
}
