//! Pool rows and atomic transition records.

use crate::domain::{FeeConfig, Pool, PoolId, PoolKey, PoolState, Position, TokenId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, Transaction};

use super::events::NewPoolEvent;
use super::{
    decode_amount, decode_parsed, decode_timestamp, encode_timestamp, Repository,
};

const POOL_COLUMNS: &str = "pool_id, asset, collateral, maturity, x, y, z, fee, protocol_fee, total_liquidity, created_at";

fn pool_from_row(row: &SqliteRow) -> Result<Pool, sqlx::Error> {
    Ok(Pool {
        id: decode_parsed::<PoolId>(row, "pool_id")?,
        key: PoolKey::new(
            decode_parsed::<TokenId>(row, "asset")?,
            decode_parsed::<TokenId>(row, "collateral")?,
            decode_timestamp(row, "maturity")?,
        ),
        state: PoolState::new(
            decode_amount(row, "x")?,
            decode_amount(row, "y")?,
            decode_amount(row, "z")?,
        ),
        fees: FeeConfig::new(
            decode_parsed::<u64>(row, "fee")?,
            decode_parsed::<u64>(row, "protocol_fee")?,
        ),
        total_liquidity: decode_amount(row, "total_liquidity")?,
        created_at: decode_timestamp(row, "created_at")?,
    })
}

impl Repository {
    /// Insert a freshly created pool together with its first liquidity
    /// position and creation event.
    ///
    /// Returns `false` without writing anything if a pool with the same id
    /// already exists.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is written then.
    pub async fn insert_pool(
        &self,
        pool: &Pool,
        position: &Position,
        event: &NewPoolEvent,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO pools (
                pool_id, asset, collateral, maturity, x, y, z, fee, protocol_fee,
                total_liquidity, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(pool.id.as_str())
        .bind(pool.key.asset.as_str())
        .bind(pool.key.collateral.as_str())
        .bind(encode_timestamp(pool.key.maturity)?)
        .bind(pool.state.x.to_string())
        .bind(pool.state.y.to_string())
        .bind(pool.state.z.to_string())
        .bind(pool.fees.fee.to_string())
        .bind(pool.fees.protocol_fee.to_string())
        .bind(pool.total_liquidity.to_string())
        .bind(encode_timestamp(pool.created_at)?)
        .bind(encode_timestamp(pool.created_at)?)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::upsert_position_tx(&mut tx, position, event.occurred_at).await?;
        Self::insert_event_tx(&mut tx, &pool.id, event).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Persist an accepted transition: new reserves, the touched position and
    /// the event row, in one transaction.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is written then.
    pub async fn record_transition(
        &self,
        pool: &Pool,
        position: &Position,
        event: &NewPoolEvent,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        Self::update_pool_tx(&mut tx, pool, event).await?;
        Self::upsert_position_tx(&mut tx, position, event.occurred_at).await?;
        Self::insert_event_tx(&mut tx, &pool.id, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_pool_tx(
        tx: &mut Transaction<'_, Sqlite>,
        pool: &Pool,
        event: &NewPoolEvent,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE pools
            SET x = ?, y = ?, z = ?, total_liquidity = ?, updated_at = ?
            WHERE pool_id = ?
            "#,
        )
        .bind(pool.state.x.to_string())
        .bind(pool.state.y.to_string())
        .bind(pool.state.z.to_string())
        .bind(pool.total_liquidity.to_string())
        .bind(encode_timestamp(event.occurred_at)?)
        .bind(pool.id.as_str())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Get a pool by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value is malformed.
    pub async fn get_pool(&self, pool_id: &PoolId) -> Result<Option<Pool>, sqlx::Error> {
        let sql = format!("SELECT {} FROM pools WHERE pool_id = ?", POOL_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(pool_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pool_from_row).transpose()
    }

    /// All pools, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value is malformed.
    pub async fn list_pools(&self) -> Result<Vec<Pool>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM pools ORDER BY created_at ASC, pool_id ASC",
            POOL_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(pool_from_row).collect()
    }
}
