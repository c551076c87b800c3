//! Append-only pool event log.

use crate::domain::{PoolId, PositionId, Timestamp};
use sqlx::{Row, Sqlite, Transaction};

use super::{decode_error, decode_timestamp, encode_timestamp, Repository};

/// Event to append alongside a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPoolEvent {
    pub kind: String,
    pub position_id: Option<PositionId>,
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
}

/// Stored event row.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEventRow {
    pub id: i64,
    pub pool_id: PoolId,
    pub kind: String,
    pub position_id: Option<String>,
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
}

impl Repository {
    pub(super) async fn insert_event_tx(
        tx: &mut Transaction<'_, Sqlite>,
        pool_id: &PoolId,
        event: &NewPoolEvent,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO pool_events (pool_id, kind, position_id, payload, occurred_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(pool_id.as_str())
        .bind(event.kind.as_str())
        .bind(event.position_id.map(|id| id.to_string()))
        .bind(event.payload.to_string())
        .bind(encode_timestamp(event.occurred_at)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Events for a pool in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a payload is not valid JSON.
    pub async fn events_for_pool(&self, pool_id: &PoolId) -> Result<Vec<PoolEventRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, pool_id, kind, position_id, payload, occurred_at
            FROM pool_events
            WHERE pool_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(pool_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PoolEventRow, sqlx::Error> {
                let payload: String = row.try_get("payload")?;
                Ok(PoolEventRow {
                    id: row.try_get("id")?,
                    pool_id: pool_id.clone(),
                    kind: row.try_get("kind")?,
                    position_id: row.try_get("position_id")?,
                    payload: serde_json::from_str(&payload).map_err(decode_error)?,
                    occurred_at: decode_timestamp(row, "occurred_at")?,
                })
            })
            .collect()
    }
}
