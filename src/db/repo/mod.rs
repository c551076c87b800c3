//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `pools.rs` - Pool rows and atomic transition records
//! - `positions.rs` - Position rows and queries
//! - `events.rs` - Pool event log
//!
//! Amounts are stored as canonical decimal strings so no precision is lost
//! on the way through SQLite.

mod events;
mod pools;
mod positions;

pub use events::{NewPoolEvent, PoolEventRow};

use crate::domain::Timestamp;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }
}

pub(crate) fn decode_error(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn decode_amount(row: &SqliteRow, column: &str) -> Result<u128, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse::<u128>().map_err(decode_error)
}

pub(crate) fn decode_optional_amount(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<u128>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| s.parse::<u128>().map_err(decode_error))
        .transpose()
}

pub(crate) fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<Timestamp, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    u64::try_from(raw).map(Timestamp::new).map_err(decode_error)
}

pub(crate) fn decode_parsed<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(decode_error)
}

/// Seconds as stored in INTEGER columns. Values past `i64::MAX` are refused
/// rather than clamped, so a stored maturity always reads back unchanged.
pub(crate) fn encode_timestamp(ts: Timestamp) -> Result<i64, sqlx::Error> {
    i64::try_from(ts.as_secs()).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}
