//! SQLite persistence for pools, positions and their event log.
//!
//! Amounts are stored as canonical decimal strings so full `u128` values
//! survive the round trip; every accepted transition is one transaction.

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, SCHEMA_VERSION};
pub use repo::{NewPoolEvent, PoolEventRow, Repository};
