//! Domain types for the fixed-maturity lending pool.
//!
//! This module provides:
//! - Domain primitives: Timestamp, Address, TokenId, PoolId, PositionId
//! - Pool identity, reserves and fee parameters
//! - Position obligations tracked by the ledger

pub mod pool;
pub mod position;
pub mod primitives;

pub use pool::{FeeConfig, Pool, PoolKey, PoolState};
pub use position::{Obligation, Position};
pub use primitives::{Address, IdParseError, PoolId, PositionId, Timestamp, TokenId};
