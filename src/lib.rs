pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod math;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Address, FeeConfig, Obligation, Pool, PoolId, PoolKey, PoolState, Position, PositionId,
    Timestamp, TokenId,
};
pub use engine::EngineError;
pub use error::AppError;
pub use orchestration::{Orchestrator, PoolError};
