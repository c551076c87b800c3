pub mod borrow;
pub mod health;
pub mod lend;
pub mod pools;
pub mod positions;

use crate::domain::{Obligation, Pool, PoolId, PoolState, Position};
use crate::error::AppError;
use crate::orchestration::Orchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/pools", get(pools::list_pools).post(pools::create_pool))
        .route("/v1/pools/:pool_id", get(pools::get_pool))
        .route(
            "/v1/pools/:pool_id/positions",
            get(pools::get_pool_positions),
        )
        .route("/v1/pools/:pool_id/liquidity", post(pools::add_liquidity))
        .route("/v1/pools/:pool_id/borrow", post(borrow::borrow))
        .route("/v1/pools/:pool_id/lend", post(lend::lend))
        .route("/v1/positions", get(positions::get_positions))
        .route("/v1/positions/:position_id", get(positions::get_position))
        .route("/v1/positions/:position_id/repay", post(positions::repay))
        .layer(cors)
        .with_state(state)
}

/// Parse a decimal-string amount from a request body.
pub(crate) fn parse_amount(field: &str, value: &str) -> Result<u128, AppError> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|_| AppError::BadRequest(format!("{} must be an unsigned integer string", field)))
}

pub(crate) fn parse_optional_amount(
    field: &str,
    value: Option<&str>,
) -> Result<Option<u128>, AppError> {
    value.map(|v| parse_amount(field, v)).transpose()
}

pub(crate) fn parse_pool_id(value: &str) -> Result<PoolId, AppError> {
    PoolId::from_str(value).map_err(|e| AppError::BadRequest(e.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDto {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl From<&PoolState> for StateDto {
    fn from(state: &PoolState) -> Self {
        Self {
            x: state.x.to_string(),
            y: state.y.to_string(),
            z: state.z.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDto {
    pub pool_id: String,
    pub asset: String,
    pub collateral: String,
    pub maturity: u64,
    pub state: StateDto,
    pub fee: u64,
    pub protocol_fee: u64,
    pub total_liquidity: String,
    pub created_at: u64,
}

impl From<&Pool> for PoolDto {
    fn from(pool: &Pool) -> Self {
        Self {
            pool_id: pool.id.to_string(),
            asset: pool.key.asset.to_string(),
            collateral: pool.key.collateral.to_string(),
            maturity: pool.key.maturity.as_secs(),
            state: StateDto::from(&pool.state),
            fee: pool.fees.fee,
            protocol_fee: pool.fees.protocol_fee,
            total_liquidity: pool.total_liquidity.to_string(),
            created_at: pool.created_at.as_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub position_id: String,
    pub pool_id: String,
    pub owner: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collateral: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<String>,
    pub settled: bool,
    pub opened_at: u64,
}

impl From<&Position> for PositionDto {
    fn from(position: &Position) -> Self {
        let mut dto = Self {
            position_id: position.id.to_string(),
            pool_id: position.pool_id.to_string(),
            owner: position.owner.to_string(),
            kind: position.obligation.kind(),
            debt: None,
            collateral: None,
            bond: None,
            insurance: None,
            liquidity: None,
            settled: position.obligation.is_settled(),
            opened_at: position.opened_at.as_secs(),
        };
        match position.obligation {
            Obligation::Borrow { debt, collateral } => {
                dto.debt = Some(debt.to_string());
                dto.collateral = Some(collateral.to_string());
            }
            Obligation::Lend { bond, insurance } => {
                dto.bond = Some(bond.to_string());
                dto.insurance = Some(insurance.to_string());
            }
            Obligation::Liquidity {
                liquidity,
                debt,
                collateral,
            } => {
                dto.liquidity = Some(liquidity.to_string());
                dto.debt = Some(debt.to_string());
                dto.collateral = Some(collateral.to_string());
            }
        }
        dto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, PositionId, Timestamp};

    #[test]
    fn parse_amount_accepts_decimal_strings_only() {
        assert_eq!(parse_amount("assetIn", " 500 ").unwrap(), 500);
        assert!(matches!(
            parse_amount("assetIn", "-1"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_amount("assetIn", "1.5"),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(parse_optional_amount("maxDebt", None).unwrap(), None);
    }

    #[test]
    fn position_dto_lists_obligation_fields() {
        let position = Position {
            id: PositionId::generate(),
            pool_id: PoolId("00112233445566778899aabbccddeeff".to_string()),
            owner: Address::new("0xa11ce".to_string()),
            obligation: Obligation::Lend {
                bond: 1100,
                insurance: 66,
            },
            opened_at: Timestamp::new(7),
        };
        let json = serde_json::to_value(PositionDto::from(&position)).unwrap();
        assert_eq!(json["kind"], "lend");
        assert_eq!(json["bond"], "1100");
        assert_eq!(json["insurance"], "66");
        assert!(json.get("debt").is_none());
        assert_eq!(json["settled"], false);
    }
}
