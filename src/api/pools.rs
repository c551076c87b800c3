use crate::api::{parse_amount, parse_pool_id, AppState, PoolDto, PositionDto, StateDto};
use crate::domain::{Address, FeeConfig, Timestamp, TokenId};
use crate::error::AppError;
use crate::orchestration::{CreatePool, MintReceipt};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub asset: String,
    pub collateral: String,
    pub maturity: u64,
    pub owner: String,
    pub asset_in: String,
    pub debt_in: String,
    pub collateral_in: String,
    pub fee: Option<u64>,
    pub protocol_fee: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLiquidityRequest {
    pub owner: String,
    pub asset_in: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub position: PositionDto,
    pub state: StateDto,
    pub liquidity_out: String,
    pub debt: String,
    pub collateral: String,
}

impl From<&MintReceipt> for MintResponse {
    fn from(receipt: &MintReceipt) -> Self {
        Self {
            position: PositionDto::from(&receipt.position),
            state: StateDto::from(&receipt.state),
            liquidity_out: receipt.outcome.liquidity_out.to_string(),
            debt: receipt.outcome.debt.to_string(),
            collateral: receipt.outcome.collateral.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolResponse {
    pub pool: PoolDto,
    #[serde(flatten)]
    pub mint: MintResponse,
}

pub async fn create_pool(
    State(state): State<AppState>,
    Json(body): Json<CreatePoolRequest>,
) -> Result<(StatusCode, Json<CreatePoolResponse>), AppError> {
    let asset = TokenId::from_str(&body.asset)
        .map_err(|_| AppError::BadRequest("Invalid asset".into()))?;
    let collateral = TokenId::from_str(&body.collateral)
        .map_err(|_| AppError::BadRequest("Invalid collateral".into()))?;
    if asset == collateral {
        return Err(AppError::BadRequest(
            "asset and collateral must differ".into(),
        ));
    }
    let owner = Address::from_str(&body.owner)
        .map_err(|_| AppError::BadRequest("Invalid owner address".into()))?;

    let fees = match (body.fee, body.protocol_fee) {
        (None, None) => None,
        (fee, protocol_fee) => Some(FeeConfig::new(
            fee.unwrap_or_default(),
            protocol_fee.unwrap_or_default(),
        )),
    };

    let request = CreatePool {
        asset,
        collateral,
        maturity: Timestamp::new(body.maturity),
        owner,
        asset_in: parse_amount("assetIn", &body.asset_in)?,
        debt_in: parse_amount("debtIn", &body.debt_in)?,
        collateral_in: parse_amount("collateralIn", &body.collateral_in)?,
        fees,
    };

    let receipt = state.orchestrator.create_pool(request).await?;
    let pool = state.orchestrator.pool(&receipt.position.pool_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePoolResponse {
            pool: PoolDto::from(&pool),
            mint: MintResponse::from(&receipt),
        }),
    ))
}

pub async fn list_pools(State(state): State<AppState>) -> Result<Json<Vec<PoolDto>>, AppError> {
    let pools = state.orchestrator.pools().await?;
    Ok(Json(pools.iter().map(PoolDto::from).collect()))
}

pub async fn get_pool(
    Path(pool_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PoolDto>, AppError> {
    let pool_id = parse_pool_id(&pool_id)?;
    let pool = state.orchestrator.pool(&pool_id).await?;
    Ok(Json(PoolDto::from(&pool)))
}

pub async fn get_pool_positions(
    Path(pool_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionDto>>, AppError> {
    let pool_id = parse_pool_id(&pool_id)?;
    let positions = state.orchestrator.positions_for_pool(&pool_id).await?;
    Ok(Json(positions.iter().map(PositionDto::from).collect()))
}

pub async fn add_liquidity(
    Path(pool_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AddLiquidityRequest>,
) -> Result<Json<MintResponse>, AppError> {
    let pool_id = parse_pool_id(&pool_id)?;
    let owner = Address::from_str(&body.owner)
        .map_err(|_| AppError::BadRequest("Invalid owner address".into()))?;
    let asset_in = parse_amount("assetIn", &body.asset_in)?;

    let receipt = state
        .orchestrator
        .add_liquidity(&pool_id, owner, asset_in)
        .await?;
    Ok(Json(MintResponse::from(&receipt)))
}
