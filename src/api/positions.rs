use crate::api::{parse_amount, AppState, PositionDto};
use crate::domain::{Address, PositionId};
use crate::error::AppError;
use crate::orchestration::RepayReceipt;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayRequest {
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayResponse {
    pub position: PositionDto,
    pub remaining_debt: String,
    pub remaining_collateral: String,
    pub released_collateral: String,
}

impl From<&RepayReceipt> for RepayResponse {
    fn from(receipt: &RepayReceipt) -> Self {
        Self {
            position: PositionDto::from(&receipt.position),
            remaining_debt: receipt.outcome.remaining_debt.to_string(),
            remaining_collateral: receipt.outcome.remaining_collateral.to_string(),
            released_collateral: receipt.outcome.released_collateral.to_string(),
        }
    }
}

fn parse_position_id(value: &str) -> Result<PositionId, AppError> {
    PositionId::from_str(value).map_err(|e| AppError::BadRequest(e.to_string()))
}

pub async fn get_position(
    Path(position_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PositionDto>, AppError> {
    let position_id = parse_position_id(&position_id)?;
    let position = state
        .orchestrator
        .position(&position_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("position {}", position_id)))?;
    Ok(Json(PositionDto::from(&position)))
}

pub async fn get_positions(
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionDto>>, AppError> {
    let owner = Address::from_str(&params.owner)
        .map_err(|_| AppError::BadRequest("Invalid owner address".into()))?;
    let positions = state.orchestrator.positions_for_owner(&owner).await?;
    Ok(Json(positions.iter().map(PositionDto::from).collect()))
}

pub async fn repay(
    Path(position_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<RepayRequest>,
) -> Result<Json<RepayResponse>, AppError> {
    let position_id = parse_position_id(&position_id)?;
    let amount = parse_amount("amount", &body.amount)?;
    let receipt = state.orchestrator.repay(&position_id, amount).await?;
    Ok(Json(RepayResponse::from(&receipt)))
}
