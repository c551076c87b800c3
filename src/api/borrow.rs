use crate::api::{
    parse_amount, parse_optional_amount, parse_pool_id, AppState, PositionDto, StateDto,
};
use crate::domain::Address;
use crate::engine::BorrowRequest;
use crate::error::AppError;
use crate::orchestration::{BorrowLimits, BorrowReceipt};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the second leg of a borrow is pinned.
#[derive(Debug, Deserialize)]
#[serde(tag = "mode")]
pub enum BorrowMode {
    #[serde(rename = "givenDebt", rename_all = "camelCase")]
    GivenDebt { debt_in: String },
    #[serde(rename = "givenCollateral", rename_all = "camelCase")]
    GivenCollateral { collateral_in: String },
    #[serde(rename = "givenPercent")]
    GivenPercent { percent: u64 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowBody {
    pub owner: String,
    pub asset_out: String,
    #[serde(flatten)]
    pub mode: BorrowMode,
    pub max_debt: Option<String>,
    pub max_collateral: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowResponse {
    pub position: PositionDto,
    pub state: StateDto,
    pub x_decrease: String,
    pub y_increase: String,
    pub z_increase: String,
    pub debt: String,
    pub collateral: String,
    pub pool_fee: String,
    pub protocol_fee: String,
}

impl From<&BorrowReceipt> for BorrowResponse {
    fn from(receipt: &BorrowReceipt) -> Self {
        Self {
            position: PositionDto::from(&receipt.position),
            state: StateDto::from(&receipt.state),
            x_decrease: receipt.outcome.x_decrease.to_string(),
            y_increase: receipt.outcome.y_increase.to_string(),
            z_increase: receipt.outcome.z_increase.to_string(),
            debt: receipt.outcome.debt.to_string(),
            collateral: receipt.outcome.collateral.to_string(),
            pool_fee: receipt.outcome.pool_fee.to_string(),
            protocol_fee: receipt.outcome.protocol_fee.to_string(),
        }
    }
}

fn to_request(body: &BorrowBody) -> Result<BorrowRequest, AppError> {
    let asset_out = parse_amount("assetOut", &body.asset_out)?;
    Ok(match &body.mode {
        BorrowMode::GivenDebt { debt_in } => BorrowRequest::GivenDebt {
            asset_out,
            debt_in: parse_amount("debtIn", debt_in)?,
        },
        BorrowMode::GivenCollateral { collateral_in } => BorrowRequest::GivenCollateral {
            asset_out,
            collateral_in: parse_amount("collateralIn", collateral_in)?,
        },
        BorrowMode::GivenPercent { percent } => BorrowRequest::GivenPercent {
            asset_out,
            percent: *percent,
        },
    })
}

pub async fn borrow(
    Path(pool_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<BorrowBody>,
) -> Result<Json<BorrowResponse>, AppError> {
    let pool_id = parse_pool_id(&pool_id)?;
    let owner = Address::from_str(&body.owner)
        .map_err(|_| AppError::BadRequest("Invalid owner address".into()))?;
    let request = to_request(&body)?;
    let limits = BorrowLimits {
        max_debt: parse_optional_amount("maxDebt", body.max_debt.as_deref())?,
        max_collateral: parse_optional_amount("maxCollateral", body.max_collateral.as_deref())?,
    };

    let receipt = state
        .orchestrator
        .borrow(&pool_id, owner, request, limits)
        .await?;
    Ok(Json(BorrowResponse::from(&receipt)))
}
