use crate::api::{
    parse_amount, parse_optional_amount, parse_pool_id, AppState, PositionDto, StateDto,
};
use crate::domain::Address;
use crate::engine::LendRequest;
use crate::error::AppError;
use crate::orchestration::{LendLimits, LendReceipt};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(tag = "mode")]
pub enum LendMode {
    #[serde(rename = "givenBond", rename_all = "camelCase")]
    GivenBond { bond_out: String },
    #[serde(rename = "givenInsurance", rename_all = "camelCase")]
    GivenInsurance { insurance_out: String },
    #[serde(rename = "givenPercent")]
    GivenPercent { percent: u64 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LendBody {
    pub owner: String,
    pub asset_in: String,
    #[serde(flatten)]
    pub mode: LendMode,
    pub min_bond: Option<String>,
    pub min_insurance: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LendResponse {
    pub position: PositionDto,
    pub state: StateDto,
    pub x_increase: String,
    pub y_decrease: String,
    pub z_decrease: String,
    pub bond: String,
    pub insurance: String,
    pub pool_fee: String,
    pub protocol_fee: String,
}

impl From<&LendReceipt> for LendResponse {
    fn from(receipt: &LendReceipt) -> Self {
        Self {
            position: PositionDto::from(&receipt.position),
            state: StateDto::from(&receipt.state),
            x_increase: receipt.outcome.x_increase.to_string(),
            y_decrease: receipt.outcome.y_decrease.to_string(),
            z_decrease: receipt.outcome.z_decrease.to_string(),
            bond: receipt.outcome.bond.to_string(),
            insurance: receipt.outcome.insurance.to_string(),
            pool_fee: receipt.outcome.pool_fee.to_string(),
            protocol_fee: receipt.outcome.protocol_fee.to_string(),
        }
    }
}

fn to_request(body: &LendBody) -> Result<LendRequest, AppError> {
    let asset_in = parse_amount("assetIn", &body.asset_in)?;
    Ok(match &body.mode {
        LendMode::GivenBond { bond_out } => LendRequest::GivenBond {
            asset_in,
            bond_out: parse_amount("bondOut", bond_out)?,
        },
        LendMode::GivenInsurance { insurance_out } => LendRequest::GivenInsurance {
            asset_in,
            insurance_out: parse_amount("insuranceOut", insurance_out)?,
        },
        LendMode::GivenPercent { percent } => LendRequest::GivenPercent {
            asset_in,
            percent: *percent,
        },
    })
}

pub async fn lend(
    Path(pool_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<LendBody>,
) -> Result<Json<LendResponse>, AppError> {
    let pool_id = parse_pool_id(&pool_id)?;
    let owner = Address::from_str(&body.owner)
        .map_err(|_| AppError::BadRequest("Invalid owner address".into()))?;
    let request = to_request(&body)?;
    let limits = LendLimits {
        min_bond: parse_optional_amount("minBond", body.min_bond.as_deref())?,
        min_insurance: parse_optional_amount("minInsurance", body.min_insurance.as_deref())?,
    };

    let receipt = state
        .orchestrator
        .lend(&pool_id, owner, request, limits)
        .await?;
    Ok(Json(LendResponse::from(&receipt)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_parses_given_bond() {
        let body: LendBody = serde_json::from_str(
            r#"{"owner":"0xb0b","assetIn":"1000","mode":"givenBond","bondOut":"1100","minInsurance":"60"}"#,
        )
        .unwrap();
        assert_eq!(
            to_request(&body).unwrap(),
            LendRequest::GivenBond {
                asset_in: 1000,
                bond_out: 1100
            }
        );
        assert_eq!(body.min_insurance.as_deref(), Some("60"));
    }

    #[test]
    fn malformed_amount_is_bad_request() {
        let body: LendBody = serde_json::from_str(
            r#"{"owner":"0xb0b","assetIn":"1000","mode":"givenInsurance","insuranceOut":"lots"}"#,
        )
        .unwrap();
        assert!(matches!(to_request(&body), Err(AppError::BadRequest(_))));
    }
}
