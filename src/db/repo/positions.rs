//! Position rows and queries.

use crate::domain::{Address, Obligation, PoolId, Position, PositionId, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use super::{
    decode_amount, decode_error, decode_optional_amount, decode_parsed, decode_timestamp,
    encode_timestamp, Repository,
};

const POSITION_COLUMNS: &str =
    "position_id, pool_id, owner, kind, debt, collateral, bond, insurance, liquidity, opened_at";

fn obligation_from_row(row: &SqliteRow) -> Result<Obligation, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    match kind.as_str() {
        "borrow" => Ok(Obligation::Borrow {
            debt: decode_amount(row, "debt")?,
            collateral: decode_amount(row, "collateral")?,
        }),
        "lend" => Ok(Obligation::Lend {
            bond: decode_amount(row, "bond")?,
            insurance: decode_amount(row, "insurance")?,
        }),
        "liquidity" => Ok(Obligation::Liquidity {
            liquidity: decode_optional_amount(row, "liquidity")?.unwrap_or(0),
            debt: decode_amount(row, "debt")?,
            collateral: decode_amount(row, "collateral")?,
        }),
        other => Err(decode_error(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown position kind: {}", other),
        ))),
    }
}

fn position_from_row(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        id: decode_parsed::<PositionId>(row, "position_id")?,
        pool_id: decode_parsed::<PoolId>(row, "pool_id")?,
        owner: Address::new(row.try_get("owner")?),
        obligation: obligation_from_row(row)?,
        opened_at: decode_timestamp(row, "opened_at")?,
    })
}

/// `(debt, collateral, bond, insurance, liquidity)` column values.
type ObligationColumns = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn obligation_columns(obligation: &Obligation) -> ObligationColumns {
    match *obligation {
        Obligation::Borrow { debt, collateral } => (
            Some(debt.to_string()),
            Some(collateral.to_string()),
            None,
            None,
            None,
        ),
        Obligation::Lend { bond, insurance } => (
            None,
            None,
            Some(bond.to_string()),
            Some(insurance.to_string()),
            None,
        ),
        Obligation::Liquidity {
            liquidity,
            debt,
            collateral,
        } => (
            Some(debt.to_string()),
            Some(collateral.to_string()),
            None,
            None,
            Some(liquidity.to_string()),
        ),
    }
}

impl Repository {
    pub(super) async fn upsert_position_tx(
        tx: &mut Transaction<'_, Sqlite>,
        position: &Position,
        updated_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let (debt, collateral, bond, insurance, liquidity) =
            obligation_columns(&position.obligation);

        sqlx::query(
            r#"
            INSERT INTO positions (
                position_id, pool_id, owner, kind, debt, collateral, bond, insurance,
                liquidity, opened_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(position_id) DO UPDATE SET
                debt = excluded.debt,
                collateral = excluded.collateral,
                bond = excluded.bond,
                insurance = excluded.insurance,
                liquidity = excluded.liquidity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(position.id.to_string())
        .bind(position.pool_id.as_str())
        .bind(position.owner.as_str())
        .bind(position.obligation.kind())
        .bind(debt)
        .bind(collateral)
        .bind(bond)
        .bind(insurance)
        .bind(liquidity)
        .bind(encode_timestamp(position.opened_at)?)
        .bind(encode_timestamp(updated_at)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Get a position by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value is malformed.
    pub async fn get_position(&self, id: &PositionId) -> Result<Option<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE position_id = ?",
            POSITION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    /// Positions opened in a pool, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value is malformed.
    pub async fn positions_for_pool(&self, pool_id: &PoolId) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE pool_id = ? ORDER BY opened_at ASC, position_id ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(pool_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(position_from_row).collect()
    }

    /// Positions held by an owner across all pools, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value is malformed.
    pub async fn positions_for_owner(&self, owner: &Address) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE owner = ? ORDER BY opened_at ASC, position_id ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(position_from_row).collect()
    }
}
