//! Position records held by the ledger.

use super::primitives::{Address, PoolId, PositionId, Timestamp};

/// What a position owes or is owed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obligation {
    /// Borrower owes `debt` asset and has `collateral` locked.
    Borrow { debt: u128, collateral: u128 },
    /// Lender is owed `bond` asset, backed by `insurance` collateral.
    Lend { bond: u128, insurance: u128 },
    /// Liquidity provider holding `liquidity` tokens plus the debt and
    /// collateral taken on at mint.
    Liquidity {
        liquidity: u128,
        debt: u128,
        collateral: u128,
    },
}

impl Obligation {
    /// `(debt, collateral)` for obligations that can be repaid.
    pub fn debt_and_collateral(&self) -> Option<(u128, u128)> {
        match *self {
            Obligation::Borrow { debt, collateral } => Some((debt, collateral)),
            Obligation::Liquidity {
                debt, collateral, ..
            } => Some((debt, collateral)),
            Obligation::Lend { .. } => None,
        }
    }

    /// Copy of this obligation with its debt side replaced.
    pub fn with_debt(self, debt: u128, collateral: u128) -> Self {
        match self {
            Obligation::Borrow { .. } => Obligation::Borrow { debt, collateral },
            Obligation::Liquidity { liquidity, .. } => Obligation::Liquidity {
                liquidity,
                debt,
                collateral,
            },
            lend @ Obligation::Lend { .. } => lend,
        }
    }

    /// A repayable obligation with nothing left to repay.
    pub fn is_settled(&self) -> bool {
        matches!(self.debt_and_collateral(), Some((0, _)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Obligation::Borrow { .. } => "borrow",
            Obligation::Lend { .. } => "lend",
            Obligation::Liquidity { .. } => "liquidity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub id: PositionId,
    pub pool_id: PoolId,
    pub owner: Address,
    pub obligation: Obligation,
    pub opened_at: Timestamp,
}

impl Position {
    /// A new position with a freshly generated id.
    pub fn open(pool_id: PoolId, owner: Address, obligation: Obligation, opened_at: Timestamp) -> Self {
        Self {
            id: PositionId::generate(),
            pool_id,
            owner,
            obligation,
            opened_at,
        }
    }
}
