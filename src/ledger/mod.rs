//! In-memory position ledger for a single pool.
//!
//! Positions are keyed by an opaque [`PositionId`] handed out at open time.
//! The ledger only tracks obligations; it never touches reserves.

use std::collections::HashMap;

use crate::domain::{Address, Obligation, PoolId, Position, PositionId, Timestamp};
use crate::engine::{accounting, EngineError, Repayment};

#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: HashMap<PositionId, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored positions.
    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        Self {
            positions: positions.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    /// Record a new position and return it.
    pub fn open(
        &mut self,
        pool_id: PoolId,
        owner: Address,
        obligation: Obligation,
        opened_at: Timestamp,
    ) -> Position {
        let position = Position::open(pool_id, owner, obligation, opened_at);
        self.positions.insert(position.id, position.clone());
        position
    }

    /// Insert a position built elsewhere, replacing any with the same id.
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn get(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    /// What repaying `amount` on `id` would do, without changing the ledger.
    pub fn preview_repay(
        &self,
        id: &PositionId,
        amount: u128,
    ) -> Result<(Position, Repayment), EngineError> {
        let position = self.positions.get(id).ok_or(EngineError::UnknownPosition)?;
        let (debt, collateral) = position
            .obligation
            .debt_and_collateral()
            .ok_or(EngineError::UnknownPosition)?;

        let repayment = accounting::repay(debt, collateral, amount)?;
        let mut updated = position.clone();
        updated.obligation = position
            .obligation
            .with_debt(repayment.remaining_debt, repayment.remaining_collateral);
        Ok((updated, repayment))
    }

    /// Repay `amount` of a borrow or liquidity obligation.
    ///
    /// Unknown ids and lend positions are both `UnknownPosition`.
    pub fn repay(
        &mut self,
        id: &PositionId,
        amount: u128,
    ) -> Result<(Position, Repayment), EngineError> {
        let (updated, repayment) = self.preview_repay(id, amount)?;
        self.positions.insert(updated.id, updated.clone());
        Ok((updated, repayment))
    }

    /// Positions held by `owner`, oldest first.
    pub fn for_owner(&self, owner: &Address) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .positions
            .values()
            .filter(|p| &p.owner == owner)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.id.cmp(&b.id)));
        positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
