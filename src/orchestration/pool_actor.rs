//! Single-writer actor that owns one pool.
//!
//! All jobs for a pool go through one bounded channel and are handled one at
//! a time: compute against the current reserves, check slippage bounds,
//! settle custody, persist, then apply. A job that fails at any step leaves
//! the pool and its ledger exactly as they were.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::db::{NewPoolEvent, Repository};
use crate::domain::{Address, Obligation, Pool, PoolId, PoolState, Position, PositionId};
use crate::engine::{
    self, borrow::BorrowRequest, lend::LendRequest, BorrowOutcome, EngineError, LendOutcome,
    MintOutcome, Repayment,
};
use crate::ledger::PositionLedger;

use super::clock::Clock;
use super::custody::{Custody, Transfer};
use super::orchestrator::PoolError;

/// Result of an accepted job: the touched position, what the engine
/// computed, and the reserves afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt<T> {
    pub position: Position,
    pub outcome: T,
    pub state: PoolState,
}

pub type MintReceipt = Receipt<MintOutcome>;
pub type BorrowReceipt = Receipt<BorrowOutcome>;
pub type LendReceipt = Receipt<LendOutcome>;
pub type RepayReceipt = Receipt<Repayment>;

/// Upper bounds a borrower accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorrowLimits {
    pub max_debt: Option<u128>,
    pub max_collateral: Option<u128>,
}

impl BorrowLimits {
    fn check(&self, outcome: &BorrowOutcome) -> Result<(), PoolError> {
        if let Some(max) = self.max_debt {
            if outcome.debt > max {
                return Err(PoolError::SlippageExceeded(format!(
                    "debt {} exceeds maximum {}",
                    outcome.debt, max
                )));
            }
        }
        if let Some(max) = self.max_collateral {
            if outcome.collateral > max {
                return Err(PoolError::SlippageExceeded(format!(
                    "collateral {} exceeds maximum {}",
                    outcome.collateral, max
                )));
            }
        }
        Ok(())
    }
}

/// Lower bounds a lender accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LendLimits {
    pub min_bond: Option<u128>,
    pub min_insurance: Option<u128>,
}

impl LendLimits {
    fn check(&self, outcome: &LendOutcome) -> Result<(), PoolError> {
        if let Some(min) = self.min_bond {
            if outcome.bond < min {
                return Err(PoolError::SlippageExceeded(format!(
                    "bond {} below minimum {}",
                    outcome.bond, min
                )));
            }
        }
        if let Some(min) = self.min_insurance {
            if outcome.insurance < min {
                return Err(PoolError::SlippageExceeded(format!(
                    "insurance {} below minimum {}",
                    outcome.insurance, min
                )));
            }
        }
        Ok(())
    }
}

type Reply<T> = oneshot::Sender<Result<T, PoolError>>;

enum Job {
    AddLiquidity {
        owner: Address,
        asset_in: u128,
        reply: Reply<MintReceipt>,
    },
    Borrow {
        owner: Address,
        request: BorrowRequest,
        limits: BorrowLimits,
        reply: Reply<BorrowReceipt>,
    },
    Lend {
        owner: Address,
        request: LendRequest,
        limits: LendLimits,
        reply: Reply<LendReceipt>,
    },
    Repay {
        position_id: PositionId,
        amount: u128,
        reply: Reply<RepayReceipt>,
    },
    Snapshot {
        reply: oneshot::Sender<Pool>,
    },
}

/// Cloneable sender side of a pool actor.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    pool_id: PoolId,
    jobs: mpsc::Sender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Job::AddLiquidity { .. } => "AddLiquidity",
            Job::Borrow { .. } => "Borrow",
            Job::Lend { .. } => "Lend",
            Job::Repay { .. } => "Repay",
            Job::Snapshot { .. } => "Snapshot",
        };
        f.write_str(name)
    }
}

impl PoolHandle {
    pub fn pool_id(&self) -> &PoolId {
        &self.pool_id
    }

    async fn request<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> Result<T, PoolError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(job(reply))
            .await
            .map_err(|_| PoolError::PoolUnavailable(self.pool_id.clone()))?;
        response
            .await
            .map_err(|_| PoolError::PoolUnavailable(self.pool_id.clone()))?
    }

    pub async fn add_liquidity(
        &self,
        owner: Address,
        asset_in: u128,
    ) -> Result<MintReceipt, PoolError> {
        self.request(|reply| Job::AddLiquidity {
            owner,
            asset_in,
            reply,
        })
        .await
    }

    pub async fn borrow(
        &self,
        owner: Address,
        request: BorrowRequest,
        limits: BorrowLimits,
    ) -> Result<BorrowReceipt, PoolError> {
        self.request(|reply| Job::Borrow {
            owner,
            request,
            limits,
            reply,
        })
        .await
    }

    pub async fn lend(
        &self,
        owner: Address,
        request: LendRequest,
        limits: LendLimits,
    ) -> Result<LendReceipt, PoolError> {
        self.request(|reply| Job::Lend {
            owner,
            request,
            limits,
            reply,
        })
        .await
    }

    pub async fn repay(
        &self,
        position_id: PositionId,
        amount: u128,
    ) -> Result<RepayReceipt, PoolError> {
        self.request(|reply| Job::Repay {
            position_id,
            amount,
            reply,
        })
        .await
    }

    /// Current pool record as seen by the actor.
    pub async fn snapshot(&self) -> Result<Pool, PoolError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Job::Snapshot { reply })
            .await
            .map_err(|_| PoolError::PoolUnavailable(self.pool_id.clone()))?;
        response
            .await
            .map_err(|_| PoolError::PoolUnavailable(self.pool_id.clone()))
    }
}

/// Shared collaborators every actor needs.
#[derive(Debug, Clone)]
pub struct ActorDeps {
    pub repo: Arc<Repository>,
    pub custody: Arc<dyn Custody>,
    pub clock: Arc<dyn Clock>,
}

pub struct PoolActor {
    pool: Pool,
    ledger: PositionLedger,
    deps: ActorDeps,
    jobs: mpsc::Receiver<Job>,
}

impl PoolActor {
    /// Start an actor for `pool` on the current runtime.
    pub fn spawn(
        pool: Pool,
        ledger: PositionLedger,
        deps: ActorDeps,
        queue_depth: usize,
    ) -> PoolHandle {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let handle = PoolHandle {
            pool_id: pool.id.clone(),
            jobs: sender,
        };
        let actor = PoolActor {
            pool,
            ledger,
            deps,
            jobs: receiver,
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        debug!(pool_id=%self.pool.id, positions=self.ledger.len(), "Pool actor started");
        while let Some(job) = self.jobs.recv().await {
            self.handle(job).await;
        }
        debug!(pool_id=%self.pool.id, "Pool actor stopped");
    }

    async fn handle(&mut self, job: Job) {
        // A dropped receiver only means the caller gave up waiting.
        match job {
            Job::AddLiquidity {
                owner,
                asset_in,
                reply,
            } => {
                let result = self.add_liquidity(owner, asset_in).await;
                let _ = reply.send(self.log_result("add_liquidity", result));
            }
            Job::Borrow {
                owner,
                request,
                limits,
                reply,
            } => {
                let result = self.borrow(owner, request, limits).await;
                let _ = reply.send(self.log_result("borrow", result));
            }
            Job::Lend {
                owner,
                request,
                limits,
                reply,
            } => {
                let result = self.lend(owner, request, limits).await;
                let _ = reply.send(self.log_result("lend", result));
            }
            Job::Repay {
                position_id,
                amount,
                reply,
            } => {
                let result = self.repay(position_id, amount).await;
                let _ = reply.send(self.log_result("repay", result));
            }
            Job::Snapshot { reply } => {
                let _ = reply.send(self.pool.clone());
            }
        }
    }

    fn log_result<T>(&self, op: &str, result: Result<T, PoolError>) -> Result<T, PoolError> {
        match &result {
            Ok(_) => info!(
                pool_id=%self.pool.id,
                op,
                x=%self.pool.state.x,
                y=%self.pool.state.y,
                z=%self.pool.state.z,
                "Transition accepted"
            ),
            Err(PoolError::Db(e)) => {
                error!(pool_id=%self.pool.id, op, error=%e, "Transition not persisted")
            }
            Err(e) => debug!(pool_id=%self.pool.id, op, error=%e, "Transition rejected"),
        }
        result
    }

    async fn add_liquidity(
        &mut self,
        owner: Address,
        asset_in: u128,
    ) -> Result<MintReceipt, PoolError> {
        let now = self.deps.clock.now();
        let outcome = engine::add_liquidity(
            &self.pool.state,
            self.pool.total_liquidity,
            asset_in,
            self.pool.maturity(),
            now,
        )?;
        let state = outcome.apply(&self.pool.state)?;
        let total_liquidity = self
            .pool
            .total_liquidity
            .checked_add(outcome.liquidity_out)
            .ok_or(EngineError::Math(crate::math::MathError::Overflow))?;

        let position = Position::open(
            self.pool.id.clone(),
            owner.clone(),
            Obligation::Liquidity {
                liquidity: outcome.liquidity_out,
                debt: outcome.debt,
                collateral: outcome.collateral,
            },
            now,
        );
        let transfers = [
            Transfer::into_pool(&owner, &self.pool.key.asset, asset_in),
            Transfer::into_pool(&owner, &self.pool.key.collateral, outcome.collateral),
        ];
        let event = NewPoolEvent {
            kind: "add_liquidity".to_string(),
            position_id: Some(position.id),
            payload: json!({
                "assetIn": asset_in.to_string(),
                "xIncrease": outcome.x_increase.to_string(),
                "yIncrease": outcome.y_increase.to_string(),
                "zIncrease": outcome.z_increase.to_string(),
                "liquidityOut": outcome.liquidity_out.to_string(),
                "debt": outcome.debt.to_string(),
                "collateral": outcome.collateral.to_string(),
            }),
            occurred_at: now,
        };

        self.commit(state, total_liquidity, position.clone(), &transfers, event)
            .await?;
        Ok(Receipt {
            position,
            outcome,
            state,
        })
    }

    async fn borrow(
        &mut self,
        owner: Address,
        request: BorrowRequest,
        limits: BorrowLimits,
    ) -> Result<BorrowReceipt, PoolError> {
        let now = self.deps.clock.now();
        let outcome = engine::borrow::borrow(
            &self.pool.state,
            &self.pool.fees,
            request,
            self.pool.maturity(),
            now,
        )?;
        limits.check(&outcome)?;
        let state = outcome.apply(&self.pool.state)?;

        let position = Position::open(
            self.pool.id.clone(),
            owner.clone(),
            Obligation::Borrow {
                debt: outcome.debt,
                collateral: outcome.collateral,
            },
            now,
        );
        let transfers = [
            Transfer::into_pool(&owner, &self.pool.key.collateral, outcome.collateral),
            Transfer::out_of_pool(&owner, &self.pool.key.asset, request.asset_out()),
        ];
        let event = NewPoolEvent {
            kind: "borrow".to_string(),
            position_id: Some(position.id),
            payload: json!({
                "assetOut": request.asset_out().to_string(),
                "xDecrease": outcome.x_decrease.to_string(),
                "yIncrease": outcome.y_increase.to_string(),
                "zIncrease": outcome.z_increase.to_string(),
                "debt": outcome.debt.to_string(),
                "collateral": outcome.collateral.to_string(),
                "poolFee": outcome.pool_fee.to_string(),
                "protocolFee": outcome.protocol_fee.to_string(),
            }),
            occurred_at: now,
        };

        self.commit(
            state,
            self.pool.total_liquidity,
            position.clone(),
            &transfers,
            event,
        )
        .await?;
        Ok(Receipt {
            position,
            outcome,
            state,
        })
    }

    async fn lend(
        &mut self,
        owner: Address,
        request: LendRequest,
        limits: LendLimits,
    ) -> Result<LendReceipt, PoolError> {
        let now = self.deps.clock.now();
        let outcome = engine::lend::lend(
            &self.pool.state,
            &self.pool.fees,
            request,
            self.pool.maturity(),
            now,
        )?;
        limits.check(&outcome)?;
        let state = outcome.apply(&self.pool.state)?;

        let position = Position::open(
            self.pool.id.clone(),
            owner.clone(),
            Obligation::Lend {
                bond: outcome.bond,
                insurance: outcome.insurance,
            },
            now,
        );
        let transfers = [Transfer::into_pool(
            &owner,
            &self.pool.key.asset,
            request.asset_in(),
        )];
        let event = NewPoolEvent {
            kind: "lend".to_string(),
            position_id: Some(position.id),
            payload: json!({
                "assetIn": request.asset_in().to_string(),
                "xIncrease": outcome.x_increase.to_string(),
                "yDecrease": outcome.y_decrease.to_string(),
                "zDecrease": outcome.z_decrease.to_string(),
                "bond": outcome.bond.to_string(),
                "insurance": outcome.insurance.to_string(),
                "poolFee": outcome.pool_fee.to_string(),
                "protocolFee": outcome.protocol_fee.to_string(),
            }),
            occurred_at: now,
        };

        self.commit(
            state,
            self.pool.total_liquidity,
            position.clone(),
            &transfers,
            event,
        )
        .await?;
        Ok(Receipt {
            position,
            outcome,
            state,
        })
    }

    async fn repay(
        &mut self,
        position_id: PositionId,
        amount: u128,
    ) -> Result<RepayReceipt, PoolError> {
        let now = self.deps.clock.now();
        engine::duration(self.pool.maturity(), now)?;
        let (position, repayment) = self.ledger.preview_repay(&position_id, amount)?;

        let transfers = [
            Transfer::into_pool(&position.owner, &self.pool.key.asset, amount),
            Transfer::out_of_pool(
                &position.owner,
                &self.pool.key.collateral,
                repayment.released_collateral,
            ),
        ];
        let event = NewPoolEvent {
            kind: "repay".to_string(),
            position_id: Some(position.id),
            payload: json!({
                "amount": amount.to_string(),
                "releasedCollateral": repayment.released_collateral.to_string(),
                "remainingDebt": repayment.remaining_debt.to_string(),
                "remainingCollateral": repayment.remaining_collateral.to_string(),
            }),
            occurred_at: now,
        };

        let state = self.pool.state;
        self.commit(
            state,
            self.pool.total_liquidity,
            position.clone(),
            &transfers,
            event,
        )
        .await?;
        Ok(Receipt {
            position,
            outcome: repayment,
            state,
        })
    }

    /// Settle custody, persist, then apply. Custody is unwound if the
    /// database write fails.
    async fn commit(
        &mut self,
        state: PoolState,
        total_liquidity: u128,
        position: Position,
        transfers: &[Transfer],
        event: NewPoolEvent,
    ) -> Result<(), PoolError> {
        self.deps.custody.settle(&self.pool.id, transfers).await?;

        let mut next = self.pool.clone();
        next.state = state;
        next.total_liquidity = total_liquidity;

        if let Err(e) = self
            .deps
            .repo
            .record_transition(&next, &position, &event)
            .await
        {
            unwind(self.deps.custody.as_ref(), &self.pool.id, transfers).await;
            return Err(e.into());
        }

        self.pool = next;
        self.ledger.insert(position);
        Ok(())
    }
}

/// Reverse a settled batch after a failed write.
pub(crate) async fn unwind(custody: &dyn Custody, pool_id: &PoolId, transfers: &[Transfer]) {
    let reversal: Vec<Transfer> = transfers.iter().rev().map(Transfer::reversed).collect();
    if let Err(e) = custody.settle(pool_id, &reversal).await {
        error!(pool_id=%pool_id, error=%e, "Failed to unwind custody after persistence error");
    }
}
