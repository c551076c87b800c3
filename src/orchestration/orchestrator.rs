use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::db::{NewPoolEvent, Repository};
use crate::domain::{
    Address, FeeConfig, Obligation, Pool, PoolId, PoolKey, PoolState, Position, PositionId,
    Timestamp, TokenId,
};
use crate::engine::{self, BorrowRequest, EngineError, LendRequest};
use crate::ledger::PositionLedger;

use super::clock::Clock;
use super::custody::{Custody, CustodyError, Transfer};
use super::pool_actor::{
    unwind, ActorDeps, BorrowLimits, BorrowReceipt, LendLimits, LendReceipt, MintReceipt,
    PoolActor, PoolHandle, Receipt, RepayReceipt,
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Custody(#[from] CustodyError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),
    #[error("pool {0} already exists")]
    PoolExists(PoolId),
    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),
    #[error("pool {0} is not accepting requests")]
    PoolUnavailable(PoolId),
    #[error("maturity {0} is past the latest storable timestamp")]
    MaturityOutOfRange(Timestamp),
}

/// Parameters for opening a pool with its first deposit.
#[derive(Debug, Clone)]
pub struct CreatePool {
    pub asset: TokenId,
    pub collateral: TokenId,
    pub maturity: Timestamp,
    pub owner: Address,
    pub asset_in: u128,
    pub debt_in: u128,
    pub collateral_in: u128,
    /// Falls back to the orchestrator default.
    pub fees: Option<FeeConfig>,
}

/// Claim on a pool id while its creation is in flight. Dropping it
/// releases the id, including when the creating future is cancelled.
struct Reservation<'a> {
    claims: &'a Mutex<HashSet<PoolId>>,
    pool_id: PoolId,
}

impl<'a> Reservation<'a> {
    fn claim(claims: &'a Mutex<HashSet<PoolId>>, pool_id: &PoolId) -> Option<Self> {
        let mut held = claims.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(pool_id.clone()) {
            return None;
        }
        Some(Self {
            claims,
            pool_id: pool_id.clone(),
        })
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.pool_id);
    }
}

/// Registry of live pool actors plus the read side of the store.
#[derive(Debug)]
pub struct Orchestrator {
    pools: RwLock<HashMap<PoolId, PoolHandle>>,
    creating: Mutex<HashSet<PoolId>>,
    deps: ActorDeps,
    default_fees: FeeConfig,
    queue_depth: usize,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<Repository>,
        custody: Arc<dyn Custody>,
        clock: Arc<dyn Clock>,
        default_fees: FeeConfig,
        queue_depth: usize,
    ) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            creating: Mutex::new(HashSet::new()),
            deps: ActorDeps {
                repo,
                custody,
                clock,
            },
            default_fees,
            queue_depth,
        }
    }

    /// Start an actor for every stored pool. Returns how many were loaded.
    pub async fn load(&self) -> Result<usize, PoolError> {
        let stored = self.deps.repo.list_pools().await?;
        let mut pools = self.pools.write().await;
        let mut loaded = 0;

        for pool in stored {
            if pools.contains_key(&pool.id) {
                continue;
            }
            let positions = self.deps.repo.positions_for_pool(&pool.id).await?;
            let ledger = PositionLedger::from_positions(positions);
            let id = pool.id.clone();
            let handle = PoolActor::spawn(pool, ledger, self.deps.clone(), self.queue_depth);
            pools.insert(id, handle);
            loaded += 1;
        }

        info!("Loaded {} pools from storage", loaded);
        Ok(loaded)
    }

    /// Open a new pool and mint its first liquidity.
    ///
    /// Only this pool id is claimed while custody and the store are awaited;
    /// requests for other pools proceed meanwhile.
    pub async fn create_pool(&self, request: CreatePool) -> Result<MintReceipt, PoolError> {
        if request.maturity > Timestamp::LATEST {
            return Err(PoolError::MaturityOutOfRange(request.maturity));
        }
        let key = PoolKey::new(request.asset, request.collateral, request.maturity);
        let pool_id = key.pool_id();

        // Claim before looking at the registry: a finished creation registers
        // its actor before it releases the claim.
        let _claim = Reservation::claim(&self.creating, &pool_id)
            .ok_or_else(|| PoolError::PoolExists(pool_id.clone()))?;
        if self.pools.read().await.contains_key(&pool_id) {
            return Err(PoolError::PoolExists(pool_id));
        }

        let now = self.deps.clock.now();
        let outcome = engine::new_liquidity(
            request.asset_in,
            request.debt_in,
            request.collateral_in,
            key.maturity,
            now,
        )?;
        if outcome.debt > request.debt_in {
            return Err(PoolError::SlippageExceeded(format!(
                "debt {} exceeds {}",
                outcome.debt, request.debt_in
            )));
        }
        if outcome.collateral > request.collateral_in {
            return Err(PoolError::SlippageExceeded(format!(
                "collateral {} exceeds {}",
                outcome.collateral, request.collateral_in
            )));
        }

        let state = PoolState::new(outcome.x_increase, outcome.y_increase, outcome.z_increase);
        let pool = Pool {
            id: pool_id.clone(),
            key,
            state,
            fees: request.fees.unwrap_or(self.default_fees),
            total_liquidity: outcome.liquidity_out,
            created_at: now,
        };
        let position = Position::open(
            pool_id.clone(),
            request.owner.clone(),
            Obligation::Liquidity {
                liquidity: outcome.liquidity_out,
                debt: outcome.debt,
                collateral: outcome.collateral,
            },
            now,
        );
        let transfers = [
            Transfer::into_pool(&request.owner, &pool.key.asset, request.asset_in),
            Transfer::into_pool(&request.owner, &pool.key.collateral, outcome.collateral),
        ];
        let event = NewPoolEvent {
            kind: "create_pool".to_string(),
            position_id: Some(position.id),
            payload: json!({
                "assetIn": request.asset_in.to_string(),
                "debtIn": request.debt_in.to_string(),
                "collateralIn": request.collateral_in.to_string(),
                "liquidityOut": outcome.liquidity_out.to_string(),
                "debt": outcome.debt.to_string(),
                "collateral": outcome.collateral.to_string(),
            }),
            occurred_at: now,
        };

        self.deps.custody.settle(&pool_id, &transfers).await?;
        match self.deps.repo.insert_pool(&pool, &position, &event).await {
            Ok(true) => {}
            Ok(false) => {
                unwind(self.deps.custody.as_ref(), &pool_id, &transfers).await;
                return Err(PoolError::PoolExists(pool_id));
            }
            Err(e) => {
                warn!(pool_id=%pool_id, error=%e, "Failed to persist new pool");
                unwind(self.deps.custody.as_ref(), &pool_id, &transfers).await;
                return Err(e.into());
            }
        }

        info!(
            pool_id=%pool_id,
            x=%state.x,
            y=%state.y,
            z=%state.z,
            maturity=%pool.key.maturity,
            "Pool created"
        );
        let ledger = PositionLedger::from_positions([position.clone()]);
        let handle = PoolActor::spawn(pool, ledger, self.deps.clone(), self.queue_depth);
        self.pools.write().await.insert(pool_id, handle);

        Ok(Receipt {
            position,
            outcome,
            state,
        })
    }

    async fn handle(&self, pool_id: &PoolId) -> Result<PoolHandle, PoolError> {
        self.pools
            .read()
            .await
            .get(pool_id)
            .cloned()
            .ok_or_else(|| PoolError::PoolNotFound(pool_id.clone()))
    }

    pub async fn add_liquidity(
        &self,
        pool_id: &PoolId,
        owner: Address,
        asset_in: u128,
    ) -> Result<MintReceipt, PoolError> {
        self.handle(pool_id).await?.add_liquidity(owner, asset_in).await
    }

    pub async fn borrow(
        &self,
        pool_id: &PoolId,
        owner: Address,
        request: BorrowRequest,
        limits: BorrowLimits,
    ) -> Result<BorrowReceipt, PoolError> {
        self.handle(pool_id)
            .await?
            .borrow(owner, request, limits)
            .await
    }

    pub async fn lend(
        &self,
        pool_id: &PoolId,
        owner: Address,
        request: LendRequest,
        limits: LendLimits,
    ) -> Result<LendReceipt, PoolError> {
        self.handle(pool_id).await?.lend(owner, request, limits).await
    }

    /// Repay against a borrow or liquidity position, wherever it lives.
    pub async fn repay(
        &self,
        position_id: &PositionId,
        amount: u128,
    ) -> Result<RepayReceipt, PoolError> {
        let position = self
            .deps
            .repo
            .get_position(position_id)
            .await?
            .ok_or(EngineError::UnknownPosition)?;
        self.handle(&position.pool_id)
            .await?
            .repay(*position_id, amount)
            .await
    }

    pub async fn pool(&self, pool_id: &PoolId) -> Result<Pool, PoolError> {
        self.handle(pool_id).await?.snapshot().await
    }

    /// Every live pool, oldest first.
    pub async fn pools(&self) -> Result<Vec<Pool>, PoolError> {
        let handles: Vec<PoolHandle> = self.pools.read().await.values().cloned().collect();
        let mut pools = Vec::with_capacity(handles.len());
        for handle in handles {
            pools.push(handle.snapshot().await?);
        }
        pools.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pools)
    }

    pub async fn position(&self, position_id: &PositionId) -> Result<Option<Position>, PoolError> {
        Ok(self.deps.repo.get_position(position_id).await?)
    }

    pub async fn positions_for_pool(&self, pool_id: &PoolId) -> Result<Vec<Position>, PoolError> {
        self.handle(pool_id).await?;
        Ok(self.deps.repo.positions_for_pool(pool_id).await?)
    }

    pub async fn positions_for_owner(&self, owner: &Address) -> Result<Vec<Position>, PoolError> {
        Ok(self.deps.repo.positions_for_owner(owner).await?)
    }
}
