use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tenorpool::engine::{BorrowRequest, EngineError, LendRequest, PERCENT_HALF};
use tenorpool::orchestration::{
    BorrowLimits, CreatePool, Custody, CustodyError, InMemoryCustody, LendLimits, ManualClock,
    PoolError, Transfer,
};
use tenorpool::{
    init_db, Address, FeeConfig, Obligation, Orchestrator, PoolId, PoolKey, PoolState,
    Repository, Timestamp, TokenId,
};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::timeout;

const T0: u64 = 1_000_000;
const MATURITY: u64 = T0 + 31_536_000;

struct Harness {
    orchestrator: Arc<Orchestrator>,
    repo: Arc<Repository>,
    custody: Arc<InMemoryCustody>,
    clock: Arc<ManualClock>,
    _temp_dir: TempDir,
}

fn usdc() -> TokenId {
    TokenId::new("USDC".to_string())
}

fn weth() -> TokenId {
    TokenId::new("WETH".to_string())
}

fn alice() -> Address {
    Address::new("0xa11ce".to_string())
}

fn bob() -> Address {
    Address::new("0xb0b".to_string())
}

async fn setup() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();
    let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
    let custody = Arc::new(InMemoryCustody::funded());
    let clock = Arc::new(ManualClock::new(Timestamp::new(T0 + 5000)));
    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        custody.clone(),
        clock.clone(),
        FeeConfig::zero(),
        8,
    ));
    Harness {
        orchestrator,
        repo,
        custody,
        clock,
        _temp_dir: temp_dir,
    }
}

fn create_request() -> CreatePool {
    CreatePool {
        asset: usdc(),
        collateral: weth(),
        maturity: Timestamp::new(MATURITY),
        owner: alice(),
        asset_in: 10_000,
        debt_in: 12_000,
        collateral_in: 1000,
        fees: None,
    }
}

async fn seeded() -> Harness {
    let h = setup().await;
    h.custody.fund(&alice(), &usdc(), 10_000).await;
    h.custody.fund(&alice(), &weth(), 1000).await;
    h.orchestrator.create_pool(create_request()).await.unwrap();
    h.clock.set(Timestamp::new(T0 + 10_000));
    h
}

#[tokio::test]
async fn test_create_pool_moves_tokens_and_persists() {
    let h = setup().await;
    h.custody.fund(&alice(), &usdc(), 10_000).await;
    h.custody.fund(&alice(), &weth(), 1000).await;

    let receipt = h.orchestrator.create_pool(create_request()).await.unwrap();
    assert_eq!(receipt.state, PoolState::new(10_000, 272_428, 515));
    assert_eq!(
        receipt.position.obligation,
        Obligation::Liquidity {
            liquidity: 655_360_000,
            debt: 12_000,
            collateral: 999
        }
    );

    let pool_id = receipt.position.pool_id.clone();
    assert_eq!(h.custody.vault_balance(&pool_id, &usdc()).await, 10_000);
    assert_eq!(h.custody.vault_balance(&pool_id, &weth()).await, 999);
    assert_eq!(h.custody.account_balance(&alice(), &weth()).await, 1);

    let stored = h.repo.get_pool(&pool_id).await.unwrap().unwrap();
    assert_eq!(stored.state, receipt.state);
    assert_eq!(stored.total_liquidity, 655_360_000);

    let events = h.repo.events_for_pool(&pool_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "create_pool");
}

#[tokio::test]
async fn test_duplicate_pool_is_rejected() {
    let h = seeded().await;
    let result = h.orchestrator.create_pool(create_request()).await;
    assert!(matches!(result, Err(PoolError::PoolExists(_))));
}

#[tokio::test]
async fn test_create_pool_without_funds_leaves_nothing_behind() {
    let h = setup().await;
    h.custody.fund(&alice(), &usdc(), 10_000).await;

    let result = h.orchestrator.create_pool(create_request()).await;
    assert!(matches!(
        result,
        Err(PoolError::Custody(CustodyError::InsufficientBalance { .. }))
    ));
    assert!(h.repo.list_pools().await.unwrap().is_empty());
    assert_eq!(h.custody.account_balance(&alice(), &usdc()).await, 10_000);
}

#[tokio::test]
async fn test_borrow_then_repay_in_full() {
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    h.custody.fund(&bob(), &weth(), 917).await;

    let receipt = h
        .orchestrator
        .borrow(
            &pool_id,
            bob(),
            BorrowRequest::GivenCollateral {
                asset_out: 500,
                collateral_in: 917,
            },
            BorrowLimits::default(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.outcome.debt, 507);
    assert_eq!(receipt.outcome.collateral, 917);
    assert_eq!(receipt.state, PoolState::new(9500, 273_323, 1461));
    assert_eq!(h.custody.account_balance(&bob(), &usdc()).await, 500);
    assert_eq!(h.custody.vault_balance(&pool_id, &weth()).await, 1916);

    let position_id = receipt.position.id;

    // Bob holds 500 of the 507 owed.
    let short = h.orchestrator.repay(&position_id, 507).await;
    assert!(matches!(
        short,
        Err(PoolError::Custody(CustodyError::InsufficientBalance { .. }))
    ));
    let untouched = h.orchestrator.position(&position_id).await.unwrap().unwrap();
    assert_eq!(untouched.obligation.debt_and_collateral(), Some((507, 917)));

    h.custody.fund(&bob(), &usdc(), 7).await;
    let repaid = h.orchestrator.repay(&position_id, 507).await.unwrap();
    assert!(repaid.outcome.is_settled());
    assert_eq!(repaid.outcome.released_collateral, 917);
    assert_eq!(h.custody.account_balance(&bob(), &weth()).await, 917);
    assert_eq!(h.custody.account_balance(&bob(), &usdc()).await, 0);

    let stored = h.orchestrator.position(&position_id).await.unwrap().unwrap();
    assert!(stored.obligation.is_settled());

    let again = h.orchestrator.repay(&position_id, 1).await;
    assert!(matches!(
        again,
        Err(PoolError::Engine(EngineError::RepayExceedsDebt))
    ));

    // Repay leaves reserves alone.
    let pool = h.orchestrator.pool(&pool_id).await.unwrap();
    assert_eq!(pool.state, PoolState::new(9500, 273_323, 1461));
}

#[tokio::test]
async fn test_slippage_rejection_leaves_pool_untouched() {
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    h.custody.fund(&bob(), &weth(), 917).await;

    let result = h
        .orchestrator
        .borrow(
            &pool_id,
            bob(),
            BorrowRequest::GivenCollateral {
                asset_out: 500,
                collateral_in: 917,
            },
            BorrowLimits {
                max_debt: Some(506),
                max_collateral: None,
            },
        )
        .await;
    assert!(matches!(result, Err(PoolError::SlippageExceeded(_))));

    let pool = h.orchestrator.pool(&pool_id).await.unwrap();
    assert_eq!(pool.state, PoolState::new(10_000, 272_428, 515));
    assert_eq!(h.custody.account_balance(&bob(), &weth()).await, 917);
    assert!(h.orchestrator.positions_for_owner(&bob()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lend_records_bond_and_insurance() {
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    h.custody.fund(&bob(), &usdc(), 1000).await;

    let receipt = h
        .orchestrator
        .lend(
            &pool_id,
            bob(),
            LendRequest::GivenBond {
                asset_in: 1000,
                bond_out: 1100,
            },
            LendLimits {
                min_bond: Some(1100),
                min_insurance: Some(66),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        receipt.position.obligation,
        Obligation::Lend {
            bond: 1100,
            insurance: 66
        }
    );
    assert_eq!(receipt.state, PoolState::new(11_000, 258_804, 493));
    assert_eq!(h.custody.vault_balance(&pool_id, &usdc()).await, 11_000);

    let lend_repay = h.orchestrator.repay(&receipt.position.id, 1).await;
    assert!(matches!(
        lend_repay,
        Err(PoolError::Engine(EngineError::UnknownPosition))
    ));
}

#[tokio::test]
async fn test_matured_pool_rejects_everything() {
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    let position_id = h.orchestrator.positions_for_owner(&alice()).await.unwrap()[0].id;
    h.clock.set(Timestamp::new(MATURITY));

    let borrow = h
        .orchestrator
        .borrow(
            &pool_id,
            bob(),
            BorrowRequest::GivenPercent {
                asset_out: 500,
                percent: 1 << 31,
            },
            BorrowLimits::default(),
        )
        .await;
    assert!(matches!(
        borrow,
        Err(PoolError::Engine(EngineError::MaturityElapsed))
    ));

    let repay = h.orchestrator.repay(&position_id, 1).await;
    assert!(matches!(
        repay,
        Err(PoolError::Engine(EngineError::MaturityElapsed))
    ));
}

#[tokio::test]
async fn test_add_liquidity_is_proportional() {
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    h.custody.fund(&bob(), &usdc(), 2000).await;
    h.custody.fund(&bob(), &weth(), 200).await;

    let receipt = h
        .orchestrator
        .add_liquidity(&pool_id, bob(), 2000)
        .await
        .unwrap();
    assert_eq!(receipt.state, PoolState::new(12_000, 326_913, 618));
    assert_eq!(receipt.outcome.liquidity_out, 131_072_000);

    let pool = h.orchestrator.pool(&pool_id).await.unwrap();
    assert_eq!(pool.total_liquidity, 655_360_000 + 131_072_000);
}

#[tokio::test]
async fn test_unknown_ids() {
    let h = seeded().await;
    let missing = tenorpool::PoolId("ffffffffffffffffffffffffffffffff".to_string());
    assert!(matches!(
        h.orchestrator.pool(&missing).await,
        Err(PoolError::PoolNotFound(_))
    ));
    assert!(matches!(
        h.orchestrator
            .repay(&tenorpool::PositionId::generate(), 1)
            .await,
        Err(PoolError::Engine(EngineError::UnknownPosition))
    ));
}

#[tokio::test]
async fn test_load_restores_pools_and_positions() {
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    h.custody.fund(&bob(), &weth(), 917).await;
    let borrowed = h
        .orchestrator
        .borrow(
            &pool_id,
            bob(),
            BorrowRequest::GivenCollateral {
                asset_out: 500,
                collateral_in: 917,
            },
            BorrowLimits::default(),
        )
        .await
        .unwrap();

    let restarted = Orchestrator::new(
        h.repo.clone(),
        h.custody.clone(),
        h.clock.clone(),
        FeeConfig::zero(),
        8,
    );
    assert_eq!(restarted.load().await.unwrap(), 1);
    assert_eq!(restarted.load().await.unwrap(), 0);

    let pool = restarted.pool(&pool_id).await.unwrap();
    assert_eq!(pool.state, PoolState::new(9500, 273_323, 1461));

    h.custody.fund(&bob(), &usdc(), 7).await;
    let repaid = restarted.repay(&borrowed.position.id, 507).await.unwrap();
    assert_eq!(repaid.outcome.released_collateral, 917);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_on_one_pool_apply_in_sequence() {
    const BORROWERS: usize = 5;
    let h = seeded().await;
    let pool_id = h.orchestrator.pools().await.unwrap()[0].id.clone();
    let opening = h.orchestrator.pool(&pool_id).await.unwrap().state;

    let mut tasks = JoinSet::new();
    for i in 0..BORROWERS {
        let borrower = Address::new(format!("0xb0b{}", i));
        h.custody.fund(&borrower, &weth(), 10_000).await;
        let orchestrator = h.orchestrator.clone();
        let pool_id = pool_id.clone();
        tasks.spawn(async move {
            orchestrator
                .borrow(
                    &pool_id,
                    borrower,
                    BorrowRequest::GivenPercent {
                        asset_out: 100,
                        percent: PERCENT_HALF,
                    },
                    BorrowLimits::default(),
                )
                .await
        });
    }

    let mut pending = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        pending.push(joined.unwrap().unwrap());
    }
    assert_eq!(pending.len(), BORROWERS);

    // Every receipt must continue from the state the previous one left; two
    // borrows computed against the same reserves would break the chain.
    let mut current = opening;
    while !pending.is_empty() {
        let next = pending
            .iter()
            .position(|r| r.outcome.apply(&current).ok() == Some(r.state))
            .expect("no receipt continues from the current reserves");
        current = pending.swap_remove(next).state;
    }
    assert_eq!(current.x, opening.x - 100 * BORROWERS as u128);

    let stored = h.repo.get_pool(&pool_id).await.unwrap().unwrap();
    assert_eq!(stored.state, current);
    assert_eq!(h.orchestrator.pool(&pool_id).await.unwrap().state, current);

    let positions = h.orchestrator.positions_for_pool(&pool_id).await.unwrap();
    let borrows = positions
        .iter()
        .filter(|p| matches!(p.obligation, Obligation::Borrow { .. }))
        .count();
    assert_eq!(borrows, BORROWERS);
    assert_eq!(
        h.custody.vault_balance(&pool_id, &usdc()).await,
        10_000 - 100 * BORROWERS as u128
    );

    let events = h.repo.events_for_pool(&pool_id).await.unwrap();
    assert_eq!(events.len(), 1 + BORROWERS);
    assert!(events[1..]
        .iter()
        .all(|e| e.kind == "borrow" && e.payload["poolFee"] == "0"));
}

/// Custody that parks settlement for one pool until released.
#[derive(Debug)]
struct GatedCustody {
    inner: InMemoryCustody,
    gated: PoolId,
    parked: Notify,
    release: Notify,
}

#[async_trait]
impl Custody for GatedCustody {
    async fn settle(&self, pool_id: &PoolId, transfers: &[Transfer]) -> Result<(), CustodyError> {
        if *pool_id == self.gated {
            self.parked.notify_one();
            self.release.notified().await;
        }
        self.inner.settle(pool_id, transfers).await
    }

    async fn vault_balance(&self, pool_id: &PoolId, token: &TokenId) -> u128 {
        self.inner.vault_balance(pool_id, token).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_creation_does_not_stall_other_pools() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();
    let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
    let late = Timestamp::new(MATURITY + 1);
    let gated_id = PoolKey::new(usdc(), weth(), late).pool_id();
    let custody = Arc::new(GatedCustody {
        inner: InMemoryCustody::unlimited(),
        gated: gated_id.clone(),
        parked: Notify::new(),
        release: Notify::new(),
    });
    let orchestrator = Arc::new(Orchestrator::new(
        repo,
        custody.clone(),
        Arc::new(ManualClock::new(Timestamp::new(T0 + 5000))),
        FeeConfig::zero(),
        8,
    ));

    let open = orchestrator.create_pool(create_request()).await.unwrap();
    let open_id = open.position.pool_id.clone();

    let creating = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .create_pool(CreatePool {
                    maturity: late,
                    ..create_request()
                })
                .await
        })
    };
    custody.parked.notified().await;

    let snapshot = timeout(Duration::from_secs(5), orchestrator.pool(&open_id))
        .await
        .expect("registry blocked by an unrelated creation")
        .unwrap();
    assert_eq!(snapshot.state, open.state);

    let duplicate = orchestrator
        .create_pool(CreatePool {
            maturity: late,
            ..create_request()
        })
        .await;
    assert!(matches!(duplicate, Err(PoolError::PoolExists(_))));
    assert!(matches!(
        orchestrator.pool(&gated_id).await,
        Err(PoolError::PoolNotFound(_))
    ));

    custody.release.notify_one();
    let created = creating.await.unwrap().unwrap();
    assert_eq!(created.position.pool_id, gated_id);
    assert_eq!(orchestrator.pools().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unstorable_maturity_is_refused_before_custody() {
    let h = setup().await;
    let result = h
        .orchestrator
        .create_pool(CreatePool {
            maturity: Timestamp::new(u64::MAX),
            ..create_request()
        })
        .await;
    assert!(matches!(result, Err(PoolError::MaturityOutOfRange(_))));
    assert!(h.orchestrator.pools().await.unwrap().is_empty());
}
