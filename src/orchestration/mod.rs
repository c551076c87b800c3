//! Pool lifecycle: one actor per pool behind a shared registry.

pub mod clock;
pub mod custody;
pub mod orchestrator;
pub mod pool_actor;

pub use clock::{Clock, ManualClock, SystemClock};
pub use custody::{Custody, CustodyError, InMemoryCustody, Transfer};
pub use orchestrator::{CreatePool, Orchestrator, PoolError};
pub use pool_actor::{
    BorrowLimits, BorrowReceipt, LendLimits, LendReceipt, MintReceipt, PoolHandle, Receipt,
    RepayReceipt,
};
