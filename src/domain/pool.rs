//! Pool identity, reserves and fee parameters.

use serde::{Deserialize, Serialize};

use super::primitives::{PoolId, Timestamp, TokenId};

/// The three coupled reserves of a pool.
///
/// `x` is the asset reserve, `y` the rate reserve, `z` the collateral reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub x: u128,
    pub y: u128,
    pub z: u128,
}

impl PoolState {
    pub fn new(x: u128, y: u128, z: u128) -> Self {
        Self { x, y, z }
    }

    /// True when any reserve is zero; such a pool cannot price a trade.
    pub fn has_empty_reserve(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }
}

/// Per-second fee rates in units of `2^-40`, fixed at pool creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub fee: u64,
    pub protocol_fee: u64,
}

impl FeeConfig {
    pub fn new(fee: u64, protocol_fee: u64) -> Self {
        Self { fee, protocol_fee }
    }

    /// No fees at all, mostly useful in tests.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// The `(asset, collateral, maturity)` triple a pool is unique on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub asset: TokenId,
    pub collateral: TokenId,
    pub maturity: Timestamp,
}

impl PoolKey {
    pub fn new(asset: TokenId, collateral: TokenId, maturity: Timestamp) -> Self {
        Self {
            asset,
            collateral,
            maturity,
        }
    }

    /// Deterministic pool id: SHA-256 over the length-prefixed key fields,
    /// truncated to 128 bits.
    pub fn pool_id(&self) -> PoolId {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, self.asset.as_str());
        hash_var(&mut hasher, self.collateral.as_str());
        hasher.update(self.maturity.as_secs().to_le_bytes());

        let hash = hasher.finalize();
        PoolId(hex::encode(&hash[..16]))
    }
}

/// A pool as tracked by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub id: PoolId,
    pub key: PoolKey,
    pub state: PoolState,
    pub fees: FeeConfig,
    /// Liquidity tokens minted to providers so far.
    pub total_liquidity: u128,
    pub created_at: Timestamp,
}

impl Pool {
    pub fn maturity(&self) -> Timestamp {
        self.key.maturity
    }
}
