//! Token custody boundary.
//!
//! Every pool transition moves tokens between user accounts and the pool
//! vault. A batch of transfers settles atomically: either every transfer
//! applies or none does.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{Address, PoolId, TokenId};

/// Direction of a transfer, seen from the pool vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    IntoPool,
    OutOfPool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub account: Address,
    pub token: TokenId,
    pub amount: u128,
    pub direction: Direction,
}

impl Transfer {
    pub fn into_pool(account: &Address, token: &TokenId, amount: u128) -> Self {
        Self {
            account: account.clone(),
            token: token.clone(),
            amount,
            direction: Direction::IntoPool,
        }
    }

    pub fn out_of_pool(account: &Address, token: &TokenId, amount: u128) -> Self {
        Self {
            account: account.clone(),
            token: token.clone(),
            amount,
            direction: Direction::OutOfPool,
        }
    }

    /// The transfer that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            direction: match self.direction {
                Direction::IntoPool => Direction::OutOfPool,
                Direction::OutOfPool => Direction::IntoPool,
            },
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("insufficient {token} balance for {holder}: need {needed}, have {available}")]
    InsufficientBalance {
        holder: String,
        token: TokenId,
        needed: u128,
        available: u128,
    },
    #[error("balance overflow for {holder} in {token}")]
    Overflow { holder: String, token: TokenId },
}

#[async_trait]
pub trait Custody: Send + Sync + fmt::Debug {
    /// Settle `transfers` against the vault of `pool_id`, all or nothing.
    async fn settle(&self, pool_id: &PoolId, transfers: &[Transfer]) -> Result<(), CustodyError>;

    /// Vault balance of `token` held for `pool_id`.
    async fn vault_balance(&self, pool_id: &PoolId, token: &TokenId) -> u128;
}

#[derive(Debug, Default)]
struct Balances {
    accounts: HashMap<(Address, TokenId), u128>,
    vaults: HashMap<(PoolId, TokenId), u128>,
}

/// Custody kept in process memory.
///
/// Vault balances are always enforced. Account balances are enforced only
/// when built with [`InMemoryCustody::funded`]; the default treats user
/// accounts as unlimited sources so the service can run without a token
/// backend.
#[derive(Debug)]
pub struct InMemoryCustody {
    enforce_accounts: bool,
    balances: Mutex<Balances>,
}

impl InMemoryCustody {
    pub fn unlimited() -> Self {
        Self {
            enforce_accounts: false,
            balances: Mutex::new(Balances::default()),
        }
    }

    pub fn funded() -> Self {
        Self {
            enforce_accounts: true,
            balances: Mutex::new(Balances::default()),
        }
    }

    /// Credit `amount` of `token` to `account`.
    pub async fn fund(&self, account: &Address, token: &TokenId, amount: u128) {
        let mut balances = self.balances.lock().await;
        let entry = balances
            .accounts
            .entry((account.clone(), token.clone()))
            .or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub async fn account_balance(&self, account: &Address, token: &TokenId) -> u128 {
        let balances = self.balances.lock().await;
        balances
            .accounts
            .get(&(account.clone(), token.clone()))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryCustody {
    fn default() -> Self {
        Self::unlimited()
    }
}

fn debit(
    balance: &mut u128,
    amount: u128,
    holder: impl Into<String>,
    token: &TokenId,
) -> Result<(), CustodyError> {
    *balance = balance
        .checked_sub(amount)
        .ok_or_else(|| CustodyError::InsufficientBalance {
            holder: holder.into(),
            token: token.clone(),
            needed: amount,
            available: *balance,
        })?;
    Ok(())
}

fn credit(
    balance: &mut u128,
    amount: u128,
    holder: impl Into<String>,
    token: &TokenId,
) -> Result<(), CustodyError> {
    *balance = balance
        .checked_add(amount)
        .ok_or_else(|| CustodyError::Overflow {
            holder: holder.into(),
            token: token.clone(),
        })?;
    Ok(())
}

#[async_trait]
impl Custody for InMemoryCustody {
    async fn settle(&self, pool_id: &PoolId, transfers: &[Transfer]) -> Result<(), CustodyError> {
        let mut balances = self.balances.lock().await;

        // Apply to scratch copies of the touched entries, commit only if
        // every transfer succeeds.
        let mut accounts: HashMap<(Address, TokenId), u128> = HashMap::new();
        let mut vaults: HashMap<TokenId, u128> = HashMap::new();

        for transfer in transfers {
            let account_key = (transfer.account.clone(), transfer.token.clone());
            let account = accounts.entry(account_key.clone()).or_insert_with(|| {
                balances.accounts.get(&account_key).copied().unwrap_or(0)
            });
            let vault = vaults.entry(transfer.token.clone()).or_insert_with(|| {
                balances
                    .vaults
                    .get(&(pool_id.clone(), transfer.token.clone()))
                    .copied()
                    .unwrap_or(0)
            });

            match transfer.direction {
                Direction::IntoPool => {
                    if self.enforce_accounts {
                        debit(account, transfer.amount, transfer.account.as_str(), &transfer.token)?;
                    }
                    credit(vault, transfer.amount, format!("pool {}", pool_id), &transfer.token)?;
                }
                Direction::OutOfPool => {
                    debit(vault, transfer.amount, format!("pool {}", pool_id), &transfer.token)?;
                    if self.enforce_accounts {
                        credit(account, transfer.amount, transfer.account.as_str(), &transfer.token)?;
                    }
                }
            }
        }

        balances.accounts.extend(accounts);
        for (token, amount) in vaults {
            balances.vaults.insert((pool_id.clone(), token), amount);
        }
        Ok(())
    }

    async fn vault_balance(&self, pool_id: &PoolId, token: &TokenId) -> u128 {
        let balances = self.balances.lock().await;
        balances
            .vaults
            .get(&(pool_id.clone(), token.clone()))
            .copied()
            .unwrap_or(0)
    }
}
