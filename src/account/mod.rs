use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{coin_add, coin_amount, Address, Coin};

/// Module account that accumulates trading and expiry fees.
pub const FEE_COLLECTOR_ADDR: &str = "tide1feecollector";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppAccount {
    pub address: Address,
    pub coins: Vec<Coin>,
    pub frozen: Vec<Coin>,
    pub locked: Vec<Coin>,
}

/// Narrow read capability over an account's balance sheet. Callers must not
/// assume anything about the concrete record behind it.
pub trait BalanceView {
    fn free_coins(&self) -> &[Coin];
    fn frozen_coins(&self) -> &[Coin];
    fn locked_coins(&self) -> &[Coin];
}

impl BalanceView for AppAccount {
    fn free_coins(&self) -> &[Coin] {
        &self.coins
    }

    fn frozen_coins(&self) -> &[Coin] {
        &self.frozen
    }

    fn locked_coins(&self) -> &[Coin] {
        &self.locked
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountRecord {
    User(AppAccount),
    Module { name: String, coins: Vec<Coin> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    InsufficientFunds {
        address: Address,
        denom: String,
        have: i64,
        need: i64,
    },
}

/// Owns every account record. Only the state-machine thread mutates it.
pub struct AccountKeeper {
    accounts: BTreeMap<Address, AccountRecord>,
}

impl AccountKeeper {
    pub fn new() -> Self {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            FEE_COLLECTOR_ADDR.to_owned(),
            AccountRecord::Module {
                name: "fee_collector".to_owned(),
                coins: vec![],
            },
        );
        Self { accounts }
    }

    pub fn get(&self, address: &str) -> Option<&AccountRecord> {
        self.accounts.get(address)
    }

    pub fn set(&mut self, address: Address, record: AccountRecord) {
        self.accounts.insert(address, record);
    }

    // retrieves a user account, creating one if it doesn't exist
    fn user_mut(&mut self, address: &str) -> Option<&mut AppAccount> {
        let record = self
            .accounts
            .entry(address.to_owned())
            .or_insert_with(|| {
                AccountRecord::User(AppAccount {
                    address: address.to_owned(),
                    ..Default::default()
                })
            });

        match record {
            AccountRecord::User(acc) => Some(acc),
            AccountRecord::Module { .. } => None,
        }
    }

    pub fn free_balance(&self, address: &str, denom: &str) -> i64 {
        match self.accounts.get(address) {
            Some(AccountRecord::User(acc)) => coin_amount(&acc.coins, denom),
            Some(AccountRecord::Module { coins, .. }) => coin_amount(coins, denom),
            None => 0,
        }
    }

    pub fn locked_balance(&self, address: &str, denom: &str) -> i64 {
        match self.accounts.get(address) {
            Some(AccountRecord::User(acc)) => coin_amount(&acc.locked, denom),
            _ => 0,
        }
    }

    pub fn add_free(&mut self, address: &str, denom: &str, amount: i64) {
        if let Some(acc) = self.user_mut(address) {
            coin_add(&mut acc.coins, denom, amount);
        }
    }

    pub fn sub_free(&mut self, address: &str, denom: &str, amount: i64) -> Result<(), BalanceError> {
        let have = self.free_balance(address, denom);
        if have < amount {
            return Err(BalanceError::InsufficientFunds {
                address: address.to_owned(),
                denom: denom.to_owned(),
                have,
                need: amount,
            });
        }
        if let Some(acc) = self.user_mut(address) {
            coin_add(&mut acc.coins, denom, -amount);
        }
        Ok(())
    }

    /// Moves free balance into the locked bucket (order placement).
    pub fn lock(&mut self, address: &str, denom: &str, amount: i64) -> Result<(), BalanceError> {
        self.sub_free(address, denom, amount)?;
        if let Some(acc) = self.user_mut(address) {
            coin_add(&mut acc.locked, denom, amount);
        }
        Ok(())
    }

    /// Returns locked balance to the free bucket (cancel, expiry, refund).
    /// Capped at what is actually locked.
    pub fn unlock(&mut self, address: &str, denom: &str, amount: i64) -> i64 {
        let locked = self.locked_balance(address, denom);
        let amount = amount.min(locked);
        if amount > 0 {
            if let Some(acc) = self.user_mut(address) {
                coin_add(&mut acc.locked, denom, -amount);
                coin_add(&mut acc.coins, denom, amount);
            }
        }
        amount
    }

    /// Spends locked balance outright (fill settlement). The caller credits
    /// the counterparty with the same amount.
    pub fn spend_locked(
        &mut self,
        address: &str,
        denom: &str,
        amount: i64,
    ) -> Result<(), BalanceError> {
        let have = self.locked_balance(address, denom);
        if have < amount {
            return Err(BalanceError::InsufficientFunds {
                address: address.to_owned(),
                denom: denom.to_owned(),
                have,
                need: amount,
            });
        }
        if let Some(acc) = self.user_mut(address) {
            coin_add(&mut acc.locked, denom, -amount);
        }
        Ok(())
    }

    /// Debits the payer's free balance and credits the fee collector.
    pub fn pay_fee(&mut self, address: &str, denom: &str, amount: i64) -> Result<(), BalanceError> {
        self.sub_free(address, denom, amount)?;
        self.credit_collector(denom, amount);
        Ok(())
    }

    pub fn credit_collector(&mut self, denom: &str, amount: i64) {
        if let Some(AccountRecord::Module { coins, .. }) = self.accounts.get_mut(FEE_COLLECTOR_ADDR)
        {
            coin_add(coins, denom, amount);
        }
    }

    /// Deterministic iteration over every record, for export and hashing.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &AccountRecord)> {
        self.accounts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keeper_with(address: &str, denom: &str, amount: i64) -> AccountKeeper {
        let mut keeper = AccountKeeper::new();
        keeper.add_free(address, denom, amount);
        keeper
    }

    #[test]
    fn test_lock_moves_free_to_locked() {
        let mut keeper = keeper_with("tide1alice", "TIDE", 1_000);

        keeper.lock("tide1alice", "TIDE", 400).unwrap();

        assert_eq!(keeper.free_balance("tide1alice", "TIDE"), 600);
        assert_eq!(keeper.locked_balance("tide1alice", "TIDE"), 400);
    }

    #[test]
    fn test_lock_fails_on_insufficient_funds() {
        let mut keeper = keeper_with("tide1alice", "TIDE", 100);

        let err = keeper.lock("tide1alice", "TIDE", 400).unwrap_err();

        assert_eq!(
            err,
            BalanceError::InsufficientFunds {
                address: "tide1alice".to_owned(),
                denom: "TIDE".to_owned(),
                have: 100,
                need: 400,
            }
        );
        // nothing moved
        assert_eq!(keeper.free_balance("tide1alice", "TIDE"), 100);
        assert_eq!(keeper.locked_balance("tide1alice", "TIDE"), 0);
    }

    #[test]
    fn test_unlock_is_capped_at_locked_amount() {
        let mut keeper = keeper_with("tide1alice", "TIDE", 500);
        keeper.lock("tide1alice", "TIDE", 300).unwrap();

        let returned = keeper.unlock("tide1alice", "TIDE", 1_000);

        assert_eq!(returned, 300);
        assert_eq!(keeper.free_balance("tide1alice", "TIDE"), 500);
        assert_eq!(keeper.locked_balance("tide1alice", "TIDE"), 0);
    }

    #[test]
    fn test_fees_flow_to_the_collector() {
        let mut keeper = keeper_with("tide1alice", "TIDE", 500);

        keeper.pay_fee("tide1alice", "TIDE", 5).unwrap();

        assert_eq!(keeper.free_balance("tide1alice", "TIDE"), 495);
        assert_eq!(keeper.free_balance(FEE_COLLECTOR_ADDR, "TIDE"), 5);
    }

    #[test]
    fn test_module_account_is_not_a_user_account() {
        let mut keeper = AccountKeeper::new();
        keeper.add_free(FEE_COLLECTOR_ADDR, "TIDE", 100);

        // module accounts never gain user-style balance buckets
        assert_eq!(keeper.free_balance(FEE_COLLECTOR_ADDR, "TIDE"), 0);
        assert_eq!(keeper.locked_balance(FEE_COLLECTOR_ADDR, "TIDE"), 0);
    }
}
