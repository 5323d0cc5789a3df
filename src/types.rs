use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod tx;

/// Bech32-style account address, carried as an opaque string.
pub type Address = String;

/// The chain's native staking/fee asset.
pub const NATIVE_DENOM: &str = "TIDE";

/// Prices and quantities are fixed-point integers with 8 decimal places.
pub const FIXED8_ONE: i64 = 100_000_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: i64,
}

impl Coin {
    pub fn new(denom: &str, amount: i64) -> Self {
        Self {
            denom: denom.to_owned(),
            amount,
        }
    }
}

/// Amount of `denom` held in a coin list, zero when absent.
pub fn coin_amount(coins: &[Coin], denom: &str) -> i64 {
    coins
        .iter()
        .find(|c| c.denom == denom)
        .map(|c| c.amount)
        .unwrap_or(0)
}

/// Adds `delta` to the `denom` entry, creating it when missing.
/// Entries are kept even when they reach zero so held assets stay visible.
pub fn coin_add(coins: &mut Vec<Coin>, denom: &str, delta: i64) {
    match coins.iter_mut().find(|c| c.denom == denom) {
        Some(coin) => coin.amount += delta,
        None => coins.push(Coin::new(denom, delta)),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

impl BlockHeader {
    pub fn new(height: i64, time: DateTime<Utc>) -> Self {
        Self { height, time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_add_and_lookup() {
        let mut coins = vec![Coin::new("TIDE", 100)];

        coin_add(&mut coins, "XYZ", 50);
        coin_add(&mut coins, "TIDE", -100);

        assert_eq!(coin_amount(&coins, "XYZ"), 50);
        assert_eq!(coin_amount(&coins, "TIDE"), 0);
        assert_eq!(coin_amount(&coins, "ABC"), 0);
        // zeroed entries are retained
        assert_eq!(coins.len(), 2);
    }
}
