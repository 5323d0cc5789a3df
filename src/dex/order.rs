use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, Coin};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
}

/// A resting (or just-delivered) order as tracked by the keeper and the
/// per-symbol engines.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderInfo {
    pub id: String,
    pub owner: Address,
    pub symbol: String,
    pub side: Side,
    pub price: i64,
    pub qty: i64,
    pub cum_qty: i64,
    pub time_in_force: TimeInForce,
    pub created_height: i64,
    pub created_time: DateTime<Utc>,
}

impl OrderInfo {
    pub fn remaining(&self) -> i64 {
        self.qty - self.cum_qty
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderChangeKind {
    New,
    Cancel,
    FilledPartial,
    FilledFull,
    Expired,
    IocNoFill,
}

impl OrderChangeKind {
    /// Terminal kinds leave the order-changes map once their publication has
    /// been acknowledged.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderChangeKind::Cancel
                | OrderChangeKind::FilledFull
                | OrderChangeKind::Expired
                | OrderChangeKind::IocNoFill
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub id: String,
    pub kind: OrderChangeKind,
    pub fee_asset: String,
    pub fee: i64,
}

impl OrderChange {
    pub fn new(id: &str, kind: OrderChangeKind) -> Self {
        Self {
            id: id.to_owned(),
            kind,
            fee_asset: String::new(),
            fee: 0,
        }
    }
}

/// Changes in the order they happened within the block.
pub type OrderChanges = Vec<OrderChange>;

/// Latest pending change per order id; survives across blocks until the
/// publication of a terminal kind is acknowledged.
pub type OrderChangesMap = BTreeMap<String, OrderChange>;

/// One pairing produced by the call auction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub bid: String,
    pub sid: String,
    pub symbol: String,
    pub last_px: i64,
    pub last_qty: i64,
    pub buy_cum_qty: i64,
}

/// Debit/credit record streamed out of matching: a fill-fee record for one
/// side of a trade, or an expiry (IOC no-fill or aged GTC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub bid: String,
    pub sid: String,
    pub is_buyer: bool,
    pub is_expired: bool,
    pub fee: Vec<Coin>,
}

impl Transfer {
    pub fn fill(bid: &str, sid: &str, is_buyer: bool, fee: Vec<Coin>) -> Self {
        Self {
            bid: bid.to_owned(),
            sid: sid.to_owned(),
            is_buyer,
            is_expired: false,
            fee,
        }
    }

    /// Expiry transfers carry the order id on the side that expired.
    pub fn expire(order_id: &str, is_buyer: bool, fee: Vec<Coin>) -> Self {
        Self {
            bid: order_id.to_owned(),
            sid: order_id.to_owned(),
            is_buyer,
            is_expired: true,
            fee,
        }
    }

    pub fn fee_free(&self) -> bool {
        self.fee.iter().all(|c| c.amount == 0)
    }
}

/// One side of a top-of-book snapshot or delta. In a delta, `qty == 0` means
/// the level is gone.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: i64,
    pub qty: i64,
}

/// Per-symbol change of the visible book between two consecutive blocks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderBookDelta {
    pub symbol: String,
    pub buys: Vec<PriceLevel>,
    pub sells: Vec<PriceLevel>,
}
