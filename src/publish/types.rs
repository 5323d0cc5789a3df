use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dex::order::{OrderBookDelta, OrderChanges, OrderChangesMap};
use crate::types::Address;

pub const TOPIC_TRADES: &str = "trades";
pub const TOPIC_ORDERS: &str = "orders";
pub const TOPIC_ACCOUNTS: &str = "accounts";
pub const TOPIC_BOOKS: &str = "books";

/// A matched trade enriched with both sides' fees, ready for the wire.
/// `id` is `"<height>-<index>"` with the index increasing in publication
/// order within the block.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeToPublish {
    pub id: String,
    pub symbol: String,
    pub bid: String,
    pub sid: String,
    pub price: i64,
    pub qty: i64,
    pub buy_cum_qty: i64,
    pub bfee: i64,
    pub bfee_asset: String,
    pub sfee: i64,
    pub sfee_asset: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBalance {
    pub asset: String,
    pub free: i64,
    pub frozen: i64,
    pub locked: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub assets: Vec<AssetBalance>,
}

/// Everything the state-machine thread hands to the publisher for one block.
/// Immutable once built; the worker owns it outright.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BlockInfoToPublish {
    pub height: i64,
    pub timestamp: i64,
    pub trades: Vec<TradeToPublish>,
    pub order_changes: OrderChanges,
    pub order_changes_map: OrderChangesMap,
    pub accounts: BTreeMap<Address, Account>,
    pub price_levels: Vec<OrderBookDelta>,
}

impl BlockInfoToPublish {
    pub fn new(
        height: i64,
        timestamp: i64,
        trades: Vec<TradeToPublish>,
        order_changes: OrderChanges,
        order_changes_map: OrderChangesMap,
        accounts: BTreeMap<Address, Account>,
        price_levels: Vec<OrderBookDelta>,
    ) -> Self {
        Self {
            height,
            timestamp,
            trades,
            order_changes,
            order_changes_map,
            accounts,
            price_levels,
        }
    }
}

// per-feed wire messages

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TradesPublished {
    pub height: i64,
    pub trades: Vec<TradeToPublish>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrdersPublished {
    pub height: i64,
    pub orders: OrderChanges,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccountsPublished {
    pub height: i64,
    pub accounts: Vec<Account>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BooksPublished {
    pub height: i64,
    pub books: Vec<OrderBookDelta>,
}
