use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::account::{AccountKeeper, BalanceError};
use crate::logger::Logger;
use crate::types::{Address, Coin, NATIVE_DENOM};

pub mod engine;
pub mod fee;
pub mod order;

use engine::MatchEngine;
use fee::{notional, FeeConfig};
use order::{
    OrderBookDelta, OrderChange, OrderChangeKind, OrderChanges, OrderChangesMap, OrderInfo, Side,
    TimeInForce, Trade, Transfer,
};

/// Visible book depth published per side.
pub const ORDER_BOOK_DEPTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingPair {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            symbol: format!("{}_{}", base, quote),
            base: base.to_owned(),
            quote: quote.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexError {
    PairExists(String),
    UnknownSymbol(String),
    UnknownOrder(String),
    DuplicateOrderId(String),
    NotOwner(String),
    Balance(BalanceError),
}

/// Owns one match engine per trading pair plus the per-block publication
/// accumulators. All mutation happens on the state-machine thread.
pub struct DexKeeper {
    engines: BTreeMap<String, MatchEngine>,
    pairs: BTreeMap<String, TradingPair>,
    /// Live orders: resting ones plus terminal ones whose publication has not
    /// been acknowledged yet.
    orders: BTreeMap<String, OrderInfo>,
    order_changes: OrderChanges,
    order_changes_map: OrderChangesMap,
    pub fee_config: FeeConfig,
    collect_order_info: bool,
    logger: Arc<dyn Logger>,
}

impl DexKeeper {
    pub fn new(fee_config: FeeConfig, collect_order_info: bool, logger: Arc<dyn Logger>) -> Self {
        Self {
            engines: BTreeMap::new(),
            pairs: BTreeMap::new(),
            orders: BTreeMap::new(),
            order_changes: vec![],
            order_changes_map: BTreeMap::new(),
            fee_config,
            collect_order_info,
            logger,
        }
    }

    pub fn add_pair(&mut self, base: &str, quote: &str) -> Result<(), DexError> {
        let pair = TradingPair::new(base, quote);
        if self.pairs.contains_key(&pair.symbol) {
            return Err(DexError::PairExists(pair.symbol));
        }
        self.engines
            .insert(pair.symbol.clone(), MatchEngine::new(&pair.symbol));
        self.pairs.insert(pair.symbol.clone(), pair);
        Ok(())
    }

    pub fn pair(&self, symbol: &str) -> Option<&TradingPair> {
        self.pairs.get(symbol)
    }

    pub fn pairs(&self) -> Vec<&TradingPair> {
        self.pairs.values().collect()
    }

    /// Current aggregated top-of-book for a symbol (bids desc, asks asc).
    pub fn book_snapshot(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Option<(Vec<order::PriceLevel>, Vec<order::PriceLevel>)> {
        self.engines.get(symbol).map(|e| e.top_levels(depth))
    }

    pub fn order(&self, id: &str) -> Option<&OrderInfo> {
        self.orders.get(id)
    }

    pub fn order_changes(&self) -> &OrderChanges {
        &self.order_changes
    }

    pub fn order_changes_map(&self) -> &OrderChangesMap {
        &self.order_changes_map
    }

    fn is_terminal(&self, id: &str) -> bool {
        self.order_changes_map
            .get(id)
            .map(|c| c.kind.is_terminal())
            .unwrap_or(false)
    }

    /// Locks the order's collateral and rests it on the book.
    pub fn add_order(
        &mut self,
        accounts: &mut AccountKeeper,
        info: OrderInfo,
    ) -> Result<(), DexError> {
        let Some(pair) = self.pairs.get(&info.symbol).cloned() else {
            return Err(DexError::UnknownSymbol(info.symbol));
        };
        if self.orders.contains_key(&info.id) {
            return Err(DexError::DuplicateOrderId(info.id));
        }

        match info.side {
            Side::Buy => accounts.lock(&info.owner, &pair.quote, notional(info.price, info.qty)),
            Side::Sell => accounts.lock(&info.owner, &pair.base, info.qty),
        }
        .map_err(DexError::Balance)?;

        let engine = self
            .engines
            .get_mut(&info.symbol)
            .expect("engine exists for every registered pair");
        engine.add_order(info.clone());

        let id = info.id.clone();
        self.orders.insert(id.clone(), info);
        self.record_change(&id, OrderChangeKind::New);
        Ok(())
    }

    /// Removes a resting order and refunds its remaining collateral.
    pub fn cancel_order(
        &mut self,
        accounts: &mut AccountKeeper,
        symbol: &str,
        id: &str,
        sender: &str,
    ) -> Result<(), DexError> {
        let Some(order) = self.orders.get(id).cloned() else {
            return Err(DexError::UnknownOrder(id.to_owned()));
        };
        if order.owner != sender {
            return Err(DexError::NotOwner(id.to_owned()));
        }
        if order.symbol != symbol || self.is_terminal(id) {
            return Err(DexError::UnknownOrder(id.to_owned()));
        }
        let Some(engine) = self.engines.get_mut(symbol) else {
            return Err(DexError::UnknownSymbol(symbol.to_owned()));
        };
        if engine.remove_order(order.side, order.price, id).is_none() {
            return Err(DexError::UnknownOrder(id.to_owned()));
        }

        let pair = self.pairs.get(symbol).cloned().expect("pair exists");
        match order.side {
            Side::Buy => {
                accounts.unlock(
                    &order.owner,
                    &pair.quote,
                    notional(order.price, order.remaining()),
                );
            }
            Side::Sell => {
                accounts.unlock(&order.owner, &pair.base, order.remaining());
            }
        }

        self.record_change(id, OrderChangeKind::Cancel);
        Ok(())
    }

    /// Runs the call auction for every symbol in lexicographic order,
    /// settling fills through the account keeper and streaming fee transfers
    /// to the collector when one is given.
    pub fn match_and_allocate_all(
        &mut self,
        accounts: &mut AccountKeeper,
        mut fee_collector: Option<&mut dyn FnMut(Transfer)>,
    ) {
        let symbols: Vec<String> = self.engines.keys().cloned().collect();
        for symbol in symbols {
            let outcome = self
                .engines
                .get_mut(&symbol)
                .expect("symbol taken from the engines map")
                .match_orders();
            let pair = self.pairs.get(&symbol).cloned().expect("pair exists");

            for trade in &outcome.trades {
                let Some((buyer_side, seller_side)) = self.settle_trade(accounts, &pair, trade)
                else {
                    continue;
                };
                if let Some(collector) = fee_collector.as_mut() {
                    collector(buyer_side);
                    collector(seller_side);
                }
            }

            for expired in &outcome.expired {
                if let Some(transfer) = self.expire_order(accounts, &pair, &expired.id, true) {
                    if let Some(collector) = fee_collector.as_mut() {
                        collector(transfer);
                    }
                }
            }
        }
    }

    /// Applies one trade's debits and credits; returns the buyer- and
    /// seller-side fee transfers. A trade referencing an unknown order is an
    /// internal inconsistency: logged and skipped.
    fn settle_trade(
        &mut self,
        accounts: &mut AccountKeeper,
        pair: &TradingPair,
        trade: &Trade,
    ) -> Option<(Transfer, Transfer)> {
        if !self.orders.contains_key(&trade.bid) || !self.orders.contains_key(&trade.sid) {
            self.logger.log(
                "error",
                &format!(
                    "trade {}-{} references an order missing from the order map",
                    trade.bid, trade.sid
                ),
            );
            return None;
        }

        let qty = trade.last_qty;
        let value = notional(trade.last_px, qty);

        // buyer leg: spend locked quote at the clearing price, refund the
        // difference to the order's limit price, receive base
        let (buyer, buyer_filled_full) = {
            let order = self.orders.get_mut(&trade.bid).expect("checked above");
            let locked_before = notional(order.price, order.remaining());
            let locked_after = notional(order.price, order.remaining() - qty);
            order.cum_qty += qty;
            let refund = (locked_before - locked_after) - value;

            let owner = order.owner.clone();
            let filled_full = order.remaining() == 0;

            if let Err(e) = accounts.spend_locked(&owner, &pair.quote, value) {
                self.logger
                    .log("error", &format!("buyer settlement failed: {:?}", e));
            }
            if refund > 0 {
                accounts.unlock(&owner, &pair.quote, refund);
            }
            accounts.add_free(&owner, &pair.base, qty);
            (owner, filled_full)
        };
        let buyer_fee = self.charge_fill_fee(accounts, &buyer, pair, &pair.base, qty, value);
        self.record_change(
            &trade.bid,
            if buyer_filled_full {
                OrderChangeKind::FilledFull
            } else {
                OrderChangeKind::FilledPartial
            },
        );

        // seller leg: spend locked base, receive quote
        let (seller, seller_filled_full) = {
            let order = self.orders.get_mut(&trade.sid).expect("checked above");
            order.cum_qty += qty;
            let owner = order.owner.clone();
            let filled_full = order.remaining() == 0;

            if let Err(e) = accounts.spend_locked(&owner, &pair.base, qty) {
                self.logger
                    .log("error", &format!("seller settlement failed: {:?}", e));
            }
            accounts.add_free(&owner, &pair.quote, value);
            (owner, filled_full)
        };
        let seller_fee = self.charge_fill_fee(accounts, &seller, pair, &pair.quote, value, value);
        self.record_change(
            &trade.sid,
            if seller_filled_full {
                OrderChangeKind::FilledFull
            } else {
                OrderChangeKind::FilledPartial
            },
        );

        Some((
            Transfer::fill(&trade.bid, &trade.sid, true, buyer_fee),
            Transfer::fill(&trade.bid, &trade.sid, false, seller_fee),
        ))
    }

    /// Charges the fill fee for one side and returns the coins taken.
    ///
    /// The native rate applies when the fee can be charged in the native
    /// asset: either the received asset is native, or the pair quotes in
    /// native so the trade value is already in native units. Otherwise the
    /// non-native rate applies to the received asset. Always capped by what
    /// the payer holds.
    fn charge_fill_fee(
        &self,
        accounts: &mut AccountKeeper,
        payer: &str,
        pair: &TradingPair,
        received_denom: &str,
        received_amount: i64,
        value: i64,
    ) -> Vec<Coin> {
        let (denom, wanted) = if received_denom == NATIVE_DENOM {
            (NATIVE_DENOM, self.fee_config.fill_fee_native(received_amount))
        } else if pair.quote == NATIVE_DENOM {
            (NATIVE_DENOM, self.fee_config.fill_fee_native(value))
        } else {
            (received_denom, self.fee_config.fill_fee(received_amount))
        };

        let amount = wanted.min(accounts.free_balance(payer, denom));
        if amount <= 0 {
            return vec![];
        }
        accounts
            .pay_fee(payer, denom, amount)
            .expect("fee capped at free balance");
        vec![Coin::new(denom, amount)]
    }

    /// Unwinds an order that left the book unfilled (IOC remainder or aged
    /// GTC): refunds the remaining collateral and charges the flat expiry
    /// fee in the native asset, capped by the payer's free balance.
    fn expire_order(
        &mut self,
        accounts: &mut AccountKeeper,
        pair: &TradingPair,
        id: &str,
        ioc: bool,
    ) -> Option<Transfer> {
        let Some(order) = self.orders.get(id).cloned() else {
            self.logger
                .log("error", &format!("expired order {} is not tracked", id));
            return None;
        };

        match order.side {
            Side::Buy => {
                accounts.unlock(
                    &order.owner,
                    &pair.quote,
                    notional(order.price, order.remaining()),
                );
            }
            Side::Sell => {
                accounts.unlock(&order.owner, &pair.base, order.remaining());
            }
        }

        let flat = if ioc {
            self.fee_config.ioc_expire_fee
        } else {
            self.fee_config.expire_fee
        };
        let amount = flat.min(accounts.free_balance(&order.owner, NATIVE_DENOM));
        let fee = if amount > 0 {
            accounts
                .pay_fee(&order.owner, NATIVE_DENOM, amount)
                .expect("fee capped at free balance");
            vec![Coin::new(NATIVE_DENOM, amount)]
        } else {
            vec![]
        };

        let kind = if ioc && order.cum_qty == 0 {
            OrderChangeKind::IocNoFill
        } else {
            OrderChangeKind::Expired
        };
        self.record_change(id, kind);

        Some(Transfer::expire(id, order.side == Side::Buy, fee))
    }

    /// Daily expiry sweep: GTC orders older than `days_back` UTC days are
    /// unwound. Transfers are handed to `handler` the same way the auction
    /// streams them to the fee collector.
    pub fn end_breathe_block(
        &mut self,
        accounts: &mut AccountKeeper,
        block_time: DateTime<Utc>,
        days_back: i64,
        handler: &mut dyn FnMut(Transfer),
    ) {
        let cutoff = block_time - Duration::days(days_back);
        let candidates: Vec<(String, String, Side, i64)> = self
            .orders
            .values()
            .filter(|o| {
                o.time_in_force == TimeInForce::Gtc
                    && o.created_time < cutoff
                    && !self.is_terminal(&o.id)
            })
            .map(|o| (o.id.clone(), o.symbol.clone(), o.side, o.price))
            .collect();

        for (id, symbol, side, price) in candidates {
            let Some(engine) = self.engines.get_mut(&symbol) else {
                continue;
            };
            if engine.remove_order(side, price, &id).is_none() {
                continue;
            }
            let pair = self.pairs.get(&symbol).cloned().expect("pair exists");
            if let Some(transfer) = self.expire_order(accounts, &pair, &id, false) {
                handler(transfer);
            }
        }
    }

    /// Trades of the most recent auction round, per symbol in lexicographic
    /// order.
    pub fn last_trades(&self) -> impl Iterator<Item = (&str, &[Trade])> {
        self.engines
            .iter()
            .map(|(symbol, engine)| (symbol.as_str(), engine.last_trades()))
    }

    pub fn get_last_orders_copy(&self) -> (OrderChanges, OrderChangesMap) {
        (self.order_changes.clone(), self.order_changes_map.clone())
    }

    pub fn clear_order_changes(&mut self) {
        self.order_changes.clear();
    }

    /// Drops a published terminal order from the pending map and the order
    /// index.
    pub fn remove_published(&mut self, id: &str) {
        self.order_changes_map.remove(id);
        self.orders.remove(id);
    }

    /// Local pruning when no publisher consumes the map (dead sink or
    /// publication disabled).
    pub fn prune_terminal_local(&mut self) {
        let terminal: Vec<String> = self
            .order_changes_map
            .iter()
            .filter(|(_, c)| c.kind.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for id in terminal {
            self.remove_published(&id);
        }
    }

    /// Owners of every order the auction acted on this block (fills and
    /// expiries). NEW and CANCEL changes are transaction-initiated, so their
    /// owners arrive through the tx-related set instead.
    pub fn get_trade_related_accounts(&self) -> HashSet<Address> {
        let mut related = HashSet::new();
        for change in &self.order_changes {
            let traded = matches!(
                change.kind,
                OrderChangeKind::FilledPartial
                    | OrderChangeKind::FilledFull
                    | OrderChangeKind::Expired
                    | OrderChangeKind::IocNoFill
            );
            if !traded {
                continue;
            }
            if let Some(order) = self.orders.get(&change.id) {
                related.insert(order.owner.clone());
            }
        }
        related
    }

    /// Per-symbol top-of-book deltas since the previous publication point;
    /// symbols whose visible book did not change are omitted.
    pub fn get_order_book_for_publish(&mut self, depth: usize) -> Vec<OrderBookDelta> {
        let mut books = vec![];
        for (symbol, engine) in self.engines.iter_mut() {
            if let Some((buys, sells)) = engine.book_delta(depth) {
                books.push(OrderBookDelta {
                    symbol: symbol.clone(),
                    buys,
                    sells,
                });
            }
        }
        books
    }

    /// Resting book content in deterministic order, for the commit hash.
    pub fn resting_orders(&self) -> Vec<&OrderInfo> {
        self.engines
            .values()
            .flat_map(|e| e.resting_orders())
            .collect()
    }

    /// Records the fee charged for an expired order on its pending change.
    pub fn set_order_fee(&mut self, id: &str, denom: &str, amount: i64) {
        if let Some(change) = self.order_changes_map.get_mut(id) {
            change.fee_asset = denom.to_owned();
            change.fee = amount;
        }
        if let Some(change) = self.order_changes.iter_mut().rev().find(|c| c.id == id) {
            change.fee_asset = denom.to_owned();
            change.fee = amount;
        }
    }

    fn record_change(&mut self, id: &str, kind: OrderChangeKind) {
        if !self.collect_order_info {
            if kind.is_terminal() {
                self.orders.remove(id);
            }
            return;
        }

        let entry = self
            .order_changes_map
            .entry(id.to_owned())
            .or_insert_with(|| OrderChange::new(id, kind));
        entry.kind = kind;
        let snapshot = entry.clone();
        self.order_changes.push(snapshot);
    }

    #[cfg(test)]
    pub(crate) fn engine_mut_for_test(&mut self, symbol: &str) -> &mut MatchEngine {
        self.engines.get_mut(symbol).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::FEE_COLLECTOR_ADDR;
    use crate::logger::StubLogger;
    use chrono::TimeZone;

    const BUYER: &str = "tide1buyer";
    const SELLER: &str = "tide1seller";

    fn make_keeper(collect: bool) -> (DexKeeper, AccountKeeper) {
        let keeper = DexKeeper::new(
            FeeConfig::default(),
            collect,
            Arc::new(StubLogger::new()),
        );
        let mut accounts = AccountKeeper::new();
        for addr in [BUYER, SELLER] {
            accounts.add_free(addr, NATIVE_DENOM, 100_000_000_000);
            accounts.add_free(addr, "XYZ", 100_000_000_000);
        }
        (keeper, accounts)
    }

    fn make_order(id: &str, owner: &str, side: Side, price: i64, qty: i64) -> OrderInfo {
        OrderInfo {
            id: id.to_owned(),
            owner: owner.to_owned(),
            symbol: "XYZ_TIDE".to_owned(),
            side,
            price,
            qty,
            cum_qty: 0,
            time_in_force: TimeInForce::Gtc,
            created_height: 42,
            created_time: Utc.timestamp_opt(100, 0).unwrap(),
        }
    }

    fn total_supply(accounts: &AccountKeeper, denom: &str) -> i64 {
        let mut sum = 0;
        for (_, record) in accounts.iter() {
            match record {
                crate::account::AccountRecord::User(acc) => {
                    sum += crate::types::coin_amount(&acc.coins, denom)
                        + crate::types::coin_amount(&acc.frozen, denom)
                        + crate::types::coin_amount(&acc.locked, denom);
                }
                crate::account::AccountRecord::Module { coins, .. } => {
                    sum += crate::types::coin_amount(coins, denom);
                }
            }
        }
        sum
    }

    #[test]
    fn test_add_order_locks_collateral() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();

        dex.add_order(
            &mut accounts,
            make_order("b1", BUYER, Side::Buy, 102_000, 3_000_000),
        )
        .unwrap();

        assert_eq!(accounts.locked_balance(BUYER, NATIVE_DENOM), 3_060);
        assert_eq!(
            accounts.free_balance(BUYER, NATIVE_DENOM),
            100_000_000_000 - 3_060
        );
        assert_eq!(
            dex.order_changes_map().get("b1").unwrap().kind,
            OrderChangeKind::New
        );
    }

    #[test]
    fn test_add_order_rejects_duplicates_and_unknown_symbols() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();

        let order = make_order("b1", BUYER, Side::Buy, 102_000, 3_000_000);
        dex.add_order(&mut accounts, order.clone()).unwrap();

        assert_eq!(
            dex.add_order(&mut accounts, order),
            Err(DexError::DuplicateOrderId("b1".to_owned()))
        );
        assert_eq!(
            dex.add_order(
                &mut accounts,
                OrderInfo {
                    symbol: "ABC_TIDE".to_owned(),
                    id: "b2".to_owned(),
                    ..make_order("b2", BUYER, Side::Buy, 1, 1)
                }
            ),
            Err(DexError::UnknownSymbol("ABC_TIDE".to_owned()))
        );
    }

    #[test]
    fn test_cancel_refunds_remaining_collateral() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();
        dex.add_order(
            &mut accounts,
            make_order("s1", SELLER, Side::Sell, 102_000, 4_000_000),
        )
        .unwrap();
        assert_eq!(accounts.locked_balance(SELLER, "XYZ"), 4_000_000);

        dex.cancel_order(&mut accounts, "XYZ_TIDE", "s1", SELLER)
            .unwrap();

        assert_eq!(accounts.locked_balance(SELLER, "XYZ"), 0);
        assert_eq!(accounts.free_balance(SELLER, "XYZ"), 100_000_000_000);
        assert_eq!(
            dex.order_changes_map().get("s1").unwrap().kind,
            OrderChangeKind::Cancel
        );
    }

    #[test]
    fn test_cancel_rejects_wrong_owner() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();
        dex.add_order(
            &mut accounts,
            make_order("s1", SELLER, Side::Sell, 102_000, 4_000_000),
        )
        .unwrap();

        assert_eq!(
            dex.cancel_order(&mut accounts, "XYZ_TIDE", "s1", BUYER),
            Err(DexError::NotOwner("s1".to_owned()))
        );
    }

    #[test]
    fn test_full_cross_settles_balances_and_fees() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();
        dex.add_order(
            &mut accounts,
            make_order("b1", BUYER, Side::Buy, 102_000, 3_000_000),
        )
        .unwrap();
        dex.add_order(
            &mut accounts,
            make_order("s1", SELLER, Side::Sell, 102_000, 4_000_000),
        )
        .unwrap();

        let mut transfers = vec![];
        let mut collector = |t: Transfer| transfers.push(t);
        dex.match_and_allocate_all(&mut accounts, Some(&mut collector));

        // buyer: spent 3060 locked quote plus a 1 TIDE fee, gained 3M XYZ
        assert_eq!(
            accounts.free_balance(BUYER, NATIVE_DENOM),
            99_999_996_939
        );
        assert_eq!(accounts.locked_balance(BUYER, NATIVE_DENOM), 0);
        assert_eq!(accounts.free_balance(BUYER, "XYZ"), 100_003_000_000);

        // seller: gained 3060 quote minus a 1 TIDE fee, 1M XYZ stays locked
        assert_eq!(
            accounts.free_balance(SELLER, NATIVE_DENOM),
            100_000_003_059
        );
        assert_eq!(accounts.free_balance(SELLER, "XYZ"), 99_996_000_000);
        assert_eq!(accounts.locked_balance(SELLER, "XYZ"), 1_000_000);

        // both fees reached the collector
        assert_eq!(accounts.free_balance(FEE_COLLECTOR_ADDR, NATIVE_DENOM), 2);

        // one buyer-side and one seller-side transfer for the single trade
        assert_eq!(transfers.len(), 2);
        assert!(transfers[0].is_buyer && !transfers[0].is_expired);
        assert_eq!(transfers[0].fee, vec![Coin::new(NATIVE_DENOM, 1)]);
        assert!(!transfers[1].is_buyer);
        assert_eq!(transfers[1].fee, vec![Coin::new(NATIVE_DENOM, 1)]);

        // order changes reflect the fill sizes
        assert_eq!(
            dex.order_changes_map().get("b1").unwrap().kind,
            OrderChangeKind::FilledFull
        );
        assert_eq!(
            dex.order_changes_map().get("s1").unwrap().kind,
            OrderChangeKind::FilledPartial
        );
    }

    #[test]
    fn test_matching_conserves_value_per_asset() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();

        let native_before = total_supply(&accounts, NATIVE_DENOM);
        let xyz_before = total_supply(&accounts, "XYZ");

        dex.add_order(
            &mut accounts,
            make_order("b1", BUYER, Side::Buy, 102_000, 3_000_000),
        )
        .unwrap();
        dex.add_order(
            &mut accounts,
            make_order("s1", SELLER, Side::Sell, 101_000, 4_000_000),
        )
        .unwrap();
        dex.match_and_allocate_all(&mut accounts, None);

        assert_eq!(total_supply(&accounts, NATIVE_DENOM), native_before);
        assert_eq!(total_supply(&accounts, "XYZ"), xyz_before);
    }

    #[test]
    fn test_ioc_no_fill_charges_flat_fee_and_unlocks() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();
        dex.add_order(
            &mut accounts,
            make_order("s1", SELLER, Side::Sell, 102_000, 1_000_000),
        )
        .unwrap();
        dex.add_order(
            &mut accounts,
            OrderInfo {
                time_in_force: TimeInForce::Ioc,
                ..make_order("i1", BUYER, Side::Buy, 101_000, 1_000_000)
            },
        )
        .unwrap();

        let mut transfers = vec![];
        let mut collector = |t: Transfer| transfers.push(t);
        dex.match_and_allocate_all(&mut accounts, Some(&mut collector));

        // the remainder was unlocked and only the flat ioc fee was taken
        assert_eq!(accounts.locked_balance(BUYER, NATIVE_DENOM), 0);
        assert_eq!(
            accounts.free_balance(BUYER, NATIVE_DENOM),
            100_000_000_000 - 500
        );
        assert_eq!(accounts.free_balance(FEE_COLLECTOR_ADDR, NATIVE_DENOM), 500);

        assert_eq!(
            dex.order_changes_map().get("i1").unwrap().kind,
            OrderChangeKind::IocNoFill
        );
        assert_eq!(transfers.len(), 1);
        assert!(transfers[0].is_expired && transfers[0].is_buyer);
        assert_eq!(transfers[0].fee, vec![Coin::new(NATIVE_DENOM, 500)]);
    }

    #[test]
    fn test_breathe_block_expires_only_aged_gtc_orders() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();

        let old_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fresh_time = Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap();
        dex.add_order(
            &mut accounts,
            OrderInfo {
                created_time: old_time,
                ..make_order("old", BUYER, Side::Buy, 100_000, 1_000_000)
            },
        )
        .unwrap();
        dex.add_order(
            &mut accounts,
            OrderInfo {
                created_time: fresh_time,
                ..make_order("fresh", BUYER, Side::Buy, 100_000, 1_000_000)
            },
        )
        .unwrap();

        let block_time = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 5).unwrap();
        let mut transfers = vec![];
        dex.end_breathe_block(&mut accounts, block_time, 7, &mut |t| transfers.push(t));

        assert_eq!(
            dex.order_changes_map().get("old").unwrap().kind,
            OrderChangeKind::Expired
        );
        assert_eq!(
            dex.order_changes_map().get("fresh").unwrap().kind,
            OrderChangeKind::New
        );
        assert_eq!(transfers.len(), 1);
        assert!(transfers[0].is_expired);
        assert_eq!(transfers[0].fee, vec![Coin::new(NATIVE_DENOM, 1_000)]);
        // the fresh order still rests with its collateral locked
        assert_eq!(accounts.locked_balance(BUYER, NATIVE_DENOM), 1_000);
    }

    #[test]
    fn test_terminal_changes_prune_locally() {
        let (mut dex, mut accounts) = make_keeper(true);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();
        dex.add_order(
            &mut accounts,
            make_order("b1", BUYER, Side::Buy, 102_000, 1_000_000),
        )
        .unwrap();
        dex.add_order(
            &mut accounts,
            make_order("b2", BUYER, Side::Buy, 101_000, 1_000_000),
        )
        .unwrap();
        dex.cancel_order(&mut accounts, "XYZ_TIDE", "b1", BUYER)
            .unwrap();

        dex.prune_terminal_local();

        assert!(dex.order_changes_map().get("b1").is_none());
        assert!(dex.order("b1").is_none());
        // non-terminal entries survive
        assert_eq!(
            dex.order_changes_map().get("b2").unwrap().kind,
            OrderChangeKind::New
        );
        assert!(dex.order("b2").is_some());
    }

    #[test]
    fn test_without_collection_terminal_orders_drop_immediately() {
        let (mut dex, mut accounts) = make_keeper(false);
        dex.add_pair("XYZ", NATIVE_DENOM).unwrap();
        dex.add_order(
            &mut accounts,
            make_order("b1", BUYER, Side::Buy, 102_000, 1_000_000),
        )
        .unwrap();

        dex.cancel_order(&mut accounts, "XYZ_TIDE", "b1", BUYER)
            .unwrap();

        assert!(dex.order("b1").is_none());
        assert!(dex.order_changes_map().is_empty());
        assert!(dex.order_changes().is_empty());
    }
}
