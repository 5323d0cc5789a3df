use std::collections::BTreeMap;

use super::order::{OrderInfo, PriceLevel, Side, TimeInForce, Trade};

#[derive(Debug)]
struct Level {
    price: i64,
    orders: Vec<OrderInfo>,
}

impl Level {
    fn remaining(&self) -> i64 {
        self.orders.iter().map(|o| o.remaining()).sum()
    }
}

/// Result of one end-of-block auction round.
#[derive(Debug)]
pub struct AuctionOutcome {
    pub trades: Vec<Trade>,
    /// IOC orders removed with their remainder unfilled, cum_qty up to date.
    pub expired: Vec<OrderInfo>,
}

/// Per-symbol call auction engine. Orders rest here between blocks; once per
/// block `match_orders` clears the book at a single price.
pub struct MatchEngine {
    pub symbol: String,

    // levels are in reverse order, best prices are at the end
    bid_levels: Vec<Level>, // ascending price
    ask_levels: Vec<Level>, // descending price

    last_trades: Vec<Trade>,
    last_traded_price: i64,
    prev_top: (Vec<PriceLevel>, Vec<PriceLevel>),
    dirty: bool,
}

impl MatchEngine {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_owned(),
            bid_levels: vec![],
            ask_levels: vec![],
            last_trades: vec![],
            last_traded_price: 0,
            prev_top: (vec![], vec![]),
            dirty: false,
        }
    }

    fn add_order_with_cmp<F>(levels: &mut Vec<Level>, order: OrderInfo, mut compare: F)
    where
        F: FnMut(i64, i64) -> std::cmp::Ordering,
    {
        let price = order.price;
        let mut left = 0;
        let mut right = levels.len();

        while left < right {
            let mid = left + (right - left) / 2;
            let mid_price = levels[mid].price;

            if price == mid_price {
                levels[mid].orders.push(order);
                return;
            } else if compare(price, mid_price) == std::cmp::Ordering::Less {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        levels.insert(
            left,
            Level {
                price,
                orders: vec![order],
            },
        )
    }

    pub fn add_order(&mut self, order: OrderInfo) {
        match order.side {
            Side::Buy => {
                Self::add_order_with_cmp(&mut self.bid_levels, order, |a, b| a.cmp(&b))
            }
            Side::Sell => {
                Self::add_order_with_cmp(&mut self.ask_levels, order, |a, b| b.cmp(&a))
            }
        }
        self.dirty = true;
    }

    pub fn remove_order(&mut self, side: Side, price: i64, id: &str) -> Option<OrderInfo> {
        let levels = match side {
            Side::Buy => &mut self.bid_levels,
            Side::Sell => &mut self.ask_levels,
        };

        let level_idx = levels.iter().position(|l| l.price == price)?;
        let order_idx = levels[level_idx].orders.iter().position(|o| o.id == id)?;
        let removed = levels[level_idx].orders.remove(order_idx);
        if levels[level_idx].orders.is_empty() {
            levels.remove(level_idx);
        }
        self.dirty = true;
        Some(removed)
    }

    pub fn best_prices(&self) -> (Option<i64>, Option<i64>) {
        let best_bid = self.bid_levels.last().map(|level| level.price);
        let best_ask = self.ask_levels.last().map(|level| level.price);

        (best_bid, best_ask)
    }

    pub fn last_trades(&self) -> &[Trade] {
        &self.last_trades
    }

    /// Single clearing price maximizing executed volume; ties break toward
    /// the smaller supply/demand imbalance, then the price closest to the
    /// last traded price, then the lower price.
    fn clearing_price(&self) -> Option<i64> {
        let (Some(best_bid), Some(best_ask)) = self.best_prices() else {
            return None;
        };
        if best_bid < best_ask {
            return None;
        }

        let mut candidates: Vec<i64> = self
            .bid_levels
            .iter()
            .chain(self.ask_levels.iter())
            .map(|l| l.price)
            .filter(|&p| p >= best_ask && p <= best_bid)
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let mut best: Option<(i64, i64, i64)> = None; // (price, exec, imbalance)
        for &p in &candidates {
            let demand: i64 = self
                .bid_levels
                .iter()
                .filter(|l| l.price >= p)
                .map(Level::remaining)
                .sum();
            let supply: i64 = self
                .ask_levels
                .iter()
                .filter(|l| l.price <= p)
                .map(Level::remaining)
                .sum();

            let exec = demand.min(supply);
            if exec == 0 {
                continue;
            }
            let imbalance = (demand - supply).abs();

            let better = match best {
                None => true,
                Some((bp, bexec, bimb)) => {
                    exec > bexec
                        || (exec == bexec
                            && (imbalance < bimb
                                || (imbalance == bimb
                                    && (p - self.last_traded_price).abs()
                                        < (bp - self.last_traded_price).abs())))
                }
            };
            if better {
                best = Some((p, exec, imbalance));
            }
        }

        best.map(|(p, _, _)| p)
    }

    fn drain_eligible<F>(levels: &mut Vec<Level>, pred: F) -> Vec<OrderInfo>
    where
        F: Fn(i64) -> bool,
    {
        // best level sits at the end, so eligible orders come out best-first
        // and FIFO within a level
        let mut out = vec![];
        while let Some(level) = levels.last() {
            if !pred(level.price) {
                break;
            }
            let mut level = levels.pop().expect("non-empty checked above");
            out.append(&mut level.orders);
        }
        out
    }

    /// Runs the call auction: fills crossing orders at the clearing price in
    /// price-time priority, then cancels any IOC remainder. The produced
    /// trades stay queryable through `last_trades` until the next round.
    pub fn match_orders(&mut self) -> AuctionOutcome {
        let mut trades: Vec<Trade> = vec![];

        if let Some(px) = self.clearing_price() {
            let mut buys = Self::drain_eligible(&mut self.bid_levels, |p| p >= px);
            let mut sells = Self::drain_eligible(&mut self.ask_levels, |p| p <= px);

            let mut si = 0;
            for buy in buys.iter_mut() {
                while buy.remaining() > 0 && si < sells.len() {
                    if sells[si].remaining() == 0 {
                        si += 1;
                        continue;
                    }
                    let sell = &mut sells[si];
                    let qty = buy.remaining().min(sell.remaining());
                    buy.cum_qty += qty;
                    sell.cum_qty += qty;

                    trades.push(Trade {
                        bid: buy.id.clone(),
                        sid: sell.id.clone(),
                        symbol: self.symbol.clone(),
                        last_px: px,
                        last_qty: qty,
                        buy_cum_qty: buy.cum_qty,
                    });

                    if sell.remaining() == 0 {
                        si += 1;
                    }
                }
            }

            // unfilled remainders keep their time priority: they are
            // reinserted in the order they were drained
            for buy in buys {
                if buy.remaining() > 0 {
                    Self::add_order_with_cmp(&mut self.bid_levels, buy, |a, b| a.cmp(&b));
                }
            }
            for sell in sells {
                if sell.remaining() > 0 {
                    Self::add_order_with_cmp(&mut self.ask_levels, sell, |a, b| b.cmp(&a));
                }
            }

            if !trades.is_empty() {
                self.last_traded_price = px;
                self.dirty = true;
            }
        }

        let expired = self.sweep_ioc();
        self.last_trades = trades.clone();

        AuctionOutcome { trades, expired }
    }

    fn sweep_ioc(&mut self) -> Vec<OrderInfo> {
        let mut expired = vec![];

        for levels in [&mut self.bid_levels, &mut self.ask_levels] {
            for level in levels.iter_mut() {
                let mut i = 0;
                while i < level.orders.len() {
                    if level.orders[i].time_in_force == TimeInForce::Ioc {
                        expired.push(level.orders.remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            levels.retain(|l| !l.orders.is_empty());
        }

        if !expired.is_empty() {
            self.dirty = true;
        }
        expired
    }

    /// Aggregated top-of-book: bids by descending price, asks ascending.
    pub fn top_levels(&self, depth: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let bids = self
            .bid_levels
            .iter()
            .rev()
            .take(depth)
            .map(|l| PriceLevel {
                price: l.price,
                qty: l.remaining(),
            })
            .collect();
        let asks = self
            .ask_levels
            .iter()
            .rev()
            .take(depth)
            .map(|l| PriceLevel {
                price: l.price,
                qty: l.remaining(),
            })
            .collect();
        (bids, asks)
    }

    /// Delta of the visible book against the snapshot taken at the previous
    /// call. Returns `None` when nothing visible changed; either way the
    /// snapshot is refreshed.
    pub fn book_delta(&mut self, depth: usize) -> Option<(Vec<PriceLevel>, Vec<PriceLevel>)> {
        if !self.dirty {
            return None;
        }

        let (cur_bids, cur_asks) = self.top_levels(depth);
        let buys = diff_levels(&self.prev_top.0, &cur_bids, true);
        let sells = diff_levels(&self.prev_top.1, &cur_asks, false);

        self.prev_top = (cur_bids, cur_asks);
        self.dirty = false;

        if buys.is_empty() && sells.is_empty() {
            None
        } else {
            Some((buys, sells))
        }
    }

    /// Every resting order in deterministic (side, price priority, time)
    /// order, for state hashing.
    pub fn resting_orders(&self) -> impl Iterator<Item = &OrderInfo> {
        self.bid_levels
            .iter()
            .rev()
            .chain(self.ask_levels.iter().rev())
            .flat_map(|l| l.orders.iter())
    }

    #[cfg(test)]
    pub(crate) fn set_last_trades_for_test(&mut self, trades: Vec<Trade>) {
        self.last_trades = trades;
    }
}

fn diff_levels(prev: &[PriceLevel], cur: &[PriceLevel], descending: bool) -> Vec<PriceLevel> {
    let prev_map: BTreeMap<i64, i64> = prev.iter().map(|l| (l.price, l.qty)).collect();
    let cur_map: BTreeMap<i64, i64> = cur.iter().map(|l| (l.price, l.qty)).collect();

    let mut out: Vec<PriceLevel> = vec![];
    for (&price, _) in prev_map.iter().chain(cur_map.iter()) {
        if out.iter().any(|l| l.price == price) {
            continue;
        }
        let was = prev_map.get(&price).copied().unwrap_or(0);
        let now = cur_map.get(&price).copied().unwrap_or(0);
        if was != now {
            out.push(PriceLevel { price, qty: now });
        }
    }

    out.sort_by_key(|l| l.price);
    if descending {
        out.reverse();
    }
    out
}
