use std::collections::{BTreeMap, HashSet};

use crate::account::{AccountRecord, BalanceView};
use crate::dex::order::Transfer;
use crate::{app_debug, app_log};
use crate::dex::ORDER_BOOK_DEPTH;
use crate::publish::types::{Account, AssetBalance, BlockInfoToPublish, TradeToPublish};
use crate::types::Address;
use crate::utils::same_day_utc;

use super::App;

/// Grouped publication trades keyed by `(bid, sid)`; built in a single pass
/// over the transfer stream with value semantics.
type GroupedTrades = BTreeMap<(String, String), TradeToPublish>;

impl App {
    fn market_data_live(&self) -> bool {
        self.config.publication.publish_market_data
            && self.publisher.as_ref().map(|p| p.is_live()).unwrap_or(false)
    }

    pub fn should_publish(&self) -> bool {
        self.publisher
            .as_ref()
            .map(|p| p.should_publish())
            .unwrap_or(false)
    }

    /// End-of-block driver. Never fails: every recoverable condition is
    /// logged and the block continues, so all replicas stay in lockstep.
    pub async fn end_block(&mut self, height: i64) {
        let Some(header) = self.deliver_state.as_ref().map(|s| s.header) else {
            self.logger.log("error", "end block without a deliver state");
            return;
        };
        let last_block_time = self.committed_header.time;
        let block_time = header.time;

        let mut trades_to_publish: Vec<TradeToPublish> = vec![];

        if height == 1 || same_day_utc(last_block_time, block_time) {
            // only match in the normal block
            app_debug!("normal block: {}", height);
            if self.market_data_live() {
                let mut grouped = GroupedTrades::new();

                let capacity = self.config.publication.fee_collection_channel_size.max(1);
                let (trans_tx, trans_rx) = std::sync::mpsc::sync_channel::<Transfer>(capacity);
                {
                    let tx = trans_tx.clone();
                    let mut fee_collector = move |transfer: Transfer| {
                        let _ = tx.send(transfer);
                    };
                    self.dex
                        .match_and_allocate_all(&mut self.accounts, Some(&mut fee_collector));
                }
                drop(trans_tx);

                while let Ok(transfer) = trans_rx.recv() {
                    self.handle_transfer(&mut grouped, transfer);
                }

                trades_to_publish = self.join_trades(&grouped, height);
            } else {
                self.dex.match_and_allocate_all(&mut self.accounts, None);
            }
        } else {
            // breathe block
            app_log!(
                "start breathe block handling: height {}, lastBlockTime {}, newBlockTime {}",
                height,
                last_block_time,
                block_time
            );
            let scheduled = self.launch_scheduled_tasks();

            let mut transfers: Vec<Transfer> = vec![];
            self.dex.end_breathe_block(
                &mut self.accounts,
                block_time,
                self.config.breathe_block_days_back,
                &mut |t| transfers.push(t),
            );
            let mut grouped = GroupedTrades::new();
            for transfer in transfers {
                self.handle_transfer(&mut grouped, transfer);
            }

            // other end blockers
            for done in scheduled {
                let _ = done.await;
            }
        }

        if self.should_publish() {
            app_log!("start to collect publish information at height: {}", height);

            let (orders, orders_map) = self.dex.get_last_orders_copy();

            let mut accounts_to_publish = BTreeMap::new();
            if self.config.publication.publish_account_balance {
                let trade_related = self.dex.get_trade_related_accounts();
                let tx_related = self
                    .deliver_state
                    .as_ref()
                    .map(|s| s.tx_related.clone())
                    .unwrap_or_default();
                accounts_to_publish = self.all_changed_account_balances(&tx_related, &trade_related);
            }

            let price_levels = if self.config.publication.publish_order_book {
                self.dex.get_order_book_for_publish(ORDER_BOOK_DEPTH)
            } else {
                vec![]
            };

            let info = BlockInfoToPublish::new(
                height,
                block_time.timestamp(),
                trades_to_publish,
                orders,
                orders_map,
                accounts_to_publish,
                price_levels,
            );

            let publisher = self
                .publisher
                .as_mut()
                .expect("should_publish implies a publisher");
            if publisher.to_publish.send(info).await.is_err() {
                self.logger
                    .log("error", "publisher worker is gone, block info dropped");
            } else {
                // remove ids the worker has emitted; the done signal closes
                // the handshake
                loop {
                    tokio::select! {
                        biased;
                        Some(id) = publisher.to_remove_order_id.recv() => {
                            app_debug!("delete order {} from order changes map", id);
                            self.dex.remove_published(&id);
                        }
                        _ = publisher.remove_done.recv() => break,
                        else => break,
                    }
                }
            }

            self.dex.clear_order_changes();
        } else {
            // no consumer for the pending map: prune terminal entries
            // locally so it cannot grow without bound
            self.dex.prune_terminal_local();
            self.dex.clear_order_changes();
        }

        if let Some(state) = self.deliver_state.as_mut() {
            state.tx_related.clear();
        }
    }

    /// Per-transfer logic of the fee collection drain: expiry transfers
    /// annotate the pending order change, fill transfers accumulate the
    /// grouped publication trade for their `(bid, sid)` pair.
    fn handle_transfer(&mut self, grouped: &mut GroupedTrades, transfer: Transfer) {
        if transfer.is_expired {
            if !transfer.fee_free() {
                let id = if transfer.is_buyer {
                    &transfer.bid
                } else {
                    &transfer.sid
                };
                let fee = &transfer.fee[0];
                self.dex.set_order_fee(id, &fee.denom, fee.amount);
            }
        } else {
            let entry = grouped
                .entry((transfer.bid.clone(), transfer.sid.clone()))
                .or_insert_with(|| TradeToPublish {
                    bid: transfer.bid.clone(),
                    sid: transfer.sid.clone(),
                    ..Default::default()
                });
            if !transfer.fee_free() {
                let fee = &transfer.fee[0];
                if transfer.is_buyer {
                    entry.bfee = fee.amount;
                    entry.bfee_asset = fee.denom.clone();
                } else {
                    entry.sfee = fee.amount;
                    entry.sfee_asset = fee.denom.clone();
                }
            }
        }
    }

    /// Joins the engine's trades with the grouped fee records, assigning
    /// publication ids in symbol-lexicographic, then matching, order. A
    /// trade with no grouped record is an internal inconsistency: logged
    /// and skipped, never fatal.
    fn join_trades(&self, grouped: &GroupedTrades, height: i64) -> Vec<TradeToPublish> {
        let mut out = vec![];
        let mut trade_idx = 0;

        for (symbol, trades) in self.dex.last_trades() {
            for trade in trades {
                let key = (trade.bid.clone(), trade.sid.clone());
                let Some(grouped_trade) = grouped.get(&key) else {
                    self.logger.log(
                        "error",
                        &format!(
                            "failed to look up trade {}-{} from grouped trades",
                            trade.bid, trade.sid
                        ),
                    );
                    continue;
                };

                let mut published = grouped_trade.clone();
                published.id = format!("{}-{}", height, trade_idx);
                published.symbol = symbol.to_owned();
                published.price = trade.last_px;
                published.qty = trade.last_qty;
                published.buy_cum_qty = trade.buy_cum_qty;
                out.push(published);
                trade_idx += 1;
            }
        }
        out
    }

    /// Snapshot of every affected account's balance sheet. Addresses that
    /// cannot be resolved to a user account are logged and skipped.
    pub fn all_changed_account_balances(
        &self,
        tx_related: &HashSet<Address>,
        trade_related: &HashSet<Address>,
    ) -> BTreeMap<Address, Account> {
        let mut res = BTreeMap::new();
        self.account_balances_into(&mut res, tx_related);
        self.account_balances_into(&mut res, trade_related);
        res
    }

    fn account_balances_into(&self, res: &mut BTreeMap<Address, Account>, addrs: &HashSet<Address>) {
        for address in addrs {
            if res.contains_key(address) {
                continue;
            }
            match self.accounts.get(address) {
                Some(AccountRecord::User(acc)) => {
                    let mut assets: BTreeMap<String, AssetBalance> = BTreeMap::new();
                    for coin in acc.free_coins() {
                        balance_entry(&mut assets, &coin.denom).free = coin.amount;
                    }
                    for coin in acc.frozen_coins() {
                        balance_entry(&mut assets, &coin.denom).frozen = coin.amount;
                    }
                    for coin in acc.locked_coins() {
                        balance_entry(&mut assets, &coin.denom).locked = coin.amount;
                    }
                    res.insert(
                        address.clone(),
                        Account {
                            address: address.clone(),
                            assets: assets.into_values().collect(),
                        },
                    );
                }
                Some(_) => {
                    self.logger.log(
                        "error",
                        &format!("account {} has an unexpected variant", address),
                    );
                }
                None => {
                    self.logger
                        .log("error", &format!("failed to get account {}", address));
                }
            }
        }
    }
}

fn balance_entry<'a>(
    assets: &'a mut BTreeMap<String, AssetBalance>,
    denom: &str,
) -> &'a mut AssetBalance {
    assets.entry(denom.to_owned()).or_insert_with(|| AssetBalance {
        asset: denom.to_owned(),
        ..Default::default()
    })
}
