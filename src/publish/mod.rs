use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::PublicationConfig;
use crate::logger::Logger;

pub mod sink;
pub mod types;

use sink::Sink;
use types::{
    AccountsPublished, BlockInfoToPublish, BooksPublished, OrdersPublished, TradesPublished,
    TOPIC_ACCOUNTS, TOPIC_BOOKS, TOPIC_ORDERS, TOPIC_TRADES,
};

/// State-machine side of the publication pipeline: one bounded channel in,
/// two channels back for the removal handshake. The worker task owns the
/// sink; a sink that fails to initialize leaves the publisher dead
/// (`is_live == false`) without affecting block processing.
pub struct Publisher {
    pub to_publish: mpsc::Sender<BlockInfoToPublish>,
    pub to_remove_order_id: mpsc::Receiver<String>,
    pub remove_done: mpsc::Receiver<()>,
    live: Arc<AtomicBool>,
    config: PublicationConfig,
}

impl Publisher {
    pub fn start(
        config: PublicationConfig,
        mut sink: Box<dyn Sink>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let (to_publish_tx, to_publish_rx) = mpsc::channel(config.publication_channel_size.max(1));
        let (remove_tx, remove_rx) = mpsc::channel(config.to_remove_order_id_channel_size.max(1));
        let (done_tx, done_rx) = mpsc::channel(1);
        let live = Arc::new(AtomicBool::new(true));

        match sink.init() {
            Ok(()) => {
                tokio::spawn(run_worker(
                    to_publish_rx,
                    remove_tx,
                    done_tx,
                    sink,
                    config.clone(),
                    Arc::clone(&live),
                    logger,
                ));
            }
            Err(e) => {
                live.store(false, Ordering::SeqCst);
                logger.log(
                    "error",
                    &format!("cannot start up market data publisher: {:?}", e),
                );
            }
        }

        Self {
            to_publish: to_publish_tx,
            to_remove_order_id: remove_rx,
            remove_done: done_rx,
            live,
            config,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn should_publish(&self) -> bool {
        self.is_live() && self.config.any_enabled()
    }
}

async fn run_worker(
    mut to_publish: mpsc::Receiver<BlockInfoToPublish>,
    remove_tx: mpsc::Sender<String>,
    done_tx: mpsc::Sender<()>,
    mut sink: Box<dyn Sink>,
    config: PublicationConfig,
    live: Arc<AtomicBool>,
    logger: Arc<dyn Logger>,
) {
    while let Some(info) = to_publish.recv().await {
        if config.publish_market_data {
            emit_json(
                &mut sink,
                &live,
                &logger,
                TOPIC_TRADES,
                &TradesPublished {
                    height: info.height,
                    trades: info.trades.clone(),
                },
            );
            emit_json(
                &mut sink,
                &live,
                &logger,
                TOPIC_ORDERS,
                &OrdersPublished {
                    height: info.height,
                    orders: info.order_changes.clone(),
                },
            );
        }
        if config.publish_order_book {
            emit_json(
                &mut sink,
                &live,
                &logger,
                TOPIC_BOOKS,
                &BooksPublished {
                    height: info.height,
                    books: info.price_levels.clone(),
                },
            );
        }
        if config.publish_account_balance {
            emit_json(
                &mut sink,
                &live,
                &logger,
                TOPIC_ACCOUNTS,
                &AccountsPublished {
                    height: info.height,
                    accounts: info.accounts.values().cloned().collect(),
                },
            );
        }

        // terminal changes have now been emitted; hand their ids back for
        // removal, then release the state-machine thread
        for (id, change) in &info.order_changes_map {
            if change.kind.is_terminal() {
                if remove_tx.send(id.clone()).await.is_err() {
                    return;
                }
            }
        }
        if done_tx.send(()).await.is_err() {
            return;
        }
    }
}

fn emit_json<T: Serialize>(
    sink: &mut Box<dyn Sink>,
    live: &Arc<AtomicBool>,
    logger: &Arc<dyn Logger>,
    topic: &str,
    msg: &T,
) {
    let payload = match serde_json::to_vec(msg) {
        Ok(payload) => payload,
        Err(e) => {
            logger.log("error", &format!("cannot serialize {} feed: {}", topic, e));
            return;
        }
    };
    if let Err(e) = sink.emit(topic, &payload) {
        // degrade once, keep consuming so the handshake never stalls
        if live.swap(false, Ordering::SeqCst) {
            logger.log("error", &format!("sink failed, publisher degraded: {:?}", e));
        }
    }
}
