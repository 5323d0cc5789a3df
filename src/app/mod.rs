use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::account::{AccountKeeper, AccountRecord, AppAccount};
use crate::app_debug;
use crate::config::AppConfig;
use crate::dex::order::OrderInfo;
use crate::dex::{DexKeeper, ORDER_BOOK_DEPTH};
use crate::logger::Logger;
use crate::publish::sink::Sink;
use crate::publish::Publisher;
use crate::token::{Token, TokenKeeper};
use crate::types::tx::{CancelOrderMsg, NewOrderMsg, Tx};
use crate::types::{Address, BlockHeader, NATIVE_DENOM};
use crate::utils::{sha256, Sha256Hash};

pub mod genesis;

mod end_block;

use genesis::{GenesisAccount, GenesisError, GenesisState};

pub const CODE_OK: u32 = 0;
pub const CODE_DECODE_ERR: u32 = 1;
pub const CODE_VALIDATE_ERR: u32 = 2;
pub const CODE_EXEC_ERR: u32 = 3;

/// Query handlers dispatch on the first path segment. Returning `None`
/// falls through to the default not-found response.
pub type AbciQueryHandler = fn(&App, &[&str]) -> Option<Vec<u8>>;

#[derive(Debug)]
pub struct QueryResult {
    pub code: u32,
    pub value: Vec<u8>,
    pub log: String,
}

/// Per-block mutable context: the header under execution plus the set of
/// addresses touched by delivered transactions. Created by
/// `set_deliver_state`, drained at the end-block publication handoff.
pub struct BlockState {
    pub header: BlockHeader,
    pub tx_related: HashSet<Address>,
}

type ScheduledTask = Box<dyn Fn() -> oneshot::Receiver<()> + Send>;

/// The replicated state machine driven by the consensus engine through
/// InitChain / CheckTx / DeliverTx / EndBlock / Commit / Query.
pub struct App {
    pub config: AppConfig,
    pub accounts: AccountKeeper,
    pub tokens: TokenKeeper,
    pub dex: DexKeeper,
    pub publisher: Option<Publisher>,

    /// Header of the last committed block; its time is the previous block
    /// time used by the breathe-block predicate.
    committed_header: BlockHeader,
    deliver_state: Option<BlockState>,

    query_handlers: BTreeMap<String, AbciQueryHandler>,
    scheduled_tasks: Vec<ScheduledTask>,
    pub logger: Arc<dyn Logger>,
}

impl App {
    pub fn new(config: AppConfig, sink: Box<dyn Sink>, logger: Arc<dyn Logger>) -> Self {
        let collect_order_info = config.publication.any_enabled();
        let dex = DexKeeper::new(config.fee, collect_order_info, Arc::clone(&logger));
        let publisher = if collect_order_info {
            Some(Publisher::start(
                config.publication.clone(),
                sink,
                Arc::clone(&logger),
            ))
        } else {
            None
        };

        let mut app = Self {
            config,
            accounts: AccountKeeper::new(),
            tokens: TokenKeeper::new(),
            dex,
            publisher,
            committed_header: BlockHeader::new(0, Utc.timestamp_opt(0, 0).unwrap()),
            deliver_state: None,
            query_handlers: BTreeMap::new(),
            scheduled_tasks: vec![],
            logger,
        };

        app.register_query_handler("dex", query_dex);
        app.register_query_handler("account", query_account);
        app.register_query_handler("tokens", query_tokens);
        app
    }

    /// Applies the genesis document. Errors here are fatal at startup; the
    /// caller exits the process.
    pub fn init_chain(&mut self, genesis_bytes: &[u8]) -> Result<(), GenesisError> {
        let state = GenesisState::from_bytes(genesis_bytes)?;

        for account in &state.accounts {
            self.accounts.set(
                account.address.clone(),
                AccountRecord::User(AppAccount {
                    address: account.address.clone(),
                    coins: account.coins.clone(),
                    ..Default::default()
                }),
            );
        }

        for token in &state.tokens {
            self.tokens
                .issue(Token {
                    symbol: token.symbol.clone(),
                    owner: token.owner.clone(),
                    total_supply: token.total_supply,
                })
                .map_err(|e| GenesisError::Token(format!("{:?}", e)))?;
            self.accounts
                .add_free(&token.owner, &token.symbol, token.total_supply);
        }

        for pair in &state.dex_genesis.trading_pairs {
            if pair.base != NATIVE_DENOM && !self.tokens.exists(&pair.base) {
                return Err(GenesisError::Pair(format!("unknown base {}", pair.base)));
            }
            if pair.quote != NATIVE_DENOM && !self.tokens.exists(&pair.quote) {
                return Err(GenesisError::Pair(format!("unknown quote {}", pair.quote)));
            }
            self.dex
                .add_pair(&pair.base, &pair.quote)
                .map_err(|e| GenesisError::Pair(format!("{:?}", e)))?;
        }

        Ok(())
    }

    /// Opens a new block context. Called once per block before DeliverTx.
    pub fn set_deliver_state(&mut self, header: BlockHeader) {
        self.deliver_state = Some(BlockState {
            header,
            tx_related: HashSet::new(),
        });
    }

    pub fn deliver_state(&self) -> Option<&BlockState> {
        self.deliver_state.as_ref()
    }

    pub fn check_tx(&self, tx_bytes: &[u8]) -> u32 {
        let tx = match Tx::decode(tx_bytes) {
            Ok(tx) => tx,
            Err(_) => return CODE_DECODE_ERR,
        };
        if tx.validate().is_err() {
            return CODE_VALIDATE_ERR;
        }
        CODE_OK
    }

    pub fn deliver_tx(&mut self, tx_bytes: &[u8]) -> u32 {
        let tx = match Tx::decode(tx_bytes) {
            Ok(tx) => tx,
            Err(_) => return CODE_DECODE_ERR,
        };
        if tx.validate().is_err() {
            return CODE_VALIDATE_ERR;
        }
        let Some(header) = self.deliver_state.as_ref().map(|s| s.header) else {
            self.logger.log("error", "deliver tx without a deliver state");
            return CODE_EXEC_ERR;
        };

        match tx {
            Tx::NewOrder(msg) => self.handle_new_order(header, msg),
            Tx::CancelOrder(msg) => self.handle_cancel_order(msg),
        }
    }

    fn handle_new_order(&mut self, header: BlockHeader, msg: NewOrderMsg) -> u32 {
        let info = OrderInfo {
            id: msg.id,
            owner: msg.sender.clone(),
            symbol: msg.symbol,
            side: msg.side,
            price: msg.price,
            qty: msg.qty,
            cum_qty: 0,
            time_in_force: msg.time_in_force,
            created_height: header.height,
            created_time: header.time,
        };

        match self.dex.add_order(&mut self.accounts, info) {
            Ok(()) => {
                self.track_tx_address(msg.sender);
                CODE_OK
            }
            Err(e) => {
                app_debug!("new order rejected: {:?}", e);
                CODE_EXEC_ERR
            }
        }
    }

    fn handle_cancel_order(&mut self, msg: CancelOrderMsg) -> u32 {
        match self
            .dex
            .cancel_order(&mut self.accounts, &msg.symbol, &msg.id, &msg.sender)
        {
            Ok(()) => {
                self.track_tx_address(msg.sender);
                CODE_OK
            }
            Err(e) => {
                app_debug!("cancel rejected: {:?}", e);
                CODE_EXEC_ERR
            }
        }
    }

    fn track_tx_address(&mut self, address: Address) {
        if let Some(state) = self.deliver_state.as_mut() {
            state.tx_related.insert(address);
        }
    }

    /// Commits the block: hashes the deterministic state and advances the
    /// committed header.
    pub fn commit(&mut self) -> Sha256Hash {
        #[derive(Serialize)]
        struct StateDigest<'a> {
            accounts: Vec<(&'a Address, &'a AccountRecord)>,
            tokens: Vec<&'a Token>,
            orders: Vec<&'a OrderInfo>,
        }

        let digest = StateDigest {
            accounts: self.accounts.iter().collect(),
            tokens: self.tokens.list(),
            orders: self.dex.resting_orders(),
        };
        let encoded = bincode::serialize(&digest).expect("state types always serialize");
        let app_hash = sha256(&encoded);

        if let Some(state) = &self.deliver_state {
            self.committed_header = state.header;
        }
        app_hash
    }

    pub fn committed_header(&self) -> BlockHeader {
        self.committed_header
    }

    pub fn register_query_handler(&mut self, prefix: &str, handler: AbciQueryHandler) {
        if self.query_handlers.contains_key(prefix) {
            panic!("query handler prefix `{}` is already registered", prefix);
        }
        self.query_handlers.insert(prefix.to_owned(), handler);
    }

    pub fn query(&self, path: &str) -> QueryResult {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.is_empty() {
            return QueryResult {
                code: 1,
                value: vec![],
                log: "no query path provided".to_owned(),
            };
        }

        if let Some(handler) = self.query_handlers.get(parts[0]) {
            if let Some(value) = handler(self, &parts[1..]) {
                return QueryResult {
                    code: CODE_OK,
                    value,
                    log: String::new(),
                };
            }
        }
        QueryResult {
            code: 1,
            value: vec![],
            log: format!("unknown query path: {}", path),
        }
    }

    /// Registers a collaborator run asynchronously on every breathe block;
    /// the orchestrator awaits its completion signal before returning.
    pub fn register_scheduled_task<F>(&mut self, task: F)
    where
        F: Fn() -> oneshot::Receiver<()> + Send + 'static,
    {
        self.scheduled_tasks.push(Box::new(task));
    }

    pub(crate) fn launch_scheduled_tasks(&self) -> Vec<oneshot::Receiver<()>> {
        self.scheduled_tasks.iter().map(|task| task()).collect()
    }

    /// Serializes the world state back into a genesis-shaped document.
    pub fn export_app_state(&self) -> Result<String, serde_json::Error> {
        let mut accounts = vec![];
        for (address, record) in self.accounts.iter() {
            if let AccountRecord::User(acc) = record {
                accounts.push(GenesisAccount {
                    address: address.clone(),
                    coins: acc.coins.clone(),
                });
            }
        }

        let state = GenesisState {
            accounts,
            tokens: self
                .tokens
                .list()
                .into_iter()
                .map(|t| genesis::GenesisToken {
                    symbol: t.symbol.clone(),
                    owner: t.owner.clone(),
                    total_supply: t.total_supply,
                })
                .collect(),
            dex_genesis: genesis::DexGenesis {
                trading_pairs: self
                    .dex
                    .pairs()
                    .into_iter()
                    .map(|p| genesis::GenesisPair {
                        base: p.base.clone(),
                        quote: p.quote.clone(),
                    })
                    .collect(),
            },
        };
        serde_json::to_string_pretty(&state)
    }
}

fn query_dex(app: &App, path: &[&str]) -> Option<Vec<u8>> {
    match path {
        ["book", symbol] => {
            let (buys, sells) = app.dex.book_snapshot(symbol, ORDER_BOOK_DEPTH)?;
            serde_json::to_vec(&serde_json::json!({
                "symbol": symbol,
                "buys": buys,
                "sells": sells,
            }))
            .ok()
        }
        _ => None,
    }
}

fn query_account(app: &App, path: &[&str]) -> Option<Vec<u8>> {
    match path {
        [address] => match app.accounts.get(address) {
            Some(AccountRecord::User(acc)) => serde_json::to_vec(acc).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn query_tokens(app: &App, path: &[&str]) -> Option<Vec<u8>> {
    match path {
        [] => serde_json::to_vec(&app.tokens.list()).ok(),
        _ => None,
    }
}
