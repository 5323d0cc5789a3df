use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use tidepool::app::App;
use tidepool::app_log;
use tidepool::config::retrieve_app_config;
use tidepool::logger::ConsoleLogger;
use tidepool::publish::sink::{BufferedSink, StdoutSink};
use tidepool::types::tx::Tx;
use tidepool::types::BlockHeader;

/// One block of a replay script: header plus the transactions delivered in
/// order. Used to drive the state machine without a consensus engine.
#[derive(Deserialize, Debug)]
struct BlockScript {
    height: i64,
    time: DateTime<Utc>,
    txs: Vec<Tx>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(genesis_path) = args.get(1) else {
        eprintln!("Usage: tidepool <genesis.json> [blocks.json]");
        process::exit(2);
    };

    let config = retrieve_app_config();
    let logger = Arc::new(ConsoleLogger::new("tidepool"));
    let sink = BufferedSink::new(StdoutSink, 10_000, logger.clone());
    let mut app = App::new(config, Box::new(sink), logger);

    let genesis = match fs::read(genesis_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("cannot read genesis file {}: {}", genesis_path, e);
            process::exit(1);
        }
    };
    if let Err(e) = app.init_chain(&genesis) {
        eprintln!("genesis rejected: {:?}", e);
        process::exit(1);
    }
    app_log!("chain initialized from {}", genesis_path);

    let Some(blocks_path) = args.get(2) else {
        let hash = app.commit();
        app_log!("genesis app hash: {}", hex::encode(hash));
        return;
    };

    let blocks: Vec<BlockScript> = match fs::read(blocks_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Ok(blocks) => blocks,
        Err(e) => {
            eprintln!("cannot read block script {}: {}", blocks_path, e);
            process::exit(1);
        }
    };

    for block in blocks {
        app.set_deliver_state(BlockHeader::new(block.height, block.time));
        for tx in &block.txs {
            let code = app.deliver_tx(&tx.encode());
            if code != 0 {
                app_log!("tx rejected with code {} at height {}", code, block.height);
            }
        }
        app.end_block(block.height).await;
        let hash = app.commit();
        app_log!("block {} committed, app hash: {}", block.height, hex::encode(hash));
    }
}
