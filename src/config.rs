use dotenv::dotenv;
use std::env;

use crate::dex::fee::FeeConfig;

#[derive(Debug, Clone)]
pub struct PublicationConfig {
    pub publish_market_data: bool,
    pub publish_account_balance: bool,
    pub publish_order_book: bool,
    pub publication_channel_size: usize,
    pub fee_collection_channel_size: usize,
    pub to_remove_order_id_channel_size: usize,
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            publish_market_data: false,
            publish_account_balance: false,
            publish_order_book: false,
            publication_channel_size: 10_000,
            fee_collection_channel_size: 4_000,
            to_remove_order_id_channel_size: 1_000,
        }
    }
}

impl PublicationConfig {
    pub fn any_enabled(&self) -> bool {
        self.publish_market_data || self.publish_account_balance || self.publish_order_book
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub publication: PublicationConfig,
    pub breathe_block_days_back: i64,
    pub fee: FeeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            publication: PublicationConfig::default(),
            breathe_block_days_back: 7,
            fee: FeeConfig::default(),
        }
    }
}

pub fn retrieve_app_config() -> AppConfig {
    dotenv().ok();

    let defaults = AppConfig::default();
    AppConfig {
        publication: PublicationConfig {
            publish_market_data: env_bool(
                "PUBLISH_MARKET_DATA",
                defaults.publication.publish_market_data,
            ),
            publish_account_balance: env_bool(
                "PUBLISH_ACCOUNT_BALANCE",
                defaults.publication.publish_account_balance,
            ),
            publish_order_book: env_bool(
                "PUBLISH_ORDER_BOOK",
                defaults.publication.publish_order_book,
            ),
            publication_channel_size: env_usize(
                "PUBLICATION_CHANNEL_SIZE",
                defaults.publication.publication_channel_size,
            ),
            fee_collection_channel_size: env_usize(
                "FEE_COLLECTION_CHANNEL_SIZE",
                defaults.publication.fee_collection_channel_size,
            ),
            to_remove_order_id_channel_size: env_usize(
                "TO_REMOVE_ORDER_ID_CHANNEL_SIZE",
                defaults.publication.to_remove_order_id_channel_size,
            ),
        },
        breathe_block_days_back: env_i64("BREATHE_BLOCK_DAYS_BACK", defaults.breathe_block_days_back),
        fee: FeeConfig {
            fee_rate: env_i64("FEE_RATE", defaults.fee.fee_rate),
            fee_rate_native: env_i64("FEE_RATE_NATIVE", defaults.fee.fee_rate_native),
            expire_fee: env_i64("EXPIRE_FEE", defaults.fee.expire_fee),
            ioc_expire_fee: env_i64("IOC_EXPIRE_FEE", defaults.fee.ioc_expire_fee),
        },
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
