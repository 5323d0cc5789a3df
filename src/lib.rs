pub mod account;
pub mod app;
pub mod config;
pub mod dex;
pub mod logger;
pub mod publish;
pub mod token;
pub mod types;
pub mod utils;

#[macro_use]
mod macros;
