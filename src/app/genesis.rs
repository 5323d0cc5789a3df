use serde::{Deserialize, Serialize};

use crate::types::{Address, Coin};

/// World state loaded once at chain start. Parse failures here are fatal:
/// a node with a bad genesis must not join consensus.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GenesisState {
    pub accounts: Vec<GenesisAccount>,
    pub tokens: Vec<GenesisToken>,
    pub dex_genesis: DexGenesis,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenesisAccount {
    pub address: Address,
    pub coins: Vec<Coin>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenesisToken {
    pub symbol: String,
    pub owner: Address,
    pub total_supply: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DexGenesis {
    pub trading_pairs: Vec<GenesisPair>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenesisPair {
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
    Parse(String),
    Token(String),
    Pair(String),
}

impl GenesisState {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GenesisError> {
        serde_json::from_slice(bytes).map_err(|e| GenesisError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_a_full_genesis_document() {
        let raw = r#"{
            "accounts": [
                {"address": "tide1buyer", "coins": [{"denom": "TIDE", "amount": 100000000000}]}
            ],
            "tokens": [
                {"symbol": "XYZ", "owner": "tide1issuer", "total_supply": 100000000000}
            ],
            "dex_genesis": {
                "trading_pairs": [{"base": "XYZ", "quote": "TIDE"}]
            }
        }"#;

        let genesis = GenesisState::from_bytes(raw.as_bytes()).unwrap();

        assert_eq!(genesis.accounts.len(), 1);
        assert_eq!(genesis.tokens[0].symbol, "XYZ");
        assert_eq!(genesis.dex_genesis.trading_pairs[0].quote, "TIDE");
    }

    #[test]
    fn test_rejects_malformed_genesis() {
        assert!(matches!(
            GenesisState::from_bytes(b"{"),
            Err(GenesisError::Parse(_))
        ));
    }
}
