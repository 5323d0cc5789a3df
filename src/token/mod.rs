use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Address;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub symbol: String,
    pub owner: Address,
    pub total_supply: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    AlreadyIssued(String),
    InvalidSupply(String),
}

pub struct TokenKeeper {
    tokens: BTreeMap<String, Token>,
}

impl TokenKeeper {
    pub fn new() -> Self {
        Self {
            tokens: BTreeMap::new(),
        }
    }

    pub fn issue(&mut self, token: Token) -> Result<(), TokenError> {
        if token.total_supply <= 0 {
            return Err(TokenError::InvalidSupply(token.symbol));
        }
        if self.tokens.contains_key(&token.symbol) {
            return Err(TokenError::AlreadyIssued(token.symbol));
        }
        self.tokens.insert(token.symbol.clone(), token);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Token> {
        self.tokens.get(symbol)
    }

    pub fn exists(&self, symbol: &str) -> bool {
        self.tokens.contains_key(symbol)
    }

    pub fn list(&self) -> Vec<&Token> {
        self.tokens.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_rejects_duplicates_and_bad_supply() {
        let mut keeper = TokenKeeper::new();
        let token = Token {
            symbol: "XYZ".to_owned(),
            owner: "tide1issuer".to_owned(),
            total_supply: 1_000,
        };

        keeper.issue(token.clone()).unwrap();
        assert_eq!(
            keeper.issue(token),
            Err(TokenError::AlreadyIssued("XYZ".to_owned()))
        );
        assert_eq!(
            keeper.issue(Token {
                symbol: "ABC".to_owned(),
                owner: "tide1issuer".to_owned(),
                total_supply: 0,
            }),
            Err(TokenError::InvalidSupply("ABC".to_owned()))
        );
        assert!(keeper.exists("XYZ"));
    }
}
