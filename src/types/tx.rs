use serde::{Deserialize, Serialize};

use crate::dex::order::{Side, TimeInForce};
use crate::types::Address;

/// A decoded transaction as delivered by the consensus engine.
///
/// Signature and fee checking happen in the antehandler upstream of this
/// crate; by the time a `Tx` reaches the state machine it is authenticated.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tx {
    NewOrder(NewOrderMsg),
    CancelOrder(CancelOrderMsg),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewOrderMsg {
    pub sender: Address,
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub price: i64,
    pub qty: i64,
    pub time_in_force: TimeInForce,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CancelOrderMsg {
    pub sender: Address,
    pub id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    Decode(String),
    Validate(&'static str),
}

impl Tx {
    pub fn decode(bytes: &[u8]) -> Result<Tx, TxError> {
        if bytes.is_empty() {
            return Err(TxError::Decode("tx bytes are empty".to_owned()));
        }
        serde_json::from_slice(bytes).map_err(|e| TxError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("tx types always serialize")
    }

    /// Stateless checks shared by CheckTx and DeliverTx.
    pub fn validate(&self) -> Result<(), TxError> {
        match self {
            Tx::NewOrder(msg) => {
                if msg.sender.is_empty() {
                    return Err(TxError::Validate("sender must not be empty"));
                }
                if msg.id.is_empty() {
                    return Err(TxError::Validate("order id must not be empty"));
                }
                if !msg.symbol.contains('_') {
                    return Err(TxError::Validate("symbol must be BASE_QUOTE"));
                }
                if msg.price <= 0 {
                    return Err(TxError::Validate("price must be positive"));
                }
                if msg.qty <= 0 {
                    return Err(TxError::Validate("qty must be positive"));
                }
                Ok(())
            }
            Tx::CancelOrder(msg) => {
                if msg.sender.is_empty() {
                    return Err(TxError::Validate("sender must not be empty"));
                }
                if msg.id.is_empty() {
                    return Err(TxError::Validate("order id must not be empty"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_new_order() -> Tx {
        Tx::NewOrder(NewOrderMsg {
            sender: "tide1buyer".to_owned(),
            id: "tide1buyer-1".to_owned(),
            symbol: "XYZ_TIDE".to_owned(),
            side: Side::Buy,
            price: 102_000,
            qty: 3_000_000,
            time_in_force: TimeInForce::Gtc,
        })
    }

    #[test]
    fn test_round_trips_through_wire_encoding() {
        let tx = make_new_order();
        let decoded = Tx::decode(&tx.encode()).unwrap();

        let Tx::NewOrder(msg) = decoded else {
            panic!("expected a new order");
        };
        assert_eq!(msg.symbol, "XYZ_TIDE");
        assert_eq!(msg.price, 102_000);
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert!(matches!(Tx::decode(b""), Err(TxError::Decode(_))));
        assert!(matches!(Tx::decode(b"not json"), Err(TxError::Decode(_))));

        let Tx::NewOrder(mut msg) = make_new_order() else {
            unreachable!()
        };
        msg.qty = 0;
        assert_eq!(
            Tx::NewOrder(msg).validate(),
            Err(TxError::Validate("qty must be positive"))
        );
    }
}
