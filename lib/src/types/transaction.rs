use serde::{Deserialize, Serialize};

use crate::codec::{self, hex_bytes_opt};
use crate::crypto::sha256d;
use crate::error::TxnValidationError;
use crate::{Address, Hash, MAX_BLOCK_SERIALIZED_SIZE, MAX_MONEY};

/// A specific output of a specific transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "_type")]
pub struct OutPoint {
    pub txid: Hash,
    pub txout_idx: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct TxIn {
    /// `None` marks a coinbase input.
    pub to_spend: Option<OutPoint>,
    /// Signature over the spend message; for a coinbase input this carries
    /// the block height as opaque bytes.
    #[serde(with = "hex_bytes_opt")]
    pub unlock_sig: Option<Vec<u8>>,
    #[serde(with = "hex_bytes_opt")]
    pub unlock_pk: Option<Vec<u8>>,
    pub sequence: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct TxOut {
    pub value: u64,
    pub to_address: Address,
}

/// A `TxOut` enriched with the context the UTXO set needs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct UnspentTxOut {
    pub value: u64,
    pub to_address: Address,
    pub txid: Hash,
    pub txout_idx: u32,
    pub is_coinbase: bool,
    pub height: u32,
}

impl UnspentTxOut {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            txout_idx: self.txout_idx,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct Transaction {
    pub txins: Vec<TxIn>,
    pub txouts: Vec<TxOut>,
    pub locktime: Option<u32>,
}

impl Transaction {
    /// Double SHA-256 of the canonical serialization.
    pub fn id(&self) -> Hash {
        sha256d(codec::serialize(self).as_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.txins.len() == 1 && self.txins[0].to_spend.is_none()
    }

    /// The first transaction of every block: mints `value` to `pay_to`, its
    /// single input carrying the block height as the unlock bytes.
    pub fn create_coinbase(pay_to: &str, value: u64, height: u32) -> Self {
        Self {
            txins: vec![TxIn {
                to_spend: None,
                unlock_sig: Some(height.to_string().into_bytes()),
                unlock_pk: None,
                sequence: 0,
            }],
            txouts: vec![TxOut {
                value,
                to_address: pay_to.to_string(),
            }],
            locktime: None,
        }
    }

    /// Structural checks that need no chain context.
    pub fn validate_basics(&self, as_coinbase: bool) -> Result<(), TxnValidationError> {
        if self.txouts.is_empty() {
            return Err(TxnValidationError::Invalid("missing txouts".to_string()));
        }
        if !as_coinbase && self.txins.is_empty() {
            return Err(TxnValidationError::Invalid("missing txins".to_string()));
        }
        if codec::serialize(self).len() > MAX_BLOCK_SERIALIZED_SIZE {
            return Err(TxnValidationError::Invalid("too large".to_string()));
        }
        let total_spend: u64 = self.txouts.iter().map(|txout| txout.value).sum();
        if total_spend > MAX_MONEY {
            return Err(TxnValidationError::Invalid(
                "spend value too high".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_shape() {
        let txn = Transaction::create_coinbase("1SomeAddress", 5_000_000_000, 7);
        assert!(txn.is_coinbase());
        assert_eq!(txn.txins[0].unlock_sig.as_deref(), Some(b"7".as_slice()));
        assert_eq!(txn.txouts[0].value, 5_000_000_000);
    }

    #[test]
    fn basics_reject_empty_and_oversized() {
        let empty = Transaction {
            txins: vec![],
            txouts: vec![],
            locktime: None,
        };
        assert!(empty.validate_basics(true).is_err());

        let no_inputs = Transaction {
            txins: vec![],
            txouts: vec![TxOut {
                value: 1,
                to_address: "1a".to_string(),
            }],
            locktime: None,
        };
        assert!(no_inputs.validate_basics(false).is_err());
        assert!(no_inputs.validate_basics(true).is_ok());

        let too_rich = Transaction {
            txins: vec![],
            txouts: vec![TxOut {
                value: MAX_MONEY + 1,
                to_address: "1a".to_string(),
            }],
            locktime: None,
        };
        assert!(too_rich.validate_basics(true).is_err());
    }

    #[test]
    fn txid_commits_to_contents() {
        let txn = Transaction::create_coinbase("1addr", 50, 0);
        let mut other = txn.clone();
        other.txouts[0].value = 51;
        assert_ne!(txn.id(), other.id());
        assert_eq!(txn.id(), txn.clone().id());
        assert_eq!(txn.id().len(), 64);
    }
}
