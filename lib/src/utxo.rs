use std::collections::HashMap;

use log::debug;

use crate::types::{OutPoint, TxOut, UnspentTxOut};
use crate::Hash;

/// The set of unspent transaction outputs of the active chain, keyed by
/// the outpoint that created them.
#[derive(Clone, Debug, Default)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly confirmed output.
    pub fn add(&mut self, txout: &TxOut, txid: &str, txout_idx: u32, is_coinbase: bool, height: u32) {
        let utxo = UnspentTxOut {
            value: txout.value,
            to_address: txout.to_address.clone(),
            txid: txid.to_string(),
            txout_idx,
            is_coinbase,
            height,
        };
        debug!("adding tx outpoint {:?} to utxo_set", utxo.outpoint());
        self.entries.insert(utxo.outpoint(), utxo);
    }

    /// Re-insert a previously spent output, e.g. while disconnecting a block.
    pub fn put(&mut self, utxo: UnspentTxOut) {
        self.entries.insert(utxo.outpoint(), utxo);
    }

    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<UnspentTxOut> {
        self.entries.remove(outpoint)
    }

    pub fn remove_output(&mut self, txid: &Hash, txout_idx: u32) -> Option<UnspentTxOut> {
        self.remove(&OutPoint {
            txid: txid.clone(),
            txout_idx,
        })
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UnspentTxOut> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UnspentTxOut)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txout(value: u64) -> TxOut {
        TxOut {
            value,
            to_address: "1addr".to_string(),
        }
    }

    #[test]
    fn add_get_remove() {
        let mut set = UtxoSet::new();
        let txid: Hash = "cc".repeat(32);
        set.add(&txout(10), &txid, 0, true, 5);
        set.add(&txout(20), &txid, 1, true, 5);
        assert_eq!(set.len(), 2);

        let outpoint = OutPoint {
            txid: txid.clone(),
            txout_idx: 1,
        };
        let found = set.get(&outpoint).unwrap();
        assert_eq!(found.value, 20);
        assert_eq!(found.height, 5);
        assert!(found.is_coinbase);

        let removed = set.remove_output(&txid, 0).unwrap();
        assert_eq!(removed.value, 10);
        assert!(!set.contains(&removed.outpoint()));

        set.put(removed.clone());
        assert!(set.contains(&removed.outpoint()));
    }
}
