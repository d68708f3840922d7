use std::collections::HashSet;

use log::{debug, info, warn};

use crate::chain::ChainState;
use crate::error::TxnValidationError;
use crate::types::{Block, OutPoint, Transaction, UnspentTxOut};
use crate::{Hash, MAX_BLOCK_SERIALIZED_SIZE};

/// Pending transactions, in arrival order. Arrival order is what block
/// assembly iterates, so it is kept explicit rather than left to a hash
/// map.
#[derive(Clone, Debug, Default)]
pub struct Mempool {
    entries: Vec<(Hash, Transaction)>,
    /// Transactions whose referenced UTXO could not be resolved yet.
    pub orphans: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.entries.iter().any(|(id, _)| id == txid)
    }

    pub fn get(&self, txid: &str) -> Option<&Transaction> {
        self.entries
            .iter()
            .find(|(id, _)| id == txid)
            .map(|(_, txn)| txn)
    }

    pub fn insert(&mut self, txn: Transaction) {
        let txid = txn.id();
        if !self.contains(&txid) {
            self.entries.push((txid, txn));
        }
    }

    pub fn remove(&mut self, txid: &str) -> Option<Transaction> {
        let at = self.entries.iter().position(|(id, _)| id == txid)?;
        Some(self.entries.remove(at).1)
    }

    pub fn txids(&self) -> Vec<Hash> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an outpoint against outputs produced by pending
    /// transactions. Mempool-resolved UTXOs are never coinbases, so the
    /// maturity rule cannot trigger on them.
    pub fn find_utxo(&self, outpoint: &OutPoint) -> Option<UnspentTxOut> {
        let txn = self.get(&outpoint.txid)?;
        let txout = txn.txouts.get(outpoint.txout_idx as usize)?;
        Some(UnspentTxOut {
            value: txout.value,
            to_address: txout.to_address.clone(),
            txid: outpoint.txid.clone(),
            txout_idx: outpoint.txout_idx,
            is_coinbase: false,
            height: 0,
        })
    }
}

enum AddOutcome {
    Added(Block),
    MissingParent,
    Oversize,
}

impl ChainState {
    /// Validate and admit a transaction. Orphans are parked; other
    /// failures are logged and dropped.
    pub fn add_txn_to_mempool(&mut self, txn: Transaction) -> bool {
        let txid = txn.id();
        if self.mempool.contains(&txid) {
            debug!("txn {txid} already seen");
            return false;
        }
        match self.validate_txn(&txn, None, true, false) {
            Ok(()) => {
                info!("txn {txid} added to mempool");
                self.mempool.insert(txn);
                true
            }
            Err(TxnValidationError::Orphan(orphan)) => {
                warn!("txn {txid} submitted as orphan");
                self.mempool.orphans.push(*orphan);
                false
            }
            Err(err) => {
                warn!("txn {txid} rejected: {err}");
                false
            }
        }
    }

    /// Greedy, dependency-respecting block fill. Parents pending in the
    /// mempool are pulled in first; a candidate whose parent cannot be
    /// resolved is skipped, and the first candidate that would push the
    /// block over the size bound ends selection.
    pub fn select_from_mempool(&self, base: &Block) -> Block {
        let mut block = base.clone();
        let mut added: HashSet<Hash> = HashSet::new();

        for txid in self.mempool.txids() {
            match self.try_add_to_block(block.clone(), &txid, &mut added) {
                AddOutcome::Added(extended) => block = extended,
                AddOutcome::MissingParent => continue,
                AddOutcome::Oversize => break,
            }
        }
        block
    }

    fn try_add_to_block(&self, block: Block, txid: &str, added: &mut HashSet<Hash>) -> AddOutcome {
        if added.contains(txid) {
            return AddOutcome::Added(block);
        }
        let Some(txn) = self.mempool.get(txid).cloned() else {
            return AddOutcome::MissingParent;
        };

        let mut block = block;
        for txin in &txn.txins {
            let Some(to_spend) = &txin.to_spend else {
                // a disconnected coinbase lingering in the mempool
                return AddOutcome::MissingParent;
            };
            if self.utxo_set.contains(to_spend) {
                continue;
            }
            let Some(pending) = self.mempool.find_utxo(to_spend) else {
                debug!("couldn't find UTXO for {to_spend:?}, dropping candidate {txid}");
                return AddOutcome::MissingParent;
            };
            match self.try_add_to_block(block, &pending.txid, added) {
                AddOutcome::Added(extended) => block = extended,
                other => return other,
            }
        }

        let mut txns = block.txns.clone();
        txns.push(txn);
        let candidate = Block { txns, ..block.clone() };
        if candidate.serialized_len() < MAX_BLOCK_SERIALIZED_SIZE {
            debug!("added txn {txid} to block");
            added.insert(txid.to_string());
            AddOutcome::Added(candidate)
        } else {
            AddOutcome::Oversize
        }
    }
}
