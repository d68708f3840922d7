use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::codec;
use crate::error::BlockValidationError;
use crate::mempool::Mempool;
use crate::mining::MINE_INTERRUPT;
use crate::types::block::GENESIS_PREV_BLOCK_HASH;
use crate::types::{Block, OutPoint, Transaction, TxIn, TxOut, UnspentTxOut};
use crate::utxo::UtxoSet;
use crate::Params;

/// Index of the active chain in the ordered list (active, side 1, side 2,
/// ...) that `locate_block` and `connect_block` speak in.
pub const ACTIVE_CHAIN_IDX: usize = 0;

/// The hard-coded first block. Its single coinbase output funds the chain.
pub fn genesis_block() -> Block {
    Block {
        version: 0,
        prev_block_hash: GENESIS_PREV_BLOCK_HASH.to_string(),
        merkle_hash: "7118894203235a955a908c0abfc6d8fe6edec47b0a04ce1bf7263da3b4366d22"
            .to_string(),
        timestamp: 1_501_821_412,
        bits: 24,
        nonce: 10_126_761,
        txns: vec![Transaction {
            txins: vec![TxIn {
                to_spend: None,
                unlock_sig: Some(b"0".to_vec()),
                unlock_pk: None,
                sequence: 0,
            }],
            txouts: vec![TxOut {
                value: 5_000_000_000,
                to_address: "143UVyz7ooiAv1pMqbwPPpnH4BV9ifJGFF".to_string(),
            }],
            locktime: None,
        }],
    }
}

/// The whole chain-facing state of a node: the active chain, the side
/// branches contending with it, the UTXO set and mempool derived from it,
/// and the orphans waiting for context. One writer at a time; the node
/// keeps this behind a single lock.
#[derive(Clone, Debug)]
pub struct ChainState {
    pub params: Params,
    pub active_chain: Vec<Block>,
    pub side_branches: Vec<Vec<Block>>,
    pub utxo_set: UtxoSet,
    pub mempool: Mempool,
    pub orphan_blocks: Vec<Block>,
}

impl ChainState {
    /// A fresh mainnet node: the hard-coded genesis block with its coinbase
    /// output already in the UTXO set.
    pub fn new() -> Self {
        Self::with_genesis(Params::mainnet(), genesis_block())
    }

    /// A node on a custom network. Tests use this with low-difficulty
    /// `Params` and a genesis mined against them.
    pub fn with_genesis(params: Params, genesis: Block) -> Self {
        let mut state = Self {
            params,
            active_chain: vec![],
            side_branches: vec![],
            utxo_set: UtxoSet::new(),
            mempool: Mempool::new(),
            orphan_blocks: vec![],
        };
        for txn in &genesis.txns {
            let txid = txn.id();
            for (idx, txout) in txn.txouts.iter().enumerate() {
                state
                    .utxo_set
                    .add(txout, &txid, idx as u32, txn.is_coinbase(), 0);
            }
        }
        state.active_chain.push(genesis);
        state
    }

    pub fn tip(&self) -> &Block {
        // the chain is seeded with genesis and only ever shrinks back to it
        self.active_chain.last().expect("active chain is never empty")
    }

    /// Height of the active tip; the genesis block sits at height 0.
    pub fn current_height(&self) -> u32 {
        (self.active_chain.len() as u32).saturating_sub(1)
    }

    /// Find a block id in the active chain, then each side branch.
    /// Returns `(height_in_chain, chain_idx)`.
    pub fn locate_block(&self, block_hash: &str) -> Option<(usize, usize)> {
        if let Some(height) = find_in_chain(&self.active_chain, block_hash) {
            return Some((height, ACTIVE_CHAIN_IDX));
        }
        for (branch_idx, branch) in self.side_branches.iter().enumerate() {
            if let Some(height) = find_in_chain(branch, block_hash) {
                return Some((height, branch_idx + 1));
            }
        }
        None
    }

    /// Accept a block into whichever chain its parent selects. Returns the
    /// chain index it landed on, or `None` if it was already known, failed
    /// validation, or was orphaned.
    pub fn connect_block(&mut self, block: Block, doing_reorg: bool) -> Option<usize> {
        let block_id = block.id();
        // During a reorg only the active chain is searched: the branch
        // being promoted still sits in `side_branches` and must not shadow
        // the blocks being reconnected.
        let already_seen = if doing_reorg {
            find_in_chain(&self.active_chain, &block_id).is_some()
        } else {
            self.locate_block(&block_id).is_some()
        };
        if already_seen {
            debug!("ignore block already seen: {block_id}");
            return None;
        }

        let chain_idx = match self.validate_block(&block) {
            Ok(chain_idx) => chain_idx,
            Err(BlockValidationError::Orphan(orphan)) => {
                info!("found orphan block {block_id}");
                self.orphan_blocks.push(*orphan);
                return None;
            }
            Err(err) => {
                warn!("block {block_id} failed validation: {err}");
                return None;
            }
        };

        if chain_idx != ACTIVE_CHAIN_IDX && self.side_branches.len() < chain_idx {
            info!("creating a new side branch (idx {chain_idx}) for block {block_id}");
            self.side_branches.push(vec![]);
        }

        info!("connecting block {block_id} to chain {chain_idx}");
        if chain_idx == ACTIVE_CHAIN_IDX {
            let height = self.active_chain.len() as u32;
            for txn in &block.txns {
                let txid = txn.id();
                self.mempool.remove(&txid);
                for txin in &txn.txins {
                    if let Some(to_spend) = &txin.to_spend {
                        self.utxo_set.remove(to_spend);
                    }
                }
                for (idx, txout) in txn.txouts.iter().enumerate() {
                    self.utxo_set
                        .add(txout, &txid, idx as u32, txn.is_coinbase(), height);
                }
            }
            self.active_chain.push(block);
        } else {
            self.side_branches[chain_idx - 1].push(block);
        }

        let reorged = if doing_reorg {
            false
        } else {
            self.reorg_if_necessary()
        };
        if chain_idx == ACTIVE_CHAIN_IDX || reorged {
            MINE_INTERRUPT.set();
            info!(
                "block accepted at height {} with {} txns",
                self.active_chain.len() - 1,
                self.tip().txns.len()
            );
        }
        Some(chain_idx)
    }

    /// Undo the active tip: its transactions go back to the mempool, the
    /// UTXOs it spent are restored, the UTXOs it created are dropped.
    pub fn disconnect_block(&mut self) -> Option<Block> {
        let block = self.active_chain.last()?.clone();
        for txn in &block.txns {
            let txid = txn.id();
            self.mempool.insert(txn.clone());
            for txin in &txn.txins {
                if let Some(to_spend) = &txin.to_spend {
                    // restore what this input consumed, looking only at the
                    // chain being unwound
                    if let Some(utxo) = find_txout_for_txin(&self.active_chain, to_spend) {
                        self.utxo_set.put(utxo);
                    }
                }
            }
            for idx in 0..txn.txouts.len() {
                self.utxo_set.remove_output(&txid, idx as u32);
            }
        }
        info!("block {} disconnected", block.id());
        self.active_chain.pop()
    }

    /// Work comparison hook. Block count stands in for cumulative work;
    /// swap this out to weigh branches by their targets instead.
    fn branch_work(chain_len: usize) -> usize {
        chain_len
    }

    /// Promote any side branch that now reaches strictly higher than the
    /// active tip.
    pub fn reorg_if_necessary(&mut self) -> bool {
        let mut reorged = false;
        let frozen_side_branches = self.side_branches.clone();

        for (idx, branch) in frozen_side_branches.into_iter().enumerate() {
            let branch_idx = idx + 1;
            let Some(first) = branch.first() else {
                continue;
            };
            let Some(fork_idx) = find_in_chain(&self.active_chain, &first.prev_block_hash) else {
                continue;
            };
            let active_height = Self::branch_work(self.active_chain.len());
            let branch_height = Self::branch_work(branch.len() + fork_idx + 1);
            if branch_height > active_height {
                info!(
                    "attempting reorg of idx {branch_idx} to active_chain: \
                     new height {branch_height} vs. {active_height}"
                );
                reorged |= self.try_reorg(branch, branch_idx, fork_idx);
            }
        }
        reorged
    }

    /// Swap the active tail above `fork_idx` for `branch`. On any connect
    /// failure the old tail is restored and the branch stays where it was.
    fn try_reorg(&mut self, branch: Vec<Block>, branch_idx: usize, fork_idx: usize) -> bool {
        let fork_id = self.active_chain[fork_idx].id();

        let mut old_active = vec![];
        while self.tip().id() != fork_id {
            match self.disconnect_block() {
                Some(block) => old_active.push(block),
                None => break,
            }
        }
        old_active.reverse();

        for block in &branch {
            if self.connect_block(block.clone(), true) != Some(ACTIVE_CHAIN_IDX) {
                warn!("reorg of branch {branch_idx} failed, rolling back");
                while self.tip().id() != fork_id {
                    self.disconnect_block();
                }
                for block in &old_active {
                    self.connect_block(block.clone(), true);
                }
                return false;
            }
        }

        // the promoted branch leaves the side set; the old tail joins it
        let promoted_id = branch[0].id();
        if let Some(at) = self
            .side_branches
            .iter()
            .position(|b| b.first().map(|blk| blk.id()) == Some(promoted_id.clone()))
        {
            self.side_branches.remove(at);
        }
        self.side_branches.push(old_active);

        info!(
            "chain reorg! new height: {}, tip: {}",
            self.active_chain.len() - 1,
            self.tip().id()
        );
        true
    }

    /// Median timestamp of the last `count` active blocks; 0 on an empty
    /// window.
    pub fn median_time_past(&self, count: usize) -> u32 {
        if self.active_chain.is_empty() {
            return 0;
        }
        let window = self.active_chain.len().saturating_sub(count);
        let mut timestamps: Vec<u32> = self.active_chain[window..]
            .iter()
            .map(|block| block.timestamp)
            .collect();
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Write the active chain as one framed blob, the same encoding the
    /// wire uses.
    pub fn save_to_disk(&self, path: &Path) -> std::io::Result<()> {
        info!(
            "saving chain with {} blocks to {}",
            self.active_chain.len(),
            path.display()
        );
        let payload = codec::serialize(&self.active_chain);
        fs::write(path, codec::encode_framed(payload.as_bytes()))
    }

    /// Replay a chain file through `connect_block`. Any failure leaves the
    /// node on whatever prefix connected, ultimately falling back to
    /// genesis.
    pub fn load_from_disk(&mut self, path: &Path) {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("could not read chain file {}: {err}", path.display());
                return;
            }
        };
        let blocks: Vec<Block> = match codec::decode_framed(&raw).and_then(codec::deserialize) {
            Ok(blocks) => blocks,
            Err(err) => {
                warn!("chain file corrupted, starting from genesis: {err}");
                return;
            }
        };
        info!("loading chain of {} blocks from disk", blocks.len());
        for block in blocks {
            self.connect_block(block, false);
        }
    }
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

/// Height of a block id within one chain.
pub fn find_in_chain(chain: &[Block], block_hash: &str) -> Option<usize> {
    chain.iter().position(|block| block.id() == block_hash)
}

/// Resolve the output a txin consumed by scanning `chain` for its origin
/// transaction. Used while disconnecting blocks, where the UTXO set no
/// longer holds the answer.
pub fn find_txout_for_txin(chain: &[Block], to_spend: &OutPoint) -> Option<UnspentTxOut> {
    for (height, block) in chain.iter().enumerate() {
        for txn in &block.txns {
            if txn.id() == to_spend.txid {
                let txout = txn.txouts.get(to_spend.txout_idx as usize)?;
                return Some(UnspentTxOut {
                    value: txout.value,
                    to_address: txout.to_address.clone(),
                    txid: to_spend.txid.clone(),
                    txout_idx: to_spend.txout_idx,
                    is_coinbase: txn.is_coinbase(),
                    height: height as u32,
                });
            }
        }
    }
    None
}
