//! Consensus validation of transactions and blocks against the current
//! chain state.

use chrono::Utc;
use log::debug;

use crate::chain::{ChainState, ACTIVE_CHAIN_IDX};
use crate::crypto::verify_spend;
use crate::error::{BlockValidationError, TxnValidationError};
use crate::merkle::get_merkle_root_of_txns;
use crate::pow;
use crate::types::block::GENESIS_PREV_BLOCK_HASH;
use crate::types::{Block, OutPoint, Transaction, UnspentTxOut};
use crate::{COINBASE_MATURITY, MAX_FUTURE_BLOCK_TIME};

/// Resolve an outpoint against a list of sibling transactions (the rest of
/// a block under validation). Sibling-resolved UTXOs are not coinbases.
fn find_utxo_in_list(to_spend: &OutPoint, txns: &[Transaction]) -> Option<UnspentTxOut> {
    let txn = txns.iter().find(|txn| txn.id() == to_spend.txid)?;
    let txout = txn.txouts.get(to_spend.txout_idx as usize)?;
    Some(UnspentTxOut {
        value: txout.value,
        to_address: txout.to_address.clone(),
        txid: to_spend.txid.clone(),
        txout_idx: to_spend.txout_idx,
        is_coinbase: false,
        height: 0,
    })
}

impl ChainState {
    /// Full transaction validation. Each input resolves against the
    /// confirmed UTXO set, then the block's siblings (when given), then the
    /// mempool (when allowed); an unresolvable input orphans the
    /// transaction rather than condemning it.
    pub fn validate_txn(
        &self,
        txn: &Transaction,
        siblings_in_block: Option<&[Transaction]>,
        allow_utxo_from_mempool: bool,
        as_coinbase: bool,
    ) -> Result<(), TxnValidationError> {
        txn.validate_basics(as_coinbase)?;

        let mut available_to_spend: u64 = 0;
        for txin in &txn.txins {
            let Some(to_spend) = &txin.to_spend else {
                return Err(TxnValidationError::Invalid(
                    "non-coinbase input spends nothing".to_string(),
                ));
            };

            let utxo = self
                .utxo_set
                .get(to_spend)
                .cloned()
                .or_else(|| {
                    siblings_in_block.and_then(|siblings| find_utxo_in_list(to_spend, siblings))
                })
                .or_else(|| {
                    if allow_utxo_from_mempool {
                        self.mempool.find_utxo(to_spend)
                    } else {
                        None
                    }
                });
            let Some(utxo) = utxo else {
                debug!("couldn't find UTXO {to_spend:?}, txn is orphaned");
                return Err(TxnValidationError::Orphan(Box::new(txn.clone())));
            };

            if utxo.is_coinbase
                && self.current_height().saturating_sub(utxo.height) < COINBASE_MATURITY
            {
                return Err(TxnValidationError::Invalid(
                    "coinbase UTXO not ready for spend".to_string(),
                ));
            }

            verify_spend(txin, &utxo, &txn.txouts).map_err(|err| {
                TxnValidationError::Invalid(format!("txin failed to unlock {to_spend:?}: {err}"))
            })?;

            available_to_spend += utxo.value;
        }

        let total_spent: u64 = txn.txouts.iter().map(|txout| txout.value).sum();
        if available_to_spend < total_spent {
            return Err(TxnValidationError::Invalid(
                "spend value is more than available".to_string(),
            ));
        }
        Ok(())
    }

    /// Full block validation. Returns the chain index the block belongs on:
    /// the active chain, an existing side branch, or a freshly allocated
    /// branch forking off the active chain. Blocks landing on a side branch
    /// defer their transaction checks until a reorg promotes them.
    pub fn validate_block(&self, block: &Block) -> Result<usize, BlockValidationError> {
        if block.txns.is_empty() {
            return Err(BlockValidationError::Invalid(
                "txns empty".to_string(),
            ));
        }

        let now = Utc::now().timestamp();
        if block.timestamp as i64 - now > MAX_FUTURE_BLOCK_TIME as i64 {
            return Err(BlockValidationError::Invalid(
                "block timestamp too far in future".to_string(),
            ));
        }

        if !pow::block_id_meets_bits(&block.id(), block.bits) {
            return Err(BlockValidationError::Invalid(
                "block header doesn't satisfy bits".to_string(),
            ));
        }

        if !block.txns[0].is_coinbase() {
            return Err(BlockValidationError::Invalid(
                "first txn must be coinbase".to_string(),
            ));
        }

        for (idx, txn) in block.txns.iter().enumerate() {
            txn.validate_basics(idx == 0).map_err(|err| {
                BlockValidationError::Invalid(format!("txn {} failed to validate: {err}", txn.id()))
            })?;
        }

        if get_merkle_root_of_txns(&block.txns).map(|node| node.val) != Some(block.merkle_hash.clone())
        {
            return Err(BlockValidationError::Invalid(
                "merkle hash invalid".to_string(),
            ));
        }

        if block.timestamp <= self.median_time_past(11) {
            return Err(BlockValidationError::Invalid(
                "timestamp too old".to_string(),
            ));
        }

        let chain_idx = if block.prev_block_hash == GENESIS_PREV_BLOCK_HASH
            && self.active_chain.is_empty()
        {
            // this is the genesis block
            ACTIVE_CHAIN_IDX
        } else {
            let Some((prev_height, prev_chain_idx)) = self.locate_block(&block.prev_block_hash)
            else {
                return Err(BlockValidationError::Orphan(Box::new(block.clone())));
            };
            if prev_chain_idx != ACTIVE_CHAIN_IDX {
                // extends a side branch; the reorg machinery re-validates
                return Ok(prev_chain_idx);
            }
            if prev_height != self.active_chain.len() - 1 {
                // forks off a non-tip active block into a new branch
                return Ok(self.side_branches.len() + 1);
            }
            ACTIVE_CHAIN_IDX
        };

        if self.next_work_required(&block.prev_block_hash) != Some(block.bits) {
            return Err(BlockValidationError::Invalid(
                "bits is incorrect".to_string(),
            ));
        }

        for txn in block.txns.iter().skip(1) {
            self.validate_txn(txn, Some(&block.txns[1..]), false, false)
                .map_err(|err| {
                    BlockValidationError::Invalid(format!(
                        "transaction {} failed to validate: {err}",
                        txn.id()
                    ))
                })?;
        }

        Ok(chain_idx)
    }
}
