use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use log::{debug, info, warn};

use crate::chain::ChainState;
use crate::crypto::sha256d;
use crate::error::MiningError;
use crate::pow::{self, bits_to_target};
use crate::types::{Block, BlockBuilder, Transaction};
use crate::U256;

/// Cooperative cancellation for the nonce search. Any chain mutation that
/// moves the active tip sets it; the worker polls it between batches of
/// hashes and abandons the now-stale block.
#[derive(Debug)]
pub struct MineInterrupt(AtomicBool);

impl MineInterrupt {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Process-wide interrupt shared between the chain engine and the miner.
pub static MINE_INTERRUPT: MineInterrupt = MineInterrupt::new();

/// Build a block on the current tip: pending transactions (or the given
/// ones), a coinbase paying subsidy plus fees to `pay_to`, difficulty from
/// the retarget schedule.
pub fn assemble_block(
    chain: &ChainState,
    pay_to: &str,
    txns: Option<Vec<Transaction>>,
) -> Result<Block, MiningError> {
    let prev_block_hash = chain.tip().id();
    let bits = chain
        .next_work_required(&prev_block_hash)
        .ok_or(MiningError::UnknownParent)?;

    // merkle stays empty until the final seal; selection only needs the
    // header fields and the running size
    let base = Block {
        version: 0,
        prev_block_hash,
        merkle_hash: String::new(),
        timestamp: Utc::now().timestamp() as u32,
        bits,
        nonce: 0,
        txns: vec![],
    };
    let base = match txns {
        Some(txns) => Block { txns, ..base },
        None => chain.select_from_mempool(&base),
    };

    let fees = calculate_fees(chain, &base);
    let height = chain.active_chain.len() as u32;
    let coinbase =
        Transaction::create_coinbase(pay_to, pow::get_block_subsidy(height) + fees, height);

    BlockBuilder {
        version: base.version,
        prev_block_hash: base.prev_block_hash,
        timestamp: base.timestamp,
        bits: base.bits,
        nonce: base.nonce,
        txns: base.txns,
    }
    .prepend_coinbase(coinbase)
    .seal()
}

/// Total fees offered by a block's transactions: inputs resolved against
/// the UTXO set or sibling outputs, minus outputs.
pub fn calculate_fees(chain: &ChainState, block: &Block) -> u64 {
    let mut fee = 0u64;

    for txn in &block.txns {
        let mut spent = 0u64;
        let mut resolved = true;
        for txin in &txn.txins {
            let Some(to_spend) = &txin.to_spend else {
                resolved = false;
                break;
            };
            let value = chain
                .utxo_set
                .get(to_spend)
                .map(|utxo| utxo.value)
                .or_else(|| {
                    block
                        .txns
                        .iter()
                        .find(|sibling| sibling.id() == to_spend.txid)
                        .and_then(|sibling| sibling.txouts.get(to_spend.txout_idx as usize))
                        .map(|txout| txout.value)
                });
            match value {
                Some(value) => spent += value,
                None => {
                    warn!("could not resolve {to_spend:?} while computing fees");
                    resolved = false;
                    break;
                }
            }
        }
        if !resolved {
            continue;
        }
        let sent: u64 = txn.txouts.iter().map(|txout| txout.value).sum();
        fee += spent.saturating_sub(sent);
    }
    fee
}

/// Brute-force the nonce until the block id drops under the target.
/// Returns `None` when interrupted; the caller reassembles on the new tip.
pub fn mine(block: &Block, interrupt: &MineInterrupt) -> Option<Block> {
    let target = bits_to_target(block.bits);
    let start = Utc::now().timestamp();
    let mut nonce: u64 = 0;

    loop {
        if nonce % 10_000 == 0 && interrupt.is_set() {
            info!("mining interrupted");
            return None;
        }
        let id = sha256d(block.header_with_nonce(nonce).as_bytes());
        if id_below_target(&id, &target) {
            let mined = Block {
                nonce,
                ..block.clone()
            };
            let elapsed = (Utc::now().timestamp() - start).max(1);
            info!(
                "block found! {}s, id {}, {} nonces tried",
                elapsed,
                mined.id(),
                nonce
            );
            return Some(mined);
        }
        nonce = nonce.wrapping_add(1);
    }
}

fn id_below_target(block_id: &str, target: &U256) -> bool {
    match hex::decode(block_id) {
        Ok(bytes) if bytes.len() == 32 => U256::from_big_endian(&bytes) < *target,
        _ => {
            debug!("unhashable block id {block_id}");
            false
        }
    }
}
