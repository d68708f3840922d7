use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::sha256d;
use crate::error::MiningError;
use crate::merkle::get_merkle_root_of_txns;
use crate::types::Transaction;
use crate::{Hash, MAX_BLOCK_SERIALIZED_SIZE};

/// Sentinel for the genesis block's missing parent; it participates in the
/// header string exactly like a real hash would.
pub const GENESIS_PREV_BLOCK_HASH: &str = "None";

/// A sealed block. Never mutated after construction: assembly goes through
/// [`BlockBuilder`] and the nonce search produces a fresh `Block` per
/// solution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct Block {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_hash: Hash,
    /// unix seconds
    pub timestamp: u32,
    /// difficulty: the block id must be below `2^(256 - bits)`
    pub bits: u32,
    pub nonce: u64,
    pub txns: Vec<Transaction>,
}

impl Block {
    /// The string hashed during the nonce search.
    pub fn header_with_nonce(&self, nonce: u64) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.version, self.prev_block_hash, self.merkle_hash, self.timestamp, self.bits, nonce
        )
    }

    pub fn header(&self) -> String {
        self.header_with_nonce(self.nonce)
    }

    pub fn id(&self) -> Hash {
        sha256d(self.header().as_bytes())
    }

    pub fn serialized_len(&self) -> usize {
        codec::serialize(self).len()
    }
}

/// Two-phase assembly: collect header fields and transactions, then `seal`
/// computes the merkle commitment and enforces the size bound.
#[derive(Clone, Debug, Default)]
pub struct BlockBuilder {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u64,
    pub txns: Vec<Transaction>,
}

impl BlockBuilder {
    pub fn prev_block_hash(mut self, prev_block_hash: Hash) -> Self {
        self.prev_block_hash = prev_block_hash;
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    pub fn txns(mut self, txns: Vec<Transaction>) -> Self {
        self.txns = txns;
        self
    }

    pub fn prepend_coinbase(mut self, coinbase: Transaction) -> Self {
        self.txns.insert(0, coinbase);
        self
    }

    pub fn seal(self) -> Result<Block, MiningError> {
        let merkle = get_merkle_root_of_txns(&self.txns).ok_or(MiningError::Empty)?;
        let block = Block {
            version: self.version,
            prev_block_hash: self.prev_block_hash,
            merkle_hash: merkle.val,
            timestamp: self.timestamp,
            bits: self.bits,
            nonce: self.nonce,
            txns: self.txns,
        };
        if block.serialized_len() > MAX_BLOCK_SERIALIZED_SIZE {
            return Err(MiningError::Oversize);
        }
        Ok(block)
    }
}
