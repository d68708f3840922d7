// maximum serialized block size in bytes
pub const MAX_BLOCK_SERIALIZED_SIZE: usize = 1_000_000;
// blocks a coinbase output must wait before it can be spent
pub const COINBASE_MATURITY: u32 = 2;
// accept blocks timestamped at most this many seconds into the future
pub const MAX_FUTURE_BLOCK_TIME: u32 = 60 * 60 * 2;
// the smallest unit of currency
pub const BELUSHIS_PER_COIN: u64 = 100_000_000;
pub const TOTAL_COINS: u64 = 21_000_000;
// the most money that can ever exist
pub const MAX_MONEY: u64 = BELUSHIS_PER_COIN * TOTAL_COINS;
// blocks between coinbase subsidy halvings
pub const HALVE_SUBSIDY_AFTER_BLOCKS: u64 = 210_000;

pub mod chain;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod merkle;
pub mod mining;
pub mod network;
pub mod pow;
pub mod types;
pub mod utxo;
pub mod validation;
pub mod wallet;

use serde::{Deserialize, Serialize};
use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

/// A 64-character lowercase hex rendering of a double-SHA-256 digest.
pub type Hash = String;
/// A base58check-encoded pay-to address.
pub type Address = String;

/// Difficulty schedule of a network. `mainnet` carries the production
/// values; tests run the same engine against low-difficulty schedules.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Params {
    /// seconds one block is expected to take
    pub time_between_blocks_target: u64,
    /// seconds one retarget period is expected to take
    pub difficulty_period_target: u64,
    /// blocks per retarget period
    pub period_in_blocks: usize,
    pub initial_difficulty_bits: u32,
}

impl Params {
    pub fn mainnet() -> Self {
        let time_between_blocks_target = 60;
        let difficulty_period_target = 60 * 60 * 10;
        Self {
            time_between_blocks_target,
            difficulty_period_target,
            period_in_blocks: (difficulty_period_target / time_between_blocks_target) as usize,
            initial_difficulty_bits: 24,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::mainnet()
    }
}
