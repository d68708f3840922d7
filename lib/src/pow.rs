use crate::chain::{ChainState, ACTIVE_CHAIN_IDX};
use crate::types::block::GENESIS_PREV_BLOCK_HASH;
use crate::{BELUSHIS_PER_COIN, HALVE_SUBSIDY_AFTER_BLOCKS, U256};

/// The acceptance target for a difficulty: `2^(256 - bits)`.
pub fn bits_to_target(bits: u32) -> U256 {
    if bits == 0 {
        U256::MAX
    } else if bits >= 256 {
        U256::zero()
    } else {
        U256::one() << (256 - bits as usize)
    }
}

/// Interpret a 64-hex block id as a big-endian 256-bit integer and test it
/// against the target for `bits`.
pub fn block_id_meets_bits(block_id: &str, bits: u32) -> bool {
    let Ok(bytes) = hex::decode(block_id) else {
        return false;
    };
    if bytes.len() != 32 {
        return false;
    }
    U256::from_big_endian(&bytes) < bits_to_target(bits)
}

/// Coinbase subsidy at a height: 50 coins, halving on a fixed schedule.
pub fn get_block_subsidy(height: u32) -> u64 {
    let halvings = height as u64 / HALVE_SUBSIDY_AFTER_BLOCKS;
    if halvings >= 64 {
        return 0;
    }
    (50 * BELUSHIS_PER_COIN) >> halvings
}

impl ChainState {
    /// Difficulty for the block that would follow `prev_block_hash`.
    /// Between retarget boundaries the previous difficulty carries over;
    /// at a boundary the period's wall time nudges `bits` one step harder
    /// or easier. `None` when the parent cannot be found.
    pub fn next_work_required(&self, prev_block_hash: &str) -> Option<u32> {
        if prev_block_hash == GENESIS_PREV_BLOCK_HASH {
            return Some(self.params.initial_difficulty_bits);
        }

        let (prev_height, prev_chain_idx) = self.locate_block(prev_block_hash)?;
        let prev_block = if prev_chain_idx == ACTIVE_CHAIN_IDX {
            self.active_chain.get(prev_height)?
        } else {
            self.side_branches.get(prev_chain_idx - 1)?.get(prev_height)?
        };

        if (prev_height + 1) % self.params.period_in_blocks != 0 {
            return Some(prev_block.bits);
        }

        let period_start =
            prev_height.saturating_sub(self.params.period_in_blocks - 1);
        let actual_time_taken = (prev_block.timestamp as u64)
            .saturating_sub(self.active_chain[period_start].timestamp as u64);

        let bits = if actual_time_taken < self.params.difficulty_period_target {
            // period was too short; grind harder
            prev_block.bits + 1
        } else if actual_time_taken > self.params.difficulty_period_target {
            prev_block.bits.saturating_sub(1)
        } else {
            prev_block.bits
        };
        Some(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::genesis_block;

    #[test]
    fn target_is_a_single_shifted_bit() {
        assert_eq!(bits_to_target(255), U256::one() << 1);
        assert!(bits_to_target(24) > bits_to_target(25));
        assert_eq!(bits_to_target(256), U256::zero());
        assert_eq!(bits_to_target(0), U256::MAX);
    }

    #[test]
    fn every_id_meets_trivial_bits_and_none_meets_impossible_bits() {
        let id = "ff".repeat(32);
        assert!(!block_id_meets_bits(&id, 1));
        let low = format!("00{}", "ff".repeat(31));
        assert!(block_id_meets_bits(&low, 8));
        assert!(!block_id_meets_bits(&low, 9));
        assert!(!block_id_meets_bits("zz", 1));
    }

    #[test]
    fn subsidy_halves_on_schedule() {
        assert_eq!(get_block_subsidy(0), 50 * BELUSHIS_PER_COIN);
        assert_eq!(get_block_subsidy(209_999), 50 * BELUSHIS_PER_COIN);
        assert_eq!(get_block_subsidy(210_000), 25 * BELUSHIS_PER_COIN);
        assert_eq!(get_block_subsidy(420_000), 12 * BELUSHIS_PER_COIN + 50_000_000);
        // 64 halvings exhaust the subsidy entirely
        assert_eq!(get_block_subsidy(u32::MAX), 0);
    }

    #[test]
    fn work_required_for_genesis_child_is_the_initial_difficulty() {
        let chain = ChainState::new();
        assert_eq!(
            chain.next_work_required(GENESIS_PREV_BLOCK_HASH),
            Some(chain.params.initial_difficulty_bits)
        );
        assert_eq!(
            chain.next_work_required(&genesis_block().id()),
            Some(genesis_block().bits)
        );
        assert_eq!(chain.next_work_required("unknown"), None);
    }
}
