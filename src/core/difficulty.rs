use crate::core::Block;
use log::info;

// Difficulty adjustment constants
pub const BLOCK_GENERATION_INTERVAL: i64 = 10; // Expected seconds between blocks
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10; // Retarget every 10 blocks

/// Difficulty retargeting for maintaining consistent block times
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Difficulty the next block on `chain` must declare
    pub fn get_difficulty(chain: &[Block]) -> u32 {
        let latest = match chain.last() {
            Some(block) => block,
            None => return Block::genesis().get_difficulty(),
        };

        if latest.get_index() % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 && latest.get_index() != 0 {
            Self::get_adjusted_difficulty(latest, chain)
        } else {
            latest.get_difficulty()
        }
    }

    /// Retarget against the block that opened the current adjustment window
    pub fn get_adjusted_difficulty(latest: &Block, chain: &[Block]) -> u32 {
        let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
        let prev_adjustment = match chain.len().checked_sub(interval) {
            Some(position) => &chain[position],
            None => return latest.get_difficulty(),
        };

        let time_expected = Self::get_time_expected();
        let time_taken = latest.get_timestamp() - prev_adjustment.get_timestamp();
        let base = prev_adjustment.get_difficulty();

        let new_difficulty = if time_taken < time_expected / 2 {
            base.saturating_add(1)
        } else if time_taken > time_expected * 2 {
            // Never below zero: difficulty counts leading zero bits
            base.saturating_sub(1)
        } else {
            base
        };

        info!(
            target: "blockchain",
            "Difficulty adjustment at index {}: {base} -> {new_difficulty} (taken: {time_taken}s, expected: {time_expected}s)",
            latest.get_index()
        );

        new_difficulty
    }

    /// Seconds a full adjustment window should take
    pub fn get_time_expected() -> i64 {
        BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64
    }
}
