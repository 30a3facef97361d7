use crate::core::Block;
use log::{debug, info};
use serde_json::Value;

/// How many nonces are tried between two cancellation checks
const STOP_POLL_INTERVAL: u64 = 1024;

const MAX_NONCE: u64 = u64::MAX;

/// Everything a block needs except its nonce and hash
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: Value,
    pub difficulty: u32,
}

pub struct ProofOfWork;

impl ProofOfWork {
    /// True when the hex digest starts with at least `difficulty` zero bits
    pub fn hash_matches_difficulty(hash: &str, difficulty: u32) -> bool {
        let mut remaining = difficulty;
        for character in hash.chars() {
            if remaining == 0 {
                return true;
            }
            let nibble = match character.to_digit(16) {
                Some(nibble) => nibble,
                None => return false,
            };
            let leading_zeros = if nibble == 0 {
                4
            } else {
                // A nibble sits in the low 4 bits of the u32
                nibble.leading_zeros() - 28
            };
            if leading_zeros >= remaining {
                return true;
            }
            if leading_zeros < 4 {
                return false;
            }
            remaining -= 4;
        }
        remaining == 0
    }

    /// Check that a block's own hash satisfies its declared difficulty
    pub fn validate(block: &Block) -> bool {
        Self::hash_matches_difficulty(block.get_hash(), block.get_difficulty())
    }

    /// Search nonces from zero until one satisfies the template's difficulty
    pub fn mine(template: &BlockTemplate) -> Block {
        let mut template = template.clone();
        loop {
            if let Some(block) = Self::find_block(&template, || false) {
                return block;
            }
            // Nonce space exhausted: a new timestamp gives a fresh search space
            template.timestamp += 1;
        }
    }

    /// Like `mine`, but gives up and returns `None` once `should_stop` says so
    pub fn find_block<F>(template: &BlockTemplate, should_stop: F) -> Option<Block>
    where
        F: Fn() -> bool,
    {
        info!(
            target: "miner",
            "Mining block {} with difficulty {}",
            template.index, template.difficulty
        );

        let mut nonce = 0;
        loop {
            if nonce % STOP_POLL_INTERVAL == 0 && should_stop() {
                info!(target: "miner", "Mining of block {} interrupted at nonce {nonce}", template.index);
                return None;
            }

            let hash = Block::calculate_hash(
                template.index,
                &template.previous_hash,
                template.timestamp,
                &template.data,
                template.difficulty,
                nonce,
            );
            if Self::hash_matches_difficulty(&hash, template.difficulty) {
                debug!(target: "miner", "Block {} found with nonce = {nonce}", template.index);
                return Some(Block::new(
                    template.index,
                    template.previous_hash.clone(),
                    template.timestamp,
                    template.data.clone(),
                    template.difficulty,
                    nonce,
                    Some(hash),
                ));
            }

            if nonce == MAX_NONCE {
                info!(target: "miner", "Nonce space exhausted for block {}", template.index);
                return None;
            }
            nonce += 1;
        }
    }
}
