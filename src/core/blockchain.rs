// This is the chain engine - the in-memory chain plus the fork-choice rule
// The chain always starts at the fixed genesis block and only grows through
// validated appends or a wholesale swap for a heavier valid chain

use crate::core::validation::{is_valid_chain, is_valid_new_block};
use crate::core::{Block, BlockTemplate, DifficultyAdjustment, ProofOfWork};
use crate::error::Result;
use crate::utils::current_timestamp;
use log::{info, warn};
use num_bigint::BigUint;
use serde_json::Value;

/// What happened to a candidate chain offered to `replace_chain`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The candidate was valid and heavier; it is now the local chain
    Replaced,
    /// The candidate failed validation
    InvalidChain,
    /// The candidate was valid but carried no more work than ours
    NotHeavier,
}

/// Total work of a chain: the sum of 2^difficulty over its blocks
pub fn accumulated_difficulty(chain: &[Block]) -> BigUint {
    chain
        .iter()
        .map(|block| BigUint::from(1u8) << block.get_difficulty() as usize)
        .sum()
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    // Every node starts from the same genesis block
    pub fn new() -> Blockchain {
        Blockchain {
            blocks: vec![Block::genesis()],
        }
    }

    pub fn get_blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn get_genesis_block(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn get_latest_block(&self) -> &Block {
        // The chain is never empty: it starts with genesis and replacements are validated
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_difficulty(&self) -> u32 {
        DifficultyAdjustment::get_difficulty(&self.blocks)
    }

    pub fn get_accumulated_difficulty(&self) -> BigUint {
        accumulated_difficulty(&self.blocks)
    }

    /// Template for the block that would extend the current tip
    pub fn next_block_template(&self, data: Value) -> Result<BlockTemplate> {
        let previous_block = self.get_latest_block();
        Ok(BlockTemplate {
            index: previous_block.get_index() + 1,
            previous_hash: previous_block.get_hash().to_string(),
            timestamp: current_timestamp()?,
            data,
            difficulty: self.get_difficulty(),
        })
    }

    // When I want to mine and append in one go (blocks the calling thread)
    pub fn generate_next_block(&mut self, data: Value) -> Result<Option<Block>> {
        let template = self.next_block_template(data)?;
        let block = ProofOfWork::mine(&template);
        if self.add_block(block.clone()) {
            Ok(Some(block))
        } else {
            Ok(None)
        }
    }

    /// Append a block if it validly extends the tip
    pub fn add_block(&mut self, block: Block) -> bool {
        if is_valid_new_block(&block, self.get_latest_block()) {
            info!(
                target: "blockchain",
                "Added block {} ({})",
                block.get_index(),
                block.get_hash()
            );
            self.blocks.push(block);
            true
        } else {
            warn!(
                target: "blockchain",
                "Refused block {} ({})",
                block.get_index(),
                block.get_hash()
            );
            false
        }
    }

    /// Swap in `candidate` only if it is valid and carries strictly more work
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> ReplaceOutcome {
        if !is_valid_chain(&candidate) {
            warn!(target: "blockchain", "Received an invalid blockchain");
            return ReplaceOutcome::InvalidChain;
        }

        let candidate_work = accumulated_difficulty(&candidate);
        let local_work = self.get_accumulated_difficulty();
        if candidate_work <= local_work {
            info!(
                target: "blockchain",
                "Kept local chain: candidate work {candidate_work} <= local work {local_work}"
            );
            return ReplaceOutcome::NotHeavier;
        }

        info!(
            target: "blockchain",
            "Replaced current blockchain: {} blocks -> {} blocks (work {local_work} -> {candidate_work})",
            self.blocks.len(),
            candidate.len()
        );
        self.blocks = candidate;
        ReplaceOutcome::Replaced
    }
}
