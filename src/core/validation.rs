//! Block and chain validation
//!
//! Every check here is a rejection, never a fatal error: callers treat an
//! `Err` as "this block is invalid" and carry on.

use crate::core::{Block, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use log::{debug, warn};

/// Allowed clock drift between a block, its predecessor and the local clock
pub const TIMESTAMP_TOLERANCE: i64 = 60;

/// Validate `new_block` as the successor of `previous_block` at time `now`
pub fn validate_new_block(new_block: &Block, previous_block: &Block, now: i64) -> Result<()> {
    if previous_block.get_index() + 1 != new_block.get_index() {
        return Err(BlockchainError::InvalidBlock(format!(
            "index {} does not follow {}",
            new_block.get_index(),
            previous_block.get_index()
        )));
    }

    if previous_block.get_hash() != new_block.get_previous_hash() {
        return Err(BlockchainError::InvalidBlock(format!(
            "block {} has wrong previous hash",
            new_block.get_index()
        )));
    }

    if new_block.get_hash() != new_block.calculate_hash_for_block() {
        return Err(BlockchainError::InvalidBlock(format!(
            "block {} has wrong hash {}",
            new_block.get_index(),
            new_block.get_hash()
        )));
    }

    if !is_valid_timestamp(new_block, previous_block, now) {
        return Err(BlockchainError::InvalidBlock(format!(
            "block {} has timestamp {} outside the tolerance window",
            new_block.get_index(),
            new_block.get_timestamp()
        )));
    }

    if !ProofOfWork::validate(new_block) {
        return Err(BlockchainError::InvalidBlock(format!(
            "block {} hash does not satisfy difficulty {}",
            new_block.get_index(),
            new_block.get_difficulty()
        )));
    }

    Ok(())
}

/// Wall-clock form of `validate_new_block`
pub fn is_valid_new_block(new_block: &Block, previous_block: &Block) -> bool {
    let now = match current_timestamp() {
        Ok(now) => now,
        Err(e) => {
            warn!(target: "blockchain", "Cannot read the clock: {e}");
            return false;
        }
    };

    match validate_new_block(new_block, previous_block, now) {
        Ok(()) => true,
        Err(e) => {
            debug!(target: "blockchain", "Rejected block: {e}");
            false
        }
    }
}

pub fn is_valid_timestamp(new_block: &Block, previous_block: &Block, now: i64) -> bool {
    previous_block.get_timestamp() - TIMESTAMP_TOLERANCE < new_block.get_timestamp()
        && new_block.get_timestamp() - TIMESTAMP_TOLERANCE < now
}

/// Genesis blocks must match ours byte for byte in canonical JSON
pub fn is_valid_genesis(block: &Block) -> bool {
    match (block.to_canonical_json(), Block::genesis().to_canonical_json()) {
        (Ok(candidate), Ok(genesis)) => candidate == genesis,
        _ => false,
    }
}

/// Validate a whole chain, stopping at the first bad block
pub fn validate_chain(blocks: &[Block], now: i64) -> Result<()> {
    let genesis = blocks
        .first()
        .ok_or_else(|| BlockchainError::InvalidBlock("empty chain".to_string()))?;

    if !is_valid_genesis(genesis) {
        return Err(BlockchainError::InvalidBlock(
            "invalid genesis block".to_string(),
        ));
    }

    for pair in blocks.windows(2) {
        validate_new_block(&pair[1], &pair[0], now)?;
    }

    Ok(())
}

pub fn is_valid_chain(blocks: &[Block]) -> bool {
    let result = current_timestamp().and_then(|now| validate_chain(blocks, now));
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(target: "blockchain", "Rejected chain: {e}");
            false
        }
    }
}
