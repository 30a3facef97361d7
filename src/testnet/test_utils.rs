//! Test utilities for chain and network testing

use crate::core::{Block, BlockTemplate, ProofOfWork};
use serde_json::json;

/// An unmined block with a placeholder link, for difficulty arithmetic
pub fn block_at(index: u64, timestamp: i64, difficulty: u32) -> Block {
    Block::new(
        index,
        "test_prev_hash".to_string(),
        timestamp,
        json!({ "index": index }),
        difficulty,
        0,
        None,
    )
}

/// Mine a valid successor of `previous` with the given timestamp
pub fn mine_next(previous: &Block, timestamp: i64, difficulty: u32) -> Block {
    ProofOfWork::mine(&BlockTemplate {
        index: previous.get_index() + 1,
        previous_hash: previous.get_hash().to_string(),
        timestamp,
        data: json!({ "message": format!("block {}", previous.get_index() + 1) }),
        difficulty,
    })
}

/// Genesis plus `count` mined blocks, one second apart starting at `start`
pub fn mine_chain(count: u64, start: i64, difficulty: u32) -> Vec<Block> {
    let mut chain = vec![Block::genesis()];
    for offset in 0..count {
        let previous = &chain[chain.len() - 1];
        let block = mine_next(previous, start + offset as i64, difficulty);
        chain.push(block);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validate_chain;

    #[test]
    fn test_mine_chain_is_valid() {
        let chain = mine_chain(3, 1_700_000_000, 1);
        assert_eq!(chain.len(), 4);
        assert!(validate_chain(&chain, 1_700_000_010).is_ok());
    }
}
