//! Chain synchronization decisions
//!
//! [`decide`] looks at a `BLOCK_CHAIN` payload and the local tip and says
//! what to do about it. It performs no I/O; the node carries the decision out.

use crate::core::Block;
use serde_json::Value;

/// Why a payload was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The payload carried no blocks
    Empty,
    /// A block in the payload could not be decoded
    MalformedBlock,
    /// The peer's tip is not ahead of ours
    NotAhead,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
    Ignore(IgnoreReason),
    /// The received tip directly extends our tip
    Append(Block),
    /// A single block we cannot link: ask peers for their whole chain
    RequestFullChain,
    /// A longer history that forks from ours: try the fork-choice rule
    AttemptReplace(Vec<Block>),
}

/// What the node ended up doing with a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Ignored(IgnoreReason),
    Appended,
    RequestedFullChain,
    Replaced,
    /// An append or replacement failed validation or carried too little work
    Rejected,
}

pub fn decide(received: &[Value], local_latest: &Block) -> SyncDecision {
    let last_value = match received.last() {
        Some(value) => value,
        None => return SyncDecision::Ignore(IgnoreReason::Empty),
    };

    if !Block::is_valid_structure(last_value) {
        return SyncDecision::Ignore(IgnoreReason::MalformedBlock);
    }

    let last_received = match Block::from_value(last_value.clone()) {
        Ok(block) => block,
        Err(_) => return SyncDecision::Ignore(IgnoreReason::MalformedBlock),
    };

    if last_received.get_index() <= local_latest.get_index() {
        return SyncDecision::Ignore(IgnoreReason::NotAhead);
    }

    if last_received.get_previous_hash() == local_latest.get_hash() {
        return SyncDecision::Append(last_received);
    }

    if received.len() == 1 {
        return SyncDecision::RequestFullChain;
    }

    let blocks: Result<Vec<Block>, _> = received.iter().cloned().map(Block::from_value).collect();
    match blocks {
        Ok(blocks) => SyncDecision::AttemptReplace(blocks),
        Err(_) => SyncDecision::Ignore(IgnoreReason::MalformedBlock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{mine_chain, mine_next};
    use serde_json::json;

    const START: i64 = 1_700_000_000;

    fn values(blocks: &[Block]) -> Vec<Value> {
        blocks.iter().map(|b| b.to_value().unwrap()).collect()
    }

    #[test]
    fn test_empty_payload_is_ignored() {
        assert_eq!(
            decide(&[], &Block::genesis()),
            SyncDecision::Ignore(IgnoreReason::Empty)
        );
    }

    #[test]
    fn test_malformed_last_block_is_ignored() {
        let payload = vec![json!({"index": 5, "hash": "ab"})];
        assert_eq!(
            decide(&payload, &Block::genesis()),
            SyncDecision::Ignore(IgnoreReason::MalformedBlock)
        );

        let mut bad_types = mine_chain(1, START, 0)[1].to_value().unwrap();
        bad_types["nonce"] = json!("zero");
        assert_eq!(
            decide(&[bad_types], &Block::genesis()),
            SyncDecision::Ignore(IgnoreReason::MalformedBlock)
        );
    }

    #[test]
    fn test_peer_behind_or_equal_is_ignored() {
        let chain = mine_chain(2, START, 0);
        let local = &chain[2];
        assert_eq!(
            decide(&values(&chain[1..2]), local),
            SyncDecision::Ignore(IgnoreReason::NotAhead)
        );
        assert_eq!(
            decide(&values(&chain[2..3]), local),
            SyncDecision::Ignore(IgnoreReason::NotAhead)
        );
    }

    #[test]
    fn test_linked_tip_is_appended() {
        let chain = mine_chain(1, START, 0);
        let b2 = mine_next(&chain[1], START + 5, 0);
        assert_eq!(
            decide(&values(&[b2.clone()]), &chain[1]),
            SyncDecision::Append(b2)
        );
    }

    #[test]
    fn test_unlinked_single_block_requests_full_chain() {
        let ours = mine_chain(1, START, 0);
        let theirs = mine_chain(2, START + 100, 0);
        // Their block 2 follows their block 1, not ours
        assert_eq!(
            decide(&values(&theirs[2..]), &ours[1]),
            SyncDecision::RequestFullChain
        );
    }

    #[test]
    fn test_unlinked_history_attempts_replace() {
        let ours = mine_chain(1, START, 0);
        let theirs = mine_chain(3, START + 100, 0);
        assert_eq!(
            decide(&values(&theirs), &ours[1]),
            SyncDecision::AttemptReplace(theirs)
        );
    }

    #[test]
    fn test_history_with_malformed_inner_block_is_ignored() {
        let ours = mine_chain(1, START, 0);
        let theirs = mine_chain(3, START + 100, 0);
        let mut payload = values(&theirs);
        payload[1] = json!({"garbage": true});
        assert_eq!(
            decide(&payload, &ours[1]),
            SyncDecision::Ignore(IgnoreReason::MalformedBlock)
        );
    }
}
