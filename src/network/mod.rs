//! Peer-to-peer networking functionality
//!
//! This module handles communication between nodes and with operators:
//! framing and message decoding, the peer set, chain synchronization,
//! the mining worker and the two TCP listeners.

pub mod control;
pub mod framing;
pub mod message;
pub mod miner;
pub mod node;
pub mod peers;
pub mod server;
pub mod sync;

pub use framing::{write_frame, FrameDecoder, FrameReader, DELIMITER, MAX_FRAME_LEN};
pub use message::{Message, MALFORMED_REQUEST, UNKNOWN_COMMAND};
pub use miner::Miner;
pub use node::{Node, NodeHandle, NodeInfo, NodeState};
pub use peers::{PeerConnection, PeerSet};
pub use sync::{decide, IgnoreReason, SyncDecision, SyncOutcome};
