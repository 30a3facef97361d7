//! # Nodechain - A Minimal Proof-of-Work Node
//!
//! This is a single blockchain node: it keeps a chain in memory, mines blocks
//! on request, and agrees with its peers on the heaviest valid chain.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What It Does
//! - **Proof of Work**: SHA-256 block hashes with a leading-zero-bits target
//! - **Difficulty Retargeting**: every 10 blocks, aiming for one block per 10 seconds
//! - **Fork Choice**: the chain with the most accumulated work (sum of 2^difficulty) wins
//! - **Peer Sync**: `\r\n`-framed JSON messages over TCP
//! - **Control Port**: operators mine, add peers and inspect the chain on `port + 1`
//!
//! ## How I Organized My Code
//! - `core/`: blocks, difficulty, mining search, validation and the chain itself
//! - `network/`: framing, messages, peers, sync decisions, miner and both listeners
//! - `config/`: node settings from defaults, a TOML file and the environment
//! - `utils/`: hashing, timestamps and canonical JSON
//! - `cli/`: command-line arguments
//!
//! ## When I Need to Understand Something
//! 1. Start with `network/node.rs` to see how the shared state fits together
//! 2. Look at `network/sync.rs` for what happens when a peer sends blocks
//! 3. Check `core/blockchain.rs` for appending and replacing the chain
//! 4. Review `core/proof_of_work.rs` for the nonce search

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::Opt;
pub use config::Config;
pub use self::core::{
    accumulated_difficulty, Block, BlockTemplate, Blockchain, DifficultyAdjustment, ProofOfWork,
    ReplaceOutcome,
};
pub use error::{BlockchainError, Result};
pub use network::{Message, Node, NodeHandle, NodeInfo, NodeState};
pub use utils::{canonical_json, current_timestamp, sha256_digest, sha256_hex};
