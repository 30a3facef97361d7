//! Core blockchain functionality
//!
//! This module contains the chain engine: blocks and their hashing,
//! difficulty retargeting, proof-of-work search, validation and the
//! accumulated-work fork-choice rule.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod proof_of_work;
pub mod validation;

pub use block::Block;
pub use blockchain::{accumulated_difficulty, Blockchain, ReplaceOutcome};
pub use difficulty::{
    DifficultyAdjustment, BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL,
};
pub use proof_of_work::{BlockTemplate, ProofOfWork};
pub use validation::{
    is_valid_chain, is_valid_genesis, is_valid_new_block, validate_chain, validate_new_block,
    TIMESTAMP_TOLERANCE,
};
