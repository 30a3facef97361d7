//! Utility functions and helpers
//!
//! This module contains the hashing, clock and canonical JSON helpers
//! used throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest, sha256_hex};

pub use serialization::{canonical_json, to_canonical_json};
