//! Test helpers for building blocks and chains
//!
//! Chains built here use small difficulties so tests mine instantly.

pub mod test_utils;

pub use test_utils::*;
