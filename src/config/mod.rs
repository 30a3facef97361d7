//! Configuration management
//!
//! This module handles the node's listen address, dial timeout and sync
//! behaviour. The configuration is passed to the node explicitly.

pub mod settings;

pub use settings::Config;
