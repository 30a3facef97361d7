use crate::error::{BlockchainError, Result};
use crate::utils::{canonical_json, sha256_hex, to_canonical_json};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const GENESIS_MESSAGE: &str = "This is the first block!";

/// Fields a peer-supplied block must carry before it is decoded
const REQUIRED_FIELDS: [&str; 7] = [
    "index",
    "hash",
    "previous_hash",
    "timestamp",
    "data",
    "difficulty",
    "nonce",
];

/// The genesis block every honest node starts from
static GENESIS_BLOCK: Lazy<Block> = Lazy::new(|| {
    Block::new(
        0,
        String::new(),
        0,
        json!({ "message": GENESIS_MESSAGE }),
        0,
        0,
        None,
    )
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    hash: String,
    previous_hash: String,
    timestamp: i64,
    data: Value,
    difficulty: u32,
    nonce: u64,
}

impl Block {
    /// Build a block. A supplied hash is kept as-is (peer blocks are checked
    /// by the validator); without one the hash is computed from the fields.
    pub fn new(
        index: u64,
        previous_hash: String,
        timestamp: i64,
        data: Value,
        difficulty: u32,
        nonce: u64,
        hash: Option<String>,
    ) -> Block {
        let hash = hash.unwrap_or_else(|| {
            Self::calculate_hash(index, &previous_hash, timestamp, &data, difficulty, nonce)
        });

        Block {
            index,
            hash,
            previous_hash,
            timestamp,
            data,
            difficulty,
            nonce,
        }
    }

    pub fn genesis() -> Block {
        GENESIS_BLOCK.clone()
    }

    pub fn calculate_hash(
        index: u64,
        previous_hash: &str,
        timestamp: i64,
        data: &Value,
        difficulty: u32,
        nonce: u64,
    ) -> String {
        let preimage = format!(
            "{index}{previous_hash}{timestamp}{}{difficulty}{nonce}",
            canonical_json(data)
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Recompute the hash from this block's own fields
    pub fn calculate_hash_for_block(&self) -> String {
        Self::calculate_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.difficulty,
            self.nonce,
        )
    }

    /// Check that a raw JSON value carries every block field
    pub fn is_valid_structure(value: &Value) -> bool {
        match value.as_object() {
            Some(object) => REQUIRED_FIELDS
                .iter()
                .all(|field| object.get(*field).is_some_and(|v| !v.is_null())),
            None => false,
        }
    }

    /// Decode a peer-supplied JSON value, trusting its hash
    pub fn from_value(value: Value) -> Result<Block> {
        if !Self::is_valid_structure(&value) {
            return Err(BlockchainError::Serialization(
                "Block is missing required fields".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| BlockchainError::Serialization(format!("Invalid block: {e}")))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Sorted-key JSON text of the whole block
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_data(&self) -> &Value {
        &self.data
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }
}
