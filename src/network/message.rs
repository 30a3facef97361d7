//! Wire messages shared by the peer and control protocols
//!
//! Every frame is a JSON object `{"type": <int>, "data": <value>}`. Frames
//! are decoded once into [`Message`] and matched exhaustively by the
//! transports.

use crate::error::{BlockchainError, Result};
use crate::network::framing::DELIMITER;
use serde_json::{json, Value};

// Peer protocol
pub const LATEST_BLOCK: i64 = 0;
pub const ALL_BLOCKS: i64 = 1;
pub const BLOCK_CHAIN: i64 = 2;

// Control protocol
pub const MINE: i64 = 3;
pub const ADD_PEER: i64 = 4;
pub const GET_LAST_BLOCK: i64 = 5;
pub const GET_BLOCKCHAIN: i64 = 6;
pub const GET_INFO: i64 = 7;

/// Reply sent for a well-formed frame with an unsupported type
pub const UNKNOWN_COMMAND: &str = "unknown command";
/// Reply sent for a frame without `type`/`data` or with bad `data`
pub const MALFORMED_REQUEST: &str = "malformed request";

const ASKING_FOR_CHAINS: &str = "ASKING_FOR_CHAINS";

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Ask a peer for its latest block
    QueryLatest,
    /// Ask a peer for its whole chain
    QueryAll,
    /// One or more raw blocks; validated by the sync state machine
    ResponseBlockchain(Vec<Value>),
    /// Mine a block carrying this payload
    Mine(Value),
    /// Connect to the peer at `host:port`
    AddPeer(String),
    GetLastBlock,
    GetBlockchain,
    GetInfo,
    /// A well-formed frame whose type we do not know
    Unknown(i64),
}

impl Message {
    /// Decode one frame.
    ///
    /// Text that is not JSON yields `BlockchainError::Serialization`; JSON
    /// that lacks `type`/`data` or carries the wrong `data` shape yields
    /// `BlockchainError::Protocol`.
    pub fn decode(frame: &str) -> Result<Message> {
        let value: Value = serde_json::from_str(frame)?;

        let object = value
            .as_object()
            .ok_or_else(|| BlockchainError::Protocol("message is not an object".to_string()))?;
        let message_type = object
            .get("type")
            .and_then(Value::as_i64)
            .ok_or_else(|| BlockchainError::Protocol("missing or invalid type".to_string()))?;
        let data = match object.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => return Err(BlockchainError::Protocol("missing data".to_string())),
        };

        let message = match message_type {
            LATEST_BLOCK => Message::QueryLatest,
            ALL_BLOCKS => Message::QueryAll,
            BLOCK_CHAIN => match data {
                Value::Array(blocks) => Message::ResponseBlockchain(blocks),
                _ => {
                    return Err(BlockchainError::Protocol(
                        "blockchain data must be an array".to_string(),
                    ))
                }
            },
            MINE => Message::Mine(data),
            ADD_PEER => match data {
                Value::String(addr) => Message::AddPeer(addr),
                _ => {
                    return Err(BlockchainError::Protocol(
                        "peer address must be a string".to_string(),
                    ))
                }
            },
            GET_LAST_BLOCK => Message::GetLastBlock,
            GET_BLOCKCHAIN => Message::GetBlockchain,
            GET_INFO => Message::GetInfo,
            other => Message::Unknown(other),
        };

        Ok(message)
    }

    pub fn message_type(&self) -> i64 {
        match self {
            Message::QueryLatest => LATEST_BLOCK,
            Message::QueryAll => ALL_BLOCKS,
            Message::ResponseBlockchain(_) => BLOCK_CHAIN,
            Message::Mine(_) => MINE,
            Message::AddPeer(_) => ADD_PEER,
            Message::GetLastBlock => GET_LAST_BLOCK,
            Message::GetBlockchain => GET_BLOCKCHAIN,
            Message::GetInfo => GET_INFO,
            Message::Unknown(message_type) => *message_type,
        }
    }

    pub fn to_value(&self) -> Value {
        let data = match self {
            Message::QueryAll => json!(ASKING_FOR_CHAINS),
            Message::ResponseBlockchain(blocks) => Value::Array(blocks.clone()),
            Message::Mine(data) => data.clone(),
            Message::AddPeer(addr) => json!(addr),
            Message::QueryLatest
            | Message::GetLastBlock
            | Message::GetBlockchain
            | Message::GetInfo
            | Message::Unknown(_) => json!(""),
        };
        json!({ "type": self.message_type(), "data": data })
    }

    /// JSON text plus the frame delimiter
    pub fn to_frame(&self) -> String {
        format!("{}{DELIMITER}", self.to_value())
    }
}
