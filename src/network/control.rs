//! Control protocol transport
//!
//! Operators drive the node here: queue a block, add a peer, read the chain.
//! Control connections are never added to the peer set.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::network::framing::{write_frame, FrameReader};
use crate::network::message::{MALFORMED_REQUEST, UNKNOWN_COMMAND};
use crate::network::{Message, Node};
use log::{error, info, warn};
use serde_json::Value;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;

/// Accept control connections until the listener fails
pub fn run(node: Node, listener: TcpListener) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let client_addr = match stream.peer_addr() {
                    Ok(addr) => addr,
                    Err(e) => {
                        error!(target: "control", "Failed to get client address: {e}");
                        continue;
                    }
                };

                let node = node.clone();
                let spawned = thread::Builder::new()
                    .name(format!("control-{client_addr}"))
                    .spawn(move || handle_connection(&node, stream, client_addr));
                if let Err(e) = spawned {
                    error!(target: "control", "Failed to spawn handler for {client_addr}: {e}");
                }
            }
            Err(e) => {
                error!(target: "control", "Error accepting connection: {e}");
            }
        }
    }
}

fn handle_connection(node: &Node, stream: TcpStream, client_addr: SocketAddr) {
    info!(target: "control", "Control client connected: {client_addr}");

    let timeout = node.state().config().write_timeout();
    let mut writer = match stream
        .try_clone()
        .and_then(|writer| writer.set_write_timeout(Some(timeout)).map(|_| writer))
    {
        Ok(writer) => writer,
        Err(e) => {
            error!(target: "control", "Failed to prepare stream for {client_addr}: {e}");
            return;
        }
    };
    let mut frames = FrameReader::new(&stream);

    loop {
        let reply = match frames.next_frame() {
            Ok(Some(frame)) => process_frame(node, &frame),
            Ok(None) => break,
            Err(BlockchainError::Serialization(e)) => {
                warn!(target: "control", "Undecodable frame from {client_addr}: {e}");
                Some(MALFORMED_REQUEST.to_string())
            }
            Err(e) => {
                warn!(target: "control", "Closing control connection {client_addr}: {e}");
                break;
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = write_frame(&mut writer, &reply) {
                warn!(target: "control", "Failed to reply to {client_addr}: {e}");
                break;
            }
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    info!(target: "control", "Control client disconnected: {client_addr}");
}

/// Handle one control frame and return the reply text, if any
fn process_frame(node: &Node, frame: &str) -> Option<String> {
    let message = match Message::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!(target: "control", "Malformed control request: {e}");
            return Some(MALFORMED_REQUEST.to_string());
        }
    };

    match dispatch(node, message) {
        Ok(reply) => reply,
        Err(e) => {
            error!(target: "control", "Control request failed: {e}");
            None
        }
    }
}

fn dispatch(node: &Node, message: Message) -> Result<Option<String>> {
    match message {
        Message::Mine(data) if data.is_object() => {
            node.mine(data)?;
            Ok(None)
        }
        Message::Mine(_) => Ok(Some(MALFORMED_REQUEST.to_string())),
        Message::AddPeer(addr) => {
            match node.connect_to_peer(&addr) {
                Ok(peer_addr) => info!(target: "control", "Added peer {peer_addr}"),
                Err(e) => error!(target: "control", "Failed to add peer {addr}: {e}"),
            }
            Ok(None)
        }
        Message::GetLastBlock => {
            let latest = node.state().get_latest_block()?;
            Ok(Some(serde_json::to_string(&latest)?))
        }
        Message::GetBlockchain => {
            let blocks = node
                .state()
                .get_blocks()?
                .iter()
                .map(Block::to_value)
                .collect::<Result<Vec<Value>>>()?;
            Ok(Some(Value::Array(blocks).to_string()))
        }
        Message::GetInfo => Ok(Some(serde_json::to_string(&node.state().get_info()?)?)),
        Message::QueryLatest
        | Message::QueryAll
        | Message::ResponseBlockchain(_)
        | Message::Unknown(_) => Ok(Some(UNKNOWN_COMMAND.to_string())),
    }
}
