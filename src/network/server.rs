//! Peer protocol transport
//!
//! One thread per connection, whether accepted or dialled. Every frame is
//! decoded into a [`Message`] and answered over the connection's shared
//! writer so replies never interleave with broadcasts.

use crate::error::{BlockchainError, Result};
use crate::network::framing::{FrameReader, DELIMITER};
use crate::network::message::{MALFORMED_REQUEST, UNKNOWN_COMMAND};
use crate::network::{Message, NodeState, PeerConnection};
use log::{error, info, warn};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

/// Accept peer connections until the listener fails
pub fn run(state: Arc<NodeState>, listener: TcpListener) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = register_peer(&state, stream) {
                    error!(target: "p2p", "Failed to register peer: {e}");
                }
            }
            Err(e) => {
                error!(target: "p2p", "Error accepting connection: {e}");
            }
        }
    }
}

/// Dial `addr` and serve the connection like an accepted one
pub fn connect_to_peer(state: &Arc<NodeState>, addr: &str) -> Result<SocketAddr> {
    let socket_addr = addr
        .to_socket_addrs()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?
        .next()
        .ok_or_else(|| BlockchainError::Network(format!("Address {addr} did not resolve")))?;

    let stream = TcpStream::connect_timeout(&socket_addr, state.config().connect_timeout())
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;

    register_peer(state, stream)
}

/// Add the connection to the peer set and start its handler thread
fn register_peer(state: &Arc<NodeState>, stream: TcpStream) -> Result<SocketAddr> {
    let peer_addr = stream.peer_addr()?;
    let writer = stream.try_clone()?;
    writer
        .set_write_timeout(Some(state.config().write_timeout()))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
    let peer = Arc::new(PeerConnection::new(peer_addr, writer));
    state.peers().add(Arc::clone(&peer))?;

    let handler_state = Arc::clone(state);
    let handler_peer = Arc::clone(&peer);
    let spawned = thread::Builder::new()
        .name(format!("peer-{peer_addr}"))
        .spawn(move || {
            handle_connection(&handler_state, &handler_peer, stream);

            if let Err(e) = handler_state.peers().remove(peer_addr) {
                warn!(target: "p2p", "Failed to record disconnection: {e}");
            }
        });
    if let Err(e) = spawned {
        state.peers().remove(peer_addr)?;
        return Err(e.into());
    }

    if state.config().sync_on_connect {
        if let Err(e) = peer.send(&Message::QueryLatest) {
            warn!(target: "p2p", "Failed to query {peer_addr}: {e}");
        }
    }

    Ok(peer_addr)
}

/// Read frames until the peer closes the stream or it breaks
fn handle_connection(state: &NodeState, peer: &PeerConnection, stream: TcpStream) {
    let peer_addr = peer.addr();
    let mut frames = match stream.try_clone() {
        Ok(reader) => FrameReader::new(reader),
        Err(e) => {
            error!(target: "p2p", "Failed to clone stream for {peer_addr}: {e}");
            return;
        }
    };

    loop {
        match frames.next_frame() {
            Ok(Some(frame)) => {
                if let Err(e) = process_frame(state, peer, &frame) {
                    error!(target: "p2p", "Error processing message from {peer_addr}: {e}");
                }
            }
            Ok(None) => break,
            Err(BlockchainError::Serialization(e)) => {
                warn!(target: "p2p", "Dropping undecodable frame from {peer_addr}: {e}");
            }
            Err(e) => {
                warn!(target: "p2p", "Closing connection to {peer_addr}: {e}");
                break;
            }
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
}

fn send_text(peer: &PeerConnection, text: &str) -> Result<()> {
    peer.send_frame(&format!("{text}{DELIMITER}"))
}

/// Handle one peer frame
fn process_frame(state: &NodeState, peer: &PeerConnection, frame: &str) -> Result<()> {
    let message = match Message::decode(frame) {
        Ok(message) => message,
        Err(BlockchainError::Protocol(reason)) => {
            warn!(target: "p2p", "Malformed message from {}: {reason}", peer.addr());
            return send_text(peer, MALFORMED_REQUEST);
        }
        // Non-JSON frames, including error replies from other nodes, get no reply
        Err(e) => {
            warn!(target: "p2p", "Ignoring non-JSON frame from {}: {e}", peer.addr());
            return Ok(());
        }
    };

    info!(target: "p2p", "Received message type {} from {}", message.message_type(), peer.addr());

    match message {
        Message::QueryLatest => peer.send(&state.latest_block_message()?),
        Message::QueryAll => peer.send(&state.all_blocks_message()?),
        Message::ResponseBlockchain(blocks) => {
            let outcome = state.handle_blockchain_response(&blocks)?;
            info!(target: "blockchain", "Sync with {}: {outcome:?}", peer.addr());
            Ok(())
        }
        Message::Mine(_)
        | Message::AddPeer(_)
        | Message::GetLastBlock
        | Message::GetBlockchain
        | Message::GetInfo
        | Message::Unknown(_) => send_text(peer, UNKNOWN_COMMAND),
    }
}
