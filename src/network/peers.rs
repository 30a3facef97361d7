use crate::error::{BlockchainError, Result};
use crate::network::Message;
use log::{info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, RwLock};

/// Write half of a live peer connection
///
/// The reading half stays with the connection's handler thread; writes from
/// broadcasts and replies go through the mutex so frames never interleave.
pub struct PeerConnection {
    addr: SocketAddr,
    writer: Mutex<TcpStream>,
}

impl PeerConnection {
    pub fn new(addr: SocketAddr, writer: TcpStream) -> Self {
        Self {
            addr,
            writer: Mutex::new(writer),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send an already delimited frame.
    ///
    /// A failed or timed-out write shuts the socket down: the frame may be
    /// half written, and the read loop then ends and drops the peer.
    pub fn send_frame(&self, frame: &str) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire writer lock: {e}")))?;

        let written = writer.write_all(frame.as_bytes()).and_then(|_| writer.flush());
        if let Err(e) = written {
            warn!(target: "p2p", "Write to {} failed, closing the connection: {e}", self.addr);
            let _ = writer.shutdown(Shutdown::Both);
            return Err(BlockchainError::Network(format!(
                "Failed to write to {}: {e}",
                self.addr
            )));
        }
        Ok(())
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        self.send_frame(&message.to_frame())
    }
}

/// The set of currently connected peers
///
/// Connections are added when accepted or dialled and removed when their
/// read loop ends. There is no reconnection; operators re-add peers.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<SocketAddr, Arc<PeerConnection>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection
    pub fn add(&self, peer: Arc<PeerConnection>) -> Result<()> {
        let mut peers = self
            .peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;

        info!(target: "p2p", "Connected to peer: {}", peer.addr());
        peers.insert(peer.addr(), peer);
        Ok(())
    }

    /// Record a disconnection
    pub fn remove(&self, addr: SocketAddr) -> Result<()> {
        let mut peers = self
            .peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;

        if peers.remove(&addr).is_some() {
            info!(target: "p2p", "Peer disconnected: {addr}");
        }
        Ok(())
    }

    pub fn get(&self, addr: SocketAddr) -> Result<Option<Arc<PeerConnection>>> {
        let peers = self
            .peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        Ok(peers.get(&addr).cloned())
    }

    /// Remote addresses of all peers, sorted for stable output
    pub fn addresses(&self) -> Result<Vec<String>> {
        let peers = self
            .peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        let mut addrs: Vec<SocketAddr> = peers.keys().copied().collect();
        addrs.sort();
        Ok(addrs.into_iter().map(|addr| addr.to_string()).collect())
    }

    pub fn len(&self) -> Result<usize> {
        let peers = self
            .peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        Ok(peers.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Write `message` to every peer; returns how many writes succeeded.
    ///
    /// A failed write is only logged: the peer leaves the set when its read
    /// loop notices the broken connection.
    pub fn broadcast(&self, message: &Message) -> Result<usize> {
        let frame = message.to_frame();

        // Snapshot so slow sockets never block the peer lock
        let targets: Vec<Arc<PeerConnection>> = {
            let peers = self.peers.read().map_err(|e| {
                BlockchainError::Network(format!("Failed to acquire peer lock: {e}"))
            })?;
            peers.values().cloned().collect()
        };

        let mut delivered = 0;
        for peer in targets {
            match peer.send_frame(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(target: "p2p", "Broadcast to {} failed: {e}", peer.addr()),
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::framing::FrameReader;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    /// A connected pair: the peer-set side and the remote side
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (remote, _) = listener.accept().unwrap();
        (local, remote)
    }

    fn connection(stream: TcpStream) -> Arc<PeerConnection> {
        let addr = stream.local_addr().unwrap();
        Arc::new(PeerConnection::new(addr, stream))
    }

    #[test]
    fn test_connection_tracking() {
        let peers = PeerSet::new();
        let (local, _remote) = socket_pair();
        let peer = connection(local);
        let addr = peer.addr();

        peers.add(peer).unwrap();
        assert_eq!(peers.len().unwrap(), 1);
        assert_eq!(peers.addresses().unwrap(), vec![addr.to_string()]);
        assert!(peers.get(addr).unwrap().is_some());

        peers.remove(addr).unwrap();
        assert!(peers.is_empty().unwrap());
        // Removing twice is harmless
        peers.remove(addr).unwrap();
    }

    #[test]
    fn test_broadcast_reaches_every_peer() {
        let peers = PeerSet::new();
        let (first_local, first_remote) = socket_pair();
        let (second_local, second_remote) = socket_pair();
        peers.add(connection(first_local)).unwrap();
        peers.add(connection(second_local)).unwrap();

        assert_eq!(peers.broadcast(&Message::QueryLatest).unwrap(), 2);

        for remote in [first_remote, second_remote] {
            let frame = FrameReader::new(remote).next_frame().unwrap().unwrap();
            assert_eq!(Message::decode(&frame).unwrap(), Message::QueryLatest);
        }
    }

    #[test]
    fn test_stalled_peer_times_out_and_is_closed() {
        let peers = PeerSet::new();
        let (stalled_local, _stalled_remote) = socket_pair();
        stalled_local
            .set_write_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let stalled = connection(stalled_local);
        peers.add(Arc::clone(&stalled)).unwrap();

        // The remote end never reads, so the socket buffers fill up
        let frame = format!("{}\r\n", "x".repeat(1024 * 1024));
        let started = Instant::now();
        let mut failed = false;
        for _ in 0..256 {
            if stalled.send_frame(&frame).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert!(started.elapsed() < Duration::from_secs(30));

        // The socket is shut down, so later writes fail at once
        assert!(stalled.send(&Message::QueryLatest).is_err());

        // A healthy peer still gets broadcasts
        let (healthy_local, healthy_remote) = socket_pair();
        peers.add(connection(healthy_local)).unwrap();
        assert_eq!(peers.broadcast(&Message::QueryAll).unwrap(), 1);
        let frame = FrameReader::new(healthy_remote).next_frame().unwrap().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::QueryAll);
    }

    #[test]
    fn test_broadcast_with_no_peers() {
        let peers = PeerSet::new();
        assert_eq!(peers.broadcast(&Message::QueryAll).unwrap(), 0);
    }
}
