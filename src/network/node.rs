//! Node context
//!
//! [`NodeState`] owns everything the handlers share: the chain, the peer set
//! and the chain version counter the miner watches. [`Node`] adds the mining
//! worker and the two listeners on top.

use crate::config::Config;
use crate::core::{Block, BlockTemplate, Blockchain, ReplaceOutcome};
use crate::error::{BlockchainError, Result};
use crate::network::sync::{decide, SyncDecision, SyncOutcome};
use crate::network::{control, server, Message, Miner, PeerSet};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

/// Reply to GET_INFO
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub difficulty: u32,
    pub peers: Vec<String>,
}

pub struct NodeState {
    config: Config,
    chain: RwLock<Blockchain>,
    /// Bumped on every tip change so in-flight mining can notice
    chain_version: AtomicU64,
    peers: PeerSet,
}

impl NodeState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            chain: RwLock::new(Blockchain::new()),
            chain_version: AtomicU64::new(0),
            peers: PeerSet::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn chain_version(&self) -> u64 {
        self.chain_version.load(Ordering::SeqCst)
    }

    fn read_chain(&self) -> Result<RwLockReadGuard<'_, Blockchain>> {
        self.chain
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire chain lock: {e}")))
    }

    fn write_chain(&self) -> Result<RwLockWriteGuard<'_, Blockchain>> {
        self.chain
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire chain lock: {e}")))
    }

    /// Must be called with the chain write lock held
    fn tip_changed(&self) {
        self.chain_version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get_latest_block(&self) -> Result<Block> {
        Ok(self.read_chain()?.get_latest_block().clone())
    }

    pub fn get_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.read_chain()?.get_blocks().to_vec())
    }

    pub fn get_difficulty(&self) -> Result<u32> {
        Ok(self.read_chain()?.get_difficulty())
    }

    pub fn get_info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            difficulty: self.get_difficulty()?,
            peers: self.peers.addresses()?,
        })
    }

    /// `BLOCK_CHAIN` message carrying only our tip
    pub fn latest_block_message(&self) -> Result<Message> {
        let latest = self.get_latest_block()?;
        Ok(Message::ResponseBlockchain(vec![latest.to_value()?]))
    }

    /// `BLOCK_CHAIN` message carrying the whole chain
    pub fn all_blocks_message(&self) -> Result<Message> {
        let blocks = self
            .get_blocks()?
            .iter()
            .map(Block::to_value)
            .collect::<Result<Vec<Value>>>()?;
        Ok(Message::ResponseBlockchain(blocks))
    }

    fn broadcast(&self, message: &Message) {
        match self.peers.broadcast(message) {
            Ok(count) => info!(target: "p2p", "Broadcast type {} to {count} peers", message.message_type()),
            Err(e) => warn!(target: "p2p", "Broadcast failed: {e}"),
        }
    }

    fn broadcast_latest(&self) -> Result<()> {
        let message = self.latest_block_message()?;
        self.broadcast(&message);
        Ok(())
    }

    /// Template for the next block together with the chain version it extends
    pub fn mining_template(&self, data: Value) -> Result<(BlockTemplate, u64)> {
        let chain = self.read_chain()?;
        let template = chain.next_block_template(data)?;
        Ok((template, self.chain_version()))
    }

    /// Append a block mined against `version`; false when the tip moved meanwhile
    pub fn submit_mined_block(&self, block: Block, version: u64) -> Result<bool> {
        {
            let mut chain = self.write_chain()?;
            if self.chain_version() != version {
                info!(
                    target: "miner",
                    "Discarding mined block {}: the chain changed while mining",
                    block.get_index()
                );
                return Ok(false);
            }
            if !chain.add_block(block) {
                return Ok(false);
            }
            self.tip_changed();
        }

        self.broadcast_latest()?;
        Ok(true)
    }

    /// Run the sync state machine on a `BLOCK_CHAIN` payload
    pub fn handle_blockchain_response(&self, received: &[Value]) -> Result<SyncOutcome> {
        let (outcome, reply) = {
            let mut chain = self.write_chain()?;
            let decision = decide(received, chain.get_latest_block());
            match decision {
                SyncDecision::Ignore(reason) => {
                    info!(target: "blockchain", "Ignored received blocks: {reason:?}");
                    (SyncOutcome::Ignored(reason), None)
                }
                SyncDecision::Append(block) => {
                    if chain.add_block(block) {
                        self.tip_changed();
                        (SyncOutcome::Appended, Some(Self::tip_message(&chain)?))
                    } else {
                        (SyncOutcome::Rejected, None)
                    }
                }
                SyncDecision::RequestFullChain => {
                    info!(target: "blockchain", "Asking peers for their chains");
                    (SyncOutcome::RequestedFullChain, Some(Message::QueryAll))
                }
                SyncDecision::AttemptReplace(blocks) => match chain.replace_chain(blocks) {
                    ReplaceOutcome::Replaced => {
                        self.tip_changed();
                        (SyncOutcome::Replaced, Some(Self::tip_message(&chain)?))
                    }
                    ReplaceOutcome::InvalidChain | ReplaceOutcome::NotHeavier => {
                        (SyncOutcome::Rejected, None)
                    }
                },
            }
        };

        // Sockets are written after the chain lock is released
        if let Some(message) = reply {
            self.broadcast(&message);
        }
        Ok(outcome)
    }

    fn tip_message(chain: &Blockchain) -> Result<Message> {
        let latest = chain.get_latest_block().to_value()?;
        Ok(Message::ResponseBlockchain(vec![latest]))
    }
}

/// Addresses the listeners actually bound to
pub struct NodeHandle {
    peer_addr: SocketAddr,
    control_addr: SocketAddr,
    threads: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Block until both accept loops end
    pub fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                warn!("Listener thread panicked");
            }
        }
    }
}

/// A running node: shared state plus the mining worker
#[derive(Clone)]
pub struct Node {
    state: Arc<NodeState>,
    miner: Miner,
}

impl Node {
    pub fn new(config: Config) -> Result<Node> {
        let state = Arc::new(NodeState::new(config));
        let miner = Miner::spawn(Arc::clone(&state))?;
        Ok(Node { state, miner })
    }

    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Queue a block with `data` for mining; it is broadcast once found
    pub fn mine(&self, data: Value) -> Result<()> {
        self.miner.submit(data)
    }

    /// Dial a peer and start serving the connection
    pub fn connect_to_peer(&self, addr: &str) -> Result<SocketAddr> {
        server::connect_to_peer(&self.state, addr)
    }

    /// Bind the peer and control listeners and serve them on background threads
    pub fn start(&self) -> Result<NodeHandle> {
        let config = self.state.config();
        let peer_addr = config.peer_addr();
        let control_addr = config.control_addr()?;

        let peer_listener = TcpListener::bind(&peer_addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {peer_addr}: {e}")))?;
        let control_listener = TcpListener::bind(&control_addr).map_err(|e| {
            BlockchainError::Network(format!("Failed to bind to {control_addr}: {e}"))
        })?;

        let handle_peer_addr = peer_listener.local_addr()?;
        let handle_control_addr = control_listener.local_addr()?;
        info!(target: "p2p", "Listening on: {handle_peer_addr}");
        info!(target: "control", "Listening on: {handle_control_addr}");

        let peer_state = Arc::clone(&self.state);
        let peer_thread = thread::Builder::new()
            .name("p2p-listener".to_string())
            .spawn(move || server::run(peer_state, peer_listener))?;

        let control_node = self.clone();
        let control_thread = thread::Builder::new()
            .name("control-listener".to_string())
            .spawn(move || control::run(control_node, control_listener))?;

        Ok(NodeHandle {
            peer_addr: handle_peer_addr,
            control_addr: handle_control_addr,
            threads: vec![peer_thread, control_thread],
        })
    }

    /// Start and serve until the listeners stop
    pub fn run(&self) -> Result<()> {
        self.start()?.join();
        Ok(())
    }
}
