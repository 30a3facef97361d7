//! Blockchain integration tests
//!
//! Drives the public API and real nodes talking over loopback TCP,
//! focusing on the features that make this a working network of nodes.

use nodechain::core::{
    accumulated_difficulty, is_valid_chain, Block, BlockTemplate, Blockchain, ProofOfWork,
    ReplaceOutcome,
};
use nodechain::network::{write_frame, FrameReader, MALFORMED_REQUEST, UNKNOWN_COMMAND};
use nodechain::{current_timestamp, Config, Node, NodeHandle};
use num_bigint::BigUint;
use serde_json::{json, Value};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

/// A free port `p` on loopback whose neighbour `p + 1` is free too
fn free_port_pair() -> u16 {
    loop {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        if port == u16::MAX {
            continue;
        }
        let first = TcpListener::bind(("127.0.0.1", port));
        let second = TcpListener::bind(("127.0.0.1", port + 1));
        if first.is_ok() && second.is_ok() {
            return port;
        }
    }
}

fn start_node() -> (Node, NodeHandle) {
    let config = Config {
        port: free_port_pair(),
        ..Config::default()
    };
    let node = Node::new(config).unwrap();
    let handle = node.start().unwrap();
    (node, handle)
}

/// A control-protocol client
struct Operator {
    writer: TcpStream,
    reader: FrameReader<TcpStream>,
}

impl Operator {
    fn connect(handle: &NodeHandle) -> Self {
        let stream = TcpStream::connect(handle.control_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let writer = stream.try_clone().unwrap();
        Operator {
            writer,
            reader: FrameReader::new(stream),
        }
    }

    fn send(&mut self, frame: &str) {
        write_frame(&mut self.writer, frame).unwrap();
    }

    fn request(&mut self, frame: &str) -> String {
        self.send(frame);
        self.reader.next_frame().unwrap().unwrap()
    }

    fn command(&mut self, message_type: i64, data: Value) -> String {
        self.request(&json!({ "type": message_type, "data": data }).to_string())
    }

    fn last_block(&mut self) -> Block {
        serde_json::from_str(&self.command(5, json!(""))).unwrap()
    }

    fn info(&mut self) -> Value {
        serde_json::from_str(&self.command(7, json!(""))).unwrap()
    }

    fn wait_for_index(&mut self, index: u64) -> Block {
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            let latest = self.last_block();
            if latest.get_index() >= index || Instant::now() > deadline {
                return latest;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

#[test]
fn test_chain_grows_and_validates() {
    let mut chain = Blockchain::new();
    let first = chain.generate_next_block(json!({"message": "one"})).unwrap();
    let second = chain.generate_next_block(json!({"message": "two"})).unwrap();

    assert!(first.is_some());
    assert!(second.is_some());
    assert_eq!(chain.len(), 3);
    assert!(is_valid_chain(chain.get_blocks()));
    assert!(chain.get_blocks().iter().all(ProofOfWork::validate));
    assert_eq!(accumulated_difficulty(chain.get_blocks()), BigUint::from(3u32));
}

#[test]
fn test_heavier_chain_wins() {
    let now = current_timestamp().unwrap();
    let mut ours = Blockchain::new();
    ours.generate_next_block(json!({"message": "ours"})).unwrap();

    let genesis = Block::genesis();
    let heavy = ProofOfWork::mine(&BlockTemplate {
        index: 1,
        previous_hash: genesis.get_hash().to_string(),
        timestamp: now,
        data: json!({"message": "theirs"}),
        difficulty: 4,
    });
    let candidate = vec![genesis, heavy.clone()];

    assert_eq!(ours.replace_chain(candidate.clone()), ReplaceOutcome::Replaced);
    assert_eq!(ours.get_latest_block(), &heavy);
    // Equal work is not enough
    assert_eq!(ours.replace_chain(candidate), ReplaceOutcome::NotHeavier);
}

#[test]
fn test_start_binds_both_listeners() {
    let port = free_port_pair();
    let node = Node::new(Config {
        port,
        ..Config::default()
    })
    .unwrap();

    let handle = node.start().unwrap();
    assert_eq!(handle.peer_addr().port(), port);
    assert_eq!(handle.control_addr().port(), port + 1);
    assert!(TcpStream::connect(handle.peer_addr()).is_ok());
    assert!(TcpStream::connect(handle.control_addr()).is_ok());

    // The ports are taken now
    assert!(node.start().is_err());
}

#[test]
fn test_control_protocol() {
    let (_node, handle) = start_node();
    let mut operator = Operator::connect(&handle);

    assert_eq!(operator.info(), json!({"difficulty": 0, "peers": []}));
    assert_eq!(operator.last_block(), Block::genesis());

    let chain: Vec<Block> = serde_json::from_str(&operator.command(6, json!(""))).unwrap();
    assert_eq!(chain, vec![Block::genesis()]);

    operator.send(&json!({"type": 3, "data": {"message": "hello"}}).to_string());
    let mined = operator.wait_for_index(1);
    assert_eq!(mined.get_index(), 1);
    assert_eq!(mined.get_data(), &json!({"message": "hello"}));
    assert!(ProofOfWork::validate(&mined));
}

#[test]
fn test_control_error_replies() {
    let (_node, handle) = start_node();
    let mut operator = Operator::connect(&handle);

    assert_eq!(operator.request("hello there"), MALFORMED_REQUEST);
    assert_eq!(operator.request(r#"{"type":6}"#), MALFORMED_REQUEST);
    assert_eq!(operator.command(3, json!("not an object")), MALFORMED_REQUEST);
    assert_eq!(operator.command(0, json!("")), UNKNOWN_COMMAND);
    assert_eq!(operator.command(99, json!("")), UNKNOWN_COMMAND);

    // The connection survives bad requests
    assert_eq!(operator.last_block(), Block::genesis());
}

#[test]
fn test_two_nodes_sync() {
    let (_first, first_handle) = start_node();
    let (_second, second_handle) = start_node();
    let mut first_operator = Operator::connect(&first_handle);
    let mut second_operator = Operator::connect(&second_handle);

    first_operator.send(&json!({"type": 3, "data": {"message": "from first"}}).to_string());
    let first_tip = first_operator.wait_for_index(1);
    assert_eq!(first_tip.get_index(), 1);

    // Connecting asks the new peer for its tip, which the second node appends
    second_operator.send(
        &json!({"type": 4, "data": first_handle.peer_addr().to_string()}).to_string(),
    );
    assert_eq!(second_operator.wait_for_index(1), first_tip);

    let peers = second_operator.info()["peers"].clone();
    assert_eq!(peers, json!([first_handle.peer_addr().to_string()]));

    // A block mined on the second node is broadcast back
    second_operator.send(&json!({"type": 3, "data": {"message": "from second"}}).to_string());
    let second_tip = second_operator.wait_for_index(2);
    assert_eq!(second_tip.get_index(), 2);
    assert_eq!(first_operator.wait_for_index(2), second_tip);
}

#[test]
fn test_peer_catches_up_on_longer_chain() {
    let (_first, first_handle) = start_node();
    let (_second, second_handle) = start_node();
    let mut first_operator = Operator::connect(&first_handle);
    let mut second_operator = Operator::connect(&second_handle);

    for message in ["a", "b", "c"] {
        first_operator.send(&json!({"type": 3, "data": {"message": message}}).to_string());
    }
    let first_tip = first_operator.wait_for_index(3);
    assert_eq!(first_tip.get_index(), 3);

    // The tip does not link to genesis, so the full chain is requested and adopted
    second_operator.send(
        &json!({"type": 4, "data": first_handle.peer_addr().to_string()}).to_string(),
    );
    assert_eq!(second_operator.wait_for_index(3), first_tip);

    let chain: Vec<Block> =
        serde_json::from_str(&second_operator.command(6, json!(""))).unwrap();
    assert_eq!(chain.len(), 4);
    assert!(is_valid_chain(&chain));
}
