use crate::storage::{BlockInTransit, MemoryPool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Handshake progress for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Unknown,
    Versioned,
    Synced,
}

/// The ordered set of peer addresses. The first entry is the designated
/// central node.
pub struct Nodes {
    inner: RwLock<Vec<String>>,
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_node(&self, addr: String) {
        let mut inner = self.inner.write().expect("known nodes lock poisoned");
        if !inner.iter().any(|x| x.eq(&addr)) {
            inner.push(addr);
        }
    }

    pub fn evict_node(&self, addr: &str) {
        let mut inner = self.inner.write().expect("known nodes lock poisoned");
        if let Some(idx) = inner.iter().position(|x| x.eq(addr)) {
            inner.remove(idx);
        }
    }

    pub fn first(&self) -> Option<String> {
        self.inner
            .read()
            .expect("known nodes lock poisoned")
            .first()
            .cloned()
    }

    pub fn get_nodes(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("known nodes lock poisoned")
            .clone()
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        self.inner
            .read()
            .expect("known nodes lock poisoned")
            .iter()
            .any(|x| x.eq(addr))
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("known nodes lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("known nodes lock poisoned")
            .is_empty()
    }
}

/// Everything mutable a running node owns: its own address, the optional
/// mining address, the known-peer set with handshake states, the mempool,
/// the blocks-in-transit buffer and the shutdown flag. One instance per
/// process, owned by `main` and shared by reference.
pub struct Node {
    addr: RwLock<String>,
    mining_addr: RwLock<Option<String>>,
    known_nodes: Nodes,
    peer_states: RwLock<HashMap<String, PeerState>>,
    mempool: MemoryPool,
    blocks_in_transit: BlockInTransit,
    shutdown: Arc<AtomicBool>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    pub fn new() -> Node {
        Node {
            addr: RwLock::new(String::new()),
            mining_addr: RwLock::new(None),
            known_nodes: Nodes::new(),
            peer_states: RwLock::new(HashMap::new()),
            mempool: MemoryPool::new(),
            blocks_in_transit: BlockInTransit::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn addr(&self) -> String {
        self.addr.read().expect("node addr lock poisoned").clone()
    }

    pub fn set_addr(&self, addr: String) {
        *self.addr.write().expect("node addr lock poisoned") = addr;
    }

    pub fn mining_addr(&self) -> Option<String> {
        self.mining_addr
            .read()
            .expect("mining addr lock poisoned")
            .clone()
    }

    pub fn set_mining_addr(&self, addr: String) {
        *self.mining_addr.write().expect("mining addr lock poisoned") = Some(addr);
    }

    pub fn is_miner(&self) -> bool {
        self.mining_addr
            .read()
            .expect("mining addr lock poisoned")
            .is_some()
    }

    pub fn known_nodes(&self) -> &Nodes {
        &self.known_nodes
    }

    /// Whether this node is the designated central node (first known
    /// address).
    pub fn is_central(&self) -> bool {
        self.known_nodes.first().is_some_and(|first| first == self.addr())
    }

    pub fn mempool(&self) -> &MemoryPool {
        &self.mempool
    }

    pub fn blocks_in_transit(&self) -> &BlockInTransit {
        &self.blocks_in_transit
    }

    pub fn peer_state(&self, addr: &str) -> PeerState {
        self.peer_states
            .read()
            .expect("peer states lock poisoned")
            .get(addr)
            .copied()
            .unwrap_or(PeerState::Unknown)
    }

    pub fn set_peer_state(&self, addr: &str, state: PeerState) {
        self.peer_states
            .write()
            .expect("peer states lock poisoned")
            .insert(addr.to_string(), state);
    }

    pub fn forget_peer(&self, addr: &str) {
        self.known_nodes.evict_node(addr);
        self.peer_states
            .write()
            .expect("peer states lock poisoned")
            .remove(addr);
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_nodes_dedup_and_evict() {
        let nodes = Nodes::new();
        nodes.add_node("127.0.0.1:3000".to_string());
        nodes.add_node("127.0.0.1:3001".to_string());
        nodes.add_node("127.0.0.1:3000".to_string());
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes.first().unwrap(), "127.0.0.1:3000");

        nodes.evict_node("127.0.0.1:3000");
        assert!(!nodes.node_is_known("127.0.0.1:3000"));
        assert_eq!(nodes.first().unwrap(), "127.0.0.1:3001");
    }

    #[test]
    fn test_central_is_first_known() {
        let node = Node::new();
        node.known_nodes().add_node("127.0.0.1:3000".to_string());
        node.set_addr("127.0.0.1:3001".to_string());
        assert!(!node.is_central());

        node.set_addr("127.0.0.1:3000".to_string());
        assert!(node.is_central());
    }

    #[test]
    fn test_peer_state_transitions() {
        let node = Node::new();
        let peer = "127.0.0.1:3002";
        assert_eq!(node.peer_state(peer), PeerState::Unknown);
        node.set_peer_state(peer, PeerState::Versioned);
        assert_eq!(node.peer_state(peer), PeerState::Versioned);
        node.set_peer_state(peer, PeerState::Synced);
        assert_eq!(node.peer_state(peer), PeerState::Synced);

        node.forget_peer(peer);
        assert_eq!(node.peer_state(peer), PeerState::Unknown);
    }

    #[test]
    fn test_shutdown_flag_is_shared() {
        let node = Node::new();
        let flag = node.shutdown_flag();
        assert!(!node.is_shutdown());
        node.request_shutdown();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
