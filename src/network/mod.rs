//! Peer-to-peer networking
//!
//! The framed wire codec, the process-wide `Node` aggregate and the TCP
//! server with the protocol handlers: handshake, inventory exchange,
//! block/transaction fetch and gossip, mining trigger.

pub mod message;
pub mod node;
pub mod server;

pub use message::{OpType, Package};
pub use node::{Node, Nodes, PeerState};
pub use server::{
    central_node_addr, read_port_candidates, send_tx, Server, TRANSACTION_THRESHOLD,
};
