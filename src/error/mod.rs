//! Error handling for the node
//!
//! One crate-wide error enum. Lookup misses (`BlockNotFound`, `TxNotFound`)
//! are recovered locally by callers; store errors are fatal; everything else
//! is surfaced with a message and the node keeps running.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Clone)]
pub enum NodeError {
    /// Block lookup miss
    BlockNotFound(String),
    /// Transaction lookup miss
    TxNotFound(String),
    /// Not enough unspent outputs to fund a transaction
    InsufficientFunds { required: i64, available: i64 },
    /// Address failed base58/checksum validation
    InvalidAddress(String),
    /// ECDSA signature did not verify
    BadSignature(String),
    /// Peer sent a frame or payload we could not decode
    MalformedMessage(String),
    /// An input references a transaction not present in the chain
    PrevTxMissing(String),
    /// Underlying key-value store failure; fatal
    Store(String),
    /// Block failed validation (proof-of-work, structure, linkage)
    InvalidBlock(String),
    /// Cryptographic operation failure
    Crypto(String),
    /// Serialization/deserialization failure
    Serialization(String),
    /// File I/O failure
    Io(String),
    /// Network communication failure
    Network(String),
    /// Connect to a peer was refused; the address gets evicted
    PeerUnavailable(String),
    /// Wallet operation failure
    Wallet(String),
    /// Process configuration failure (missing NODE_ID, bad ports file)
    Config(String),
    /// Orderly shutdown was requested
    Shutdown,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::BlockNotFound(msg) => write!(f, "Block not found: {msg}"),
            NodeError::TxNotFound(msg) => write!(f, "Transaction not found: {msg}"),
            NodeError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            NodeError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            NodeError::BadSignature(msg) => write!(f, "Bad signature: {msg}"),
            NodeError::MalformedMessage(msg) => write!(f, "Malformed message: {msg}"),
            NodeError::PrevTxMissing(msg) => write!(f, "Previous transaction missing: {msg}"),
            NodeError::Store(msg) => write!(f, "Store error: {msg}"),
            NodeError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            NodeError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            NodeError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
            NodeError::Network(msg) => write!(f, "Network error: {msg}"),
            NodeError::PeerUnavailable(addr) => write!(f, "Peer unavailable: {addr}"),
            NodeError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            NodeError::Config(msg) => write!(f, "Configuration error: {msg}"),
            NodeError::Shutdown => write!(f, "Shutdown requested"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<sled::Error> for NodeError {
    fn from(err: sled::Error) -> Self {
        NodeError::Store(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for NodeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for NodeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}
