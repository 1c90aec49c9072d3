//! # Ferrocoin
//!
//! A small UTXO-model cryptocurrency node:
//!
//! - proof-of-work chain of ECDSA-signed transactions with retargeting
//!   difficulty;
//! - a derived UTXO index over the shared sled store for fast balance and
//!   spend queries;
//! - a framed binary P2P protocol for handshake, inventory exchange,
//!   block/transaction fetch and gossip;
//! - an optional background miner draining the mempool.
//!
//! Module map: `core/` holds blocks, transactions, the chain store and the
//! proof-of-work engine; `storage/` the UTXO index and mempool; `network/`
//! the wire codec, the `Node` aggregate and the server; `wallet/` key
//! management and addresses; `utils/` crypto and serialization helpers.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, DifficultyAdjustment, ProofOfWork, TXInput, TXOutput, TXOutputs,
    Transaction, SUBSIDY,
};
pub use error::{NodeError, Result};
pub use network::{
    central_node_addr, send_tx, Node, Nodes, OpType, Package, PeerState, Server,
    TRANSACTION_THRESHOLD,
};
pub use storage::{BlockInTransit, MemoryPool, UTXOSet};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
