//! Wallet management and address derivation
//!
//! Key pairs, Base58Check-style address derivation and the per-node
//! persisted wallet collection.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;
