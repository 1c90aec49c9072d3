//! Utility functions and helpers
//!
//! Cryptographic primitives, encoding helpers and the bincode
//! serialization layer used throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, public_key_from_pkcs8, random_bytes,
    ripemd160_digest, sha256_digest,
};

pub use serialization::{deserialize, serialize};
