use ring::digest::{Context, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{
    EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING,
};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{NodeError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NodeError::Crypto(format!("System time error: {e}")))?
        .as_millis();

    if duration > i64::MAX as u128 {
        return Err(NodeError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| NodeError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(buf.as_mut_slice())
        .map_err(|e| NodeError::Crypto(format!("Failed to generate random bytes: {e}")))?;
    Ok(buf)
}

/// Generate a fresh P-256 key pair, returned as a PKCS#8 document.
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| NodeError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

/// Extract the raw `X || Y` public-key coordinates (64 bytes) from a PKCS#8
/// key document. Ring exposes the SEC1 uncompressed point `0x04 || X || Y`;
/// the tag byte is stripped so transaction inputs carry the bare halves.
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| NodeError::Crypto(format!("Failed to parse PKCS8 key: {e}")))?;
    let sec1 = key_pair.public_key().as_ref();
    if sec1.len() != 65 || sec1[0] != 0x04 {
        return Err(NodeError::Crypto(
            "Unexpected public key encoding".to_string(),
        ));
    }
    Ok(sec1[1..].to_vec())
}

/// Sign a message digest preimage; the signature is `r || s`, 32 bytes each.
pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| NodeError::Crypto(format!("Failed to parse PKCS8 key: {e}")))?;
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|e| NodeError::Crypto(format!("Failed to sign message: {e}")))?
        .as_ref()
        .to_vec();
    Ok(signature)
}

/// Verify an `r || s` signature against a bare `X || Y` public key.
pub fn ecdsa_p256_sha256_sign_verify(pub_key_xy: &[u8], signature: &[u8], message: &[u8]) -> bool {
    // Re-attach the SEC1 uncompressed tag for ring.
    let mut sec1 = Vec::with_capacity(pub_key_xy.len() + 1);
    sec1.push(0x04);
    sec1.extend_from_slice(pub_key_xy);
    let peer_public_key = ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, sec1);
    peer_public_key.verify(message, signature).is_ok()
}
