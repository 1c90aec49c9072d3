use crate::core::Block;
use crate::error::Result;
use crate::utils::sha256_digest;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};

const MAX_NONCE: i64 = i64::MAX;

/// How many nonces are tried between checks of the cancellation flag.
const CANCEL_CHECK_INTERVAL: i64 = 4096;

/// The hash puzzle for one block: find a nonce whose preimage hash falls
/// below `1 << (256 - difficulty)`.
pub struct ProofOfWork {
    block: Block,
    merkle_root: Vec<u8>,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> Result<ProofOfWork> {
        if !crate::core::DifficultyAdjustment::is_valid_difficulty(block.get_difficulty()) {
            return Err(crate::error::NodeError::InvalidBlock(format!(
                "Difficulty {} out of range",
                block.get_difficulty()
            )));
        }
        let mut target = BigInt::from(1);
        target.shl_assign(256 - block.get_difficulty());
        let merkle_root = block.hash_transactions()?;
        Ok(ProofOfWork {
            block,
            merkle_root,
            target,
        })
    }

    /// Recompute a block's hash from its recorded nonce and check it meets
    /// the recorded difficulty.
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block.clone()) {
            Ok(pow) => pow,
            Err(_) => return false,
        };
        let hash = sha256_digest(&pow.prepare_data(block.get_nonce()));
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        hash_int < pow.target
    }

    /// The hash preimage: all integers 8-byte big-endian, followed by the
    /// previous block hash and the Merkle root of the transactions.
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data = vec![];
        data.extend(nonce.to_be_bytes());
        data.extend(self.block.get_timestamp().to_be_bytes());
        data.extend((self.block.get_difficulty() as i64).to_be_bytes());
        data.extend(self.block.get_prev_block_hash());
        data.extend(self.block.get_height().to_be_bytes());
        data.extend(self.merkle_root.as_slice());
        data
    }

    /// Search nonces from zero. Returns the winning `(nonce, hash)` or
    /// `None` if the cancellation flag was raised.
    pub fn run(&self, cancel: &AtomicBool) -> Option<(i64, Vec<u8>)> {
        let mut nonce = 0;
        while nonce < MAX_NONCE {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return None;
            }

            let hash = sha256_digest(&self.prepare_data(nonce));
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
            if hash_int < self.target {
                return Some((nonce, hash));
            }
            nonce += 1;
        }
        None
    }
}
