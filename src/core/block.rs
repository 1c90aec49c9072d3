use crate::core::{merkle, DifficultyAdjustment, ProofOfWork, Transaction};
use crate::error::{NodeError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// One proof-of-work block. `prev_block_hash` is empty exactly for the
/// genesis block; `hash` is the winning proof-of-work hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    prev_block_hash: Vec<u8>,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
    height: i64,
    difficulty: u32,
}

impl Block {
    /// Compose and mine a block. Fails with `Shutdown` when the
    /// cancellation flag is raised mid-search.
    pub fn new_block(
        timestamp: i64,
        prev_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: i64,
        difficulty: u32,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        match transactions.first() {
            None => {
                return Err(NodeError::InvalidBlock(
                    "Block must contain at least one transaction".to_string(),
                ))
            }
            Some(first) if !first.is_coinbase() => {
                return Err(NodeError::InvalidBlock(
                    "First transaction must be the coinbase".to_string(),
                ))
            }
            Some(_) => {}
        }
        if !DifficultyAdjustment::is_valid_difficulty(difficulty) {
            return Err(NodeError::InvalidBlock(format!(
                "Difficulty {difficulty} out of range"
            )));
        }

        let mut block = Block {
            timestamp,
            prev_block_hash,
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
            height,
            difficulty,
        };

        let pow = ProofOfWork::new_proof_of_work(block.clone())?;
        let (nonce, hash) = pow.run(cancel).ok_or(NodeError::Shutdown)?;
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// The first block of a chain: empty previous hash, height zero,
    /// initial difficulty.
    pub fn generate_genesis_block(coinbase: &Transaction) -> Result<Block> {
        info!("Minting genesis block");
        Block::new_block(
            current_timestamp()?,
            vec![],
            &[coinbase.clone()],
            0,
            DifficultyAdjustment::initial_difficulty(),
            &AtomicBool::new(false),
        )
    }

    /// Merkle root over the serialized transactions; part of the
    /// proof-of-work preimage.
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        let mut leaves = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            leaves.push(tx.serialize()?);
        }
        merkle::merkle_root(&leaves)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize(bytes)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_prev_block_hash(&self) -> &[u8] {
        self.prev_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> i64 {
        self.height
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_empty()
    }

    #[cfg(test)]
    pub fn set_nonce_for_test(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}
