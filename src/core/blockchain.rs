// The chain store: blocks by hash plus a head pointer, on sled. All
// mutations are serialized behind one mutex; the UTXO index shares the
// same tree under its own key prefix and the same mutex.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, DifficultyAdjustment, ProofOfWork, Transaction, TXOutputs};
use crate::error::{NodeError, Result};
use crate::utils::current_timestamp;
use data_encoding::HEXLOWER;
use log::info;
use sled::Db;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Key holding the hash of the current head block.
const TIP_KEY: &[u8] = b"lh";

/// Coinbase data for the genesis block.
const GENESIS_DATA: &[u8] = b"GENESIS";

#[derive(Clone)]
pub struct Blockchain {
    // empty vec until a genesis block exists
    tip_hash: Arc<RwLock<Vec<u8>>>,
    db: Db,
    write_lock: Arc<Mutex<()>>,
}

impl Blockchain {
    /// Create a chain (minting genesis if absent) at the configured
    /// per-node path.
    pub fn create_blockchain(genesis_address: &str) -> Result<Blockchain> {
        Self::create_blockchain_with_path(genesis_address, &GLOBAL_CONFIG.blocks_dir()?)
    }

    /// Open the configured per-node chain store. An empty store is valid:
    /// a freshly joining node fills it over block sync.
    pub fn open_blockchain() -> Result<Blockchain> {
        Self::open_blockchain_with_path(&GLOBAL_CONFIG.blocks_dir()?)
    }

    pub fn create_blockchain_with_path(genesis_address: &str, db_path: &str) -> Result<Blockchain> {
        let blockchain = Self::open_blockchain_with_path(db_path)?;

        if blockchain.is_empty() {
            info!("Creating genesis block for address: {genesis_address}");
            let coinbase = Transaction::new_coinbase_tx(genesis_address, GENESIS_DATA)?;
            let genesis = Block::generate_genesis_block(&coinbase)?;
            let _guard = blockchain.lock_writes();
            blockchain.persist_block(&genesis)?;
            blockchain.set_tip(genesis.get_hash())?;
        }

        Ok(blockchain)
    }

    pub fn open_blockchain_with_path(db_path: &str) -> Result<Blockchain> {
        let db = sled::open(db_path)
            .map_err(|e| NodeError::Store(format!("Failed to open store at {db_path}: {e}")))?;

        let tip_hash = db
            .get(TIP_KEY)
            .map_err(|e| NodeError::Store(format!("Failed to read head pointer: {e}")))?
            .map(|v| v.to_vec())
            .unwrap_or_default();

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            db,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// The single mutex serializing all chain and UTXO-index writes.
    pub fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .expect("chain write lock poisoned")
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .expect("tip hash lock poisoned")
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.tip_hash
            .read()
            .expect("tip hash lock poisoned")
            .is_empty()
    }

    fn set_tip(&self, new_tip: &[u8]) -> Result<()> {
        self.db
            .insert(TIP_KEY, new_tip)
            .map_err(|e| NodeError::Store(format!("Failed to update head pointer: {e}")))?;
        let mut tip_hash = self.tip_hash.write().expect("tip hash lock poisoned");
        *tip_hash = new_tip.to_vec();
        Ok(())
    }

    fn persist_block(&self, block: &Block) -> Result<()> {
        self.db
            .insert(block.get_hash(), block.serialize()?)
            .map_err(|e| NodeError::Store(format!("Failed to persist block: {e}")))?;
        Ok(())
    }

    /// Store a block received from a peer or miner. The head moves only
    /// when the new block's height strictly exceeds the current head's;
    /// equal-height arrivals stay stored but unadopted (first-seen wins).
    /// Returns whether the head moved.
    pub fn add_block(&self, block: &Block) -> Result<bool> {
        let _guard = self.lock_writes();

        if self.contains(block.get_hash())? {
            return Ok(false);
        }
        self.persist_block(block)?;

        let adopted = match self.last_block() {
            Ok(tip) => block.get_height() > tip.get_height(),
            Err(NodeError::BlockNotFound(_)) => true,
            Err(e) => return Err(e),
        };
        if adopted {
            self.set_tip(block.get_hash())?;
            info!(
                "New head {} at height {}",
                HEXLOWER.encode(block.get_hash()),
                block.get_height()
            );
        }
        Ok(adopted)
    }

    pub fn contains(&self, block_hash: &[u8]) -> Result<bool> {
        Ok(self
            .db
            .get(block_hash)
            .map_err(|e| NodeError::Store(format!("Failed to check block existence: {e}")))?
            .is_some())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self
            .db
            .get(block_hash)
            .map_err(|e| NodeError::Store(format!("Failed to get block: {e}")))?
        {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// The current head block.
    pub fn last_block(&self) -> Result<Block> {
        let tip = self.get_tip_hash();
        if tip.is_empty() {
            return Err(NodeError::BlockNotFound("chain is empty".to_string()));
        }
        self.get_block(&tip)?
            .ok_or_else(|| NodeError::Store("Head pointer references a missing block".to_string()))
    }

    pub fn best_height(&self) -> i64 {
        self.last_block().map(|b| b.get_height()).unwrap_or(0)
    }

    /// Cursor from the head back to genesis.
    pub fn iterator(&self) -> BlockchainIterator<'_> {
        BlockchainIterator {
            db: &self.db,
            current_hash: self.get_tip_hash(),
        }
    }

    /// All block hashes, head first, genesis last.
    pub fn get_block_hashes(&self) -> Vec<Vec<u8>> {
        self.iterator().map(|b| b.get_hash().to_vec()).collect()
    }

    /// Linear scan backward from the head.
    pub fn find_transaction(&self, txid: &[u8]) -> Option<Transaction> {
        for block in self.iterator() {
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Some(transaction.clone());
                }
            }
        }
        None
    }

    /// Full-chain UTXO projection: txid (hex) to its unspent outputs. An
    /// output is unspent iff no input anywhere in the chain references it.
    pub fn find_utxo(&self) -> HashMap<String, TXOutputs> {
        let mut utxo: HashMap<String, TXOutputs> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<i32>> = HashMap::new();

        for block in self.iterator() {
            for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());
                'outputs: for (idx, out) in tx.get_vout().iter().enumerate() {
                    if let Some(spent) = spent_txos.get(txid_hex.as_str()) {
                        for spent_idx in spent {
                            if *spent_idx == idx as i32 {
                                continue 'outputs;
                            }
                        }
                    }
                    utxo.entry(txid_hex.clone())
                        .or_default()
                        .outputs
                        .push(out.clone());
                }
                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    let in_txid_hex = HEXLOWER.encode(txin.get_txid());
                    spent_txos.entry(in_txid_hex).or_default().push(txin.get_vout());
                }
            }
        }
        utxo
    }

    /// Sign a transaction's inputs by locating the referenced transactions
    /// in the chain.
    pub fn sign_tx(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        tx.sign(self, pkcs8)
    }

    /// Verify a transaction's signatures; coinbase verifies trivially.
    pub fn verify_tx(&self, tx: &Transaction) -> Result<bool> {
        tx.verify(self)
    }

    /// Compose, prove and append a block on the current head. `txs` must
    /// lead with the coinbase. The write mutex is held for the whole
    /// operation, including the nonce search.
    pub fn mine_block(&self, transactions: &[Transaction], cancel: &AtomicBool) -> Result<Block> {
        let _guard = self.lock_writes();

        for (i, transaction) in transactions.iter().enumerate() {
            if !self.verify_tx(transaction)? {
                return Err(NodeError::BadSignature(format!(
                    "Invalid transaction at index {i}"
                )));
            }
        }
        Self::check_for_double_spending(transactions)?;

        let tip = self.last_block()?;
        let next_height = tip.get_height() + 1;
        let timestamp = current_timestamp()?;
        let difficulty = DifficultyAdjustment::next_difficulty(&tip, next_height, timestamp);

        info!(
            "Mining block at height {next_height} with {} transactions (difficulty: {difficulty})",
            transactions.len()
        );
        let block = Block::new_block(
            timestamp,
            tip.get_hash().to_vec(),
            transactions,
            next_height,
            difficulty,
            cancel,
        )?;

        self.persist_block(&block)?;
        self.set_tip(block.get_hash())?;
        info!("Mined block {}", HEXLOWER.encode(block.get_hash()));
        Ok(block)
    }

    /// Validate a block received from a peer before storing it.
    pub fn validate_incoming_block(&self, block: &Block) -> Result<()> {
        if !ProofOfWork::validate(block) {
            return Err(NodeError::InvalidBlock(format!(
                "Proof-of-work check failed for {}",
                HEXLOWER.encode(block.get_hash())
            )));
        }
        match block.get_transactions().first() {
            Some(first) if first.is_coinbase() => Ok(()),
            _ => Err(NodeError::InvalidBlock(
                "Block does not lead with a coinbase".to_string(),
            )),
        }
    }

    // Reject two inputs in the same block spending the same output.
    fn check_for_double_spending(transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(Vec<u8>, i32)> = HashSet::new();

        for transaction in transactions {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                let reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_outputs.insert(reference) {
                    return Err(NodeError::InvalidBlock(format!(
                        "Output {}:{} spent twice in one block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flush pending writes; called from the shutdown path.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| NodeError::Store(format!("Failed to flush store: {e}")))?;
        Ok(())
    }
}

/// Backward cursor over the chain, borrowing the store. Finite and
/// non-restartable: it ends at the block with an empty previous hash.
pub struct BlockchainIterator<'a> {
    db: &'a Db,
    current_hash: Vec<u8>,
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }
        let data = self.db.get(self.current_hash.as_slice()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_prev_block_hash().to_vec();
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    fn test_chain(dir: &tempfile::TempDir) -> (Blockchain, Wallet) {
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            dir.path().join("chain").to_str().unwrap(),
        )
        .unwrap();
        (blockchain, wallet)
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempdir().unwrap();
        let (blockchain, wallet) = test_chain(&dir);
        let tip = blockchain.get_tip_hash();
        drop(blockchain);

        let reopened = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            dir.path().join("chain").to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(reopened.get_tip_hash(), tip);
        assert_eq!(reopened.best_height(), 0);
    }

    #[test]
    fn test_empty_store_has_no_head() {
        let dir = tempdir().unwrap();
        let blockchain =
            Blockchain::open_blockchain_with_path(dir.path().join("empty").to_str().unwrap())
                .unwrap();
        assert!(blockchain.is_empty());
        assert_eq!(blockchain.best_height(), 0);
        assert!(matches!(
            blockchain.last_block(),
            Err(NodeError::BlockNotFound(_))
        ));
        assert_eq!(blockchain.iterator().count(), 0);
        assert!(blockchain.get_block_hashes().is_empty());
    }

    #[test]
    fn test_iterator_walks_head_to_genesis() {
        let dir = tempdir().unwrap();
        let (blockchain, wallet) = test_chain(&dir);
        for _ in 0..2 {
            let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
            blockchain
                .mine_block(&[coinbase], &AtomicBool::new(false))
                .unwrap();
        }

        let heights: Vec<i64> = blockchain.iterator().map(|b| b.get_height()).collect();
        assert_eq!(heights, vec![2, 1, 0]);

        let hashes = blockchain.get_block_hashes();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[0], blockchain.get_tip_hash());
    }

    #[test]
    fn test_find_transaction_scans_whole_chain() {
        let dir = tempdir().unwrap();
        let (blockchain, wallet) = test_chain(&dir);
        let genesis_tx = blockchain.last_block().unwrap().get_transactions()[0].clone();

        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
        blockchain
            .mine_block(&[coinbase.clone()], &AtomicBool::new(false))
            .unwrap();

        assert_eq!(
            blockchain.find_transaction(coinbase.get_id()).unwrap(),
            coinbase
        );
        assert_eq!(
            blockchain.find_transaction(genesis_tx.get_id()).unwrap(),
            genesis_tx
        );
        assert!(blockchain.find_transaction(&[0u8; 32]).is_none());
    }

    #[test]
    fn test_mine_block_rejects_missing_coinbase() {
        let dir = tempdir().unwrap();
        let (blockchain, wallet) = test_chain(&dir);

        let result = blockchain.mine_block(&[], &AtomicBool::new(false));
        assert!(result.is_err());
        // height unchanged after the rejection
        assert_eq!(blockchain.best_height(), 0);

        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
        blockchain
            .mine_block(&[coinbase], &AtomicBool::new(false))
            .unwrap();
        assert_eq!(blockchain.best_height(), 1);
    }

    #[test]
    fn test_mine_block_rejects_in_block_double_spend() {
        let dir = tempdir().unwrap();
        let (blockchain, wallet) = test_chain(&dir);
        let recipient = Wallet::new().unwrap();

        let utxo_set = crate::storage::UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();

        // two transactions built against the same snapshot spend the same
        // genesis output
        let tx1 = Transaction::new_utxo_transaction(&wallet, &recipient.get_address(), 2, &utxo_set)
            .unwrap();
        let tx2 = Transaction::new_utxo_transaction(&wallet, &recipient.get_address(), 3, &utxo_set)
            .unwrap();

        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
        let result = blockchain.mine_block(&[coinbase, tx1, tx2], &AtomicBool::new(false));
        assert!(matches!(result, Err(NodeError::InvalidBlock(_))));
    }

    #[test]
    fn test_validate_incoming_block_rejects_tampering() {
        let dir = tempdir().unwrap();
        let (blockchain, wallet) = test_chain(&dir);
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
        let block = blockchain
            .mine_block(&[coinbase], &AtomicBool::new(false))
            .unwrap();
        assert!(blockchain.validate_incoming_block(&block).is_ok());

        let mut tampered = block.clone();
        tampered.set_nonce_for_test(block.get_nonce().wrapping_add(1));
        if blockchain.validate_incoming_block(&tampered).is_ok() {
            tampered.set_nonce_for_test(block.get_nonce().wrapping_add(2));
        }
        assert!(blockchain.validate_incoming_block(&tampered).is_err());
    }
}
