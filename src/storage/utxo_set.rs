use crate::core::{Block, Blockchain, TXOutput, TXOutputs};
use crate::error::{NodeError, Result};
use data_encoding::HEXLOWER;
use std::collections::HashMap;

/// Key prefix separating the UTXO projection from block data in the
/// shared store.
const UTXO_PREFIX: &[u8] = b"utxo-";

/// Keys deleted per batch during a reindex.
const DELETE_BATCH_SIZE: usize = 100_000;

/// The derived UTXO index: `utxo-<txid>` maps to the serialized list of
/// that transaction's still-unspent outputs. Rebuilt by `reindex`, kept
/// current by `update` on every chain-tip extension.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn utxo_key(txid: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(UTXO_PREFIX.len() + txid.len());
        key.extend_from_slice(UTXO_PREFIX);
        key.extend_from_slice(txid);
        key
    }

    /// Gather spendable outputs for `pub_key_hash` until `amount` is
    /// covered. Returns the accumulated value and the selected output
    /// indexes per transaction.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: i64,
    ) -> Result<(i64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;

        for item in self.blockchain.db().scan_prefix(UTXO_PREFIX) {
            let (key, value) = item
                .map_err(|e| NodeError::Store(format!("Failed to scan UTXO index: {e}")))?;
            let txid_hex = HEXLOWER.encode(&key.as_ref()[UTXO_PREFIX.len()..]);
            let outs = TXOutputs::deserialize(value.as_ref())?;

            for (idx, out) in outs.outputs.iter().enumerate() {
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(idx);
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// All unspent outputs locked to `pub_key_hash`.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];

        for item in self.blockchain.db().scan_prefix(UTXO_PREFIX) {
            let (_, value) = item
                .map_err(|e| NodeError::Store(format!("Failed to scan UTXO index: {e}")))?;
            let outs = TXOutputs::deserialize(value.as_ref())?;
            for out in outs.outputs {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out);
                }
            }
        }
        Ok(utxos)
    }

    /// Number of transactions with at least one unspent output.
    pub fn count_transactions(&self) -> Result<u64> {
        let mut counter = 0;
        for item in self.blockchain.db().scan_prefix(UTXO_PREFIX) {
            item.map_err(|e| NodeError::Store(format!("Failed to scan UTXO index: {e}")))?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Drop the whole projection and rebuild it from a full chain walk.
    pub fn reindex(&self) -> Result<()> {
        let _guard = self.blockchain.lock_writes();

        self.delete_by_prefix()?;

        let utxo_map = self.blockchain.find_utxo();
        let db = self.blockchain.db();
        for (txid_hex, outs) in &utxo_map {
            if outs.outputs.is_empty() {
                continue;
            }
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| NodeError::Serialization(format!("Invalid transaction id: {e}")))?;
            db.insert(Self::utxo_key(&txid), outs.serialize()?)
                .map_err(|e| NodeError::Store(format!("Failed to write UTXO entry: {e}")))?;
        }
        Ok(())
    }

    /// Fold one freshly appended block into the projection: inputs consume
    /// entries, outputs create them.
    pub fn update(&self, block: &Block) -> Result<()> {
        let _guard = self.blockchain.lock_writes();
        let db = self.blockchain.db();

        for tx in block.get_transactions() {
            if !tx.is_coinbase() {
                for vin in tx.get_vin() {
                    let key = Self::utxo_key(vin.get_txid());
                    let outs_bytes = db
                        .get(&key)
                        .map_err(|e| NodeError::Store(format!("Failed to read UTXO entry: {e}")))?
                        .ok_or_else(|| {
                            NodeError::Store(format!(
                                "UTXO entry missing for spent output {}:{}",
                                HEXLOWER.encode(vin.get_txid()),
                                vin.get_vout()
                            ))
                        })?;
                    let outs = TXOutputs::deserialize(outs_bytes.as_ref())?;

                    let remaining: Vec<TXOutput> = outs
                        .outputs
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| *idx as i32 != vin.get_vout())
                        .map(|(_, out)| out.clone())
                        .collect();

                    if remaining.is_empty() {
                        db.remove(&key).map_err(|e| {
                            NodeError::Store(format!("Failed to remove UTXO entry: {e}"))
                        })?;
                    } else {
                        let updated = TXOutputs { outputs: remaining };
                        db.insert(&key, updated.serialize()?).map_err(|e| {
                            NodeError::Store(format!("Failed to rewrite UTXO entry: {e}"))
                        })?;
                    }
                }
            }

            let new_outputs = TXOutputs {
                outputs: tx.get_vout().to_vec(),
            };
            db.insert(Self::utxo_key(tx.get_id()), new_outputs.serialize()?)
                .map_err(|e| NodeError::Store(format!("Failed to write UTXO entry: {e}")))?;
        }
        Ok(())
    }

    // Delete every projection key, collecting at most DELETE_BATCH_SIZE
    // keys per pass so a huge index never materializes in memory at once.
    fn delete_by_prefix(&self) -> Result<()> {
        let db = self.blockchain.db();
        loop {
            let mut keys = Vec::new();
            for item in db.scan_prefix(UTXO_PREFIX).take(DELETE_BATCH_SIZE) {
                let (key, _) = item
                    .map_err(|e| NodeError::Store(format!("Failed to scan UTXO index: {e}")))?;
                keys.push(key);
            }
            if keys.is_empty() {
                return Ok(());
            }
            let exhausted = keys.len() < DELETE_BATCH_SIZE;
            for key in keys {
                db.remove(key)
                    .map_err(|e| NodeError::Store(format!("Failed to delete UTXO entry: {e}")))?;
            }
            if exhausted {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::{hash_pub_key, Wallet};
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn indexed_chain(dir: &tempfile::TempDir) -> (Blockchain, UTXOSet, Wallet) {
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            dir.path().join("chain").to_str().unwrap(),
        )
        .unwrap();
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();
        (blockchain, utxo_set, wallet)
    }

    #[test]
    fn test_reindex_projects_genesis() {
        let dir = tempdir().unwrap();
        let (_, utxo_set, wallet) = indexed_chain(&dir);
        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
        let utxos = utxo_set.find_utxo(&pub_key_hash).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].get_value(), crate::core::SUBSIDY);
    }

    #[test]
    fn test_reindex_is_idempotent() {
        let dir = tempdir().unwrap();
        let (_, utxo_set, wallet) = indexed_chain(&dir);
        utxo_set.reindex().unwrap();
        utxo_set.reindex().unwrap();

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
        assert_eq!(utxo_set.find_utxo(&pub_key_hash).unwrap().len(), 1);
    }

    #[test]
    fn test_find_spendable_stops_at_amount() {
        let dir = tempdir().unwrap();
        let (blockchain, utxo_set, wallet) = indexed_chain(&dir);

        // three coinbases worth 10 each
        for _ in 0..2 {
            let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
            blockchain
                .mine_block(&[coinbase], &AtomicBool::new(false))
                .unwrap();
        }
        utxo_set.reindex().unwrap();

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, selected) =
            utxo_set.find_spendable_outputs(&pub_key_hash, 15).unwrap();
        // two outputs cover 15, the third is left alone
        assert_eq!(accumulated, 20);
        let picked: usize = selected.values().map(|outs| outs.len()).sum();
        assert_eq!(picked, 2);
    }

    #[test]
    fn test_find_spendable_reports_shortfall() {
        let dir = tempdir().unwrap();
        let (_, utxo_set, wallet) = indexed_chain(&dir);
        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, _) = utxo_set.find_spendable_outputs(&pub_key_hash, 100).unwrap();
        assert_eq!(accumulated, crate::core::SUBSIDY);
    }

    #[test]
    fn test_foreign_outputs_are_invisible() {
        let dir = tempdir().unwrap();
        let (_, utxo_set, _) = indexed_chain(&dir);
        let stranger = Wallet::new().unwrap();
        let pub_key_hash = hash_pub_key(stranger.get_public_key());

        assert!(utxo_set.find_utxo(&pub_key_hash).unwrap().is_empty());
        let (accumulated, selected) =
            utxo_set.find_spendable_outputs(&pub_key_hash, 1).unwrap();
        assert_eq!(accumulated, 0);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_update_consumes_spent_entry() {
        let dir = tempdir().unwrap();
        let (blockchain, utxo_set, wallet) = indexed_chain(&dir);
        let recipient = Wallet::new().unwrap();

        let tx = Transaction::new_utxo_transaction(&wallet, &recipient.get_address(), 10, &utxo_set)
            .unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
        let block = blockchain
            .mine_block(&[coinbase, tx], &AtomicBool::new(false))
            .unwrap();
        utxo_set.update(&block).unwrap();

        // the genesis coinbase was spent whole: its key is gone, and the
        // new entries cover exactly the transfer and the new coinbase
        assert_eq!(utxo_set.count_transactions().unwrap(), 2);
        let recipient_hash = hash_pub_key(recipient.get_public_key());
        let utxos = utxo_set.find_utxo(&recipient_hash).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].get_value(), 10);
    }
}
