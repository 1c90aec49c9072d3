use crate::core::Transaction;
use data_encoding::HEXLOWER;
use std::collections::HashMap;
use std::sync::RwLock;

/// Verified, not-yet-mined transactions keyed by hex txid.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        self.inner
            .read()
            .expect("memory pool lock poisoned")
            .get(txid_hex)
            .cloned()
    }

    pub fn add(&self, tx: Transaction) {
        let txid_hex = HEXLOWER.encode(tx.get_id());
        self.inner
            .write()
            .expect("memory pool lock poisoned")
            .insert(txid_hex, tx);
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        self.inner
            .read()
            .expect("memory pool lock poisoned")
            .contains_key(txid_hex)
    }

    pub fn remove(&self, txid_hex: &str) {
        self.inner
            .write()
            .expect("memory pool lock poisoned")
            .remove(txid_hex);
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("memory pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("memory pool lock poisoned")
            .is_empty()
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.inner
            .read()
            .expect("memory pool lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

/// Block hashes announced by a peer but not yet fetched, kept in the
/// announcement order (head first, genesis last).
pub struct BlockInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    /// Replace the buffer with a fresh announcement.
    pub fn replace(&self, blocks: Vec<Vec<u8>>) {
        let mut inner = self.inner.write().expect("transit lock poisoned");
        *inner = blocks;
    }

    /// Pop the oldest outstanding hash (the genesis-most end), so fetched
    /// blocks arrive linkable by previous hash.
    pub fn take_oldest(&self) -> Option<Vec<u8>> {
        self.inner.write().expect("transit lock poisoned").pop()
    }

    pub fn clear(&self) {
        self.inner.write().expect("transit lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("transit lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("transit lock poisoned").is_empty()
    }
}
