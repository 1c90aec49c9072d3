use crate::config::GLOBAL_CONFIG;
use crate::error::{NodeError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// The persisted wallet collection for one node, keyed by address.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    file: PathBuf,
}

impl Wallets {
    /// Open the wallet file for the configured `NODE_ID`.
    pub fn new() -> Result<Wallets> {
        Ok(Self::with_file(GLOBAL_CONFIG.wallet_file()?))
    }

    /// Open a wallet collection at an explicit path.
    pub fn with_file(path: impl Into<PathBuf>) -> Wallets {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            file: path.into(),
        };
        wallets.load_from_file();
        wallets
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) {
        // A missing or unreadable file just means an empty collection.
        if let Err(e) = self.load_from_file_inner() {
            log::warn!("Could not load wallets from file: {e}");
        }
    }

    fn load_from_file_inner(&mut self) -> Result<()> {
        if !self.file.exists() {
            return Ok(());
        }

        let mut file = File::open(&self.file)?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)?;
        self.wallets = deserialize(&buf[..])?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            if parent != Path::new("") {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.file)
            .map_err(|e| NodeError::Wallet(format!("Could not open wallet file: {e}")))?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}
