use crate::error::{NodeError, Result};
use once_cell::sync::Lazy;
use std::env;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

const NODE_ID_ENV: &str = "NODE_ID";
const PORTS_FILE: &str = "./ports";
const DATA_DIR: &str = "./tmp";

/// Read-only process configuration. Mutable node state (known peers,
/// mempool, miner address) lives in `network::Node`.
pub struct Config {
    node_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        Config {
            node_id: env::var(NODE_ID_ENV).ok(),
        }
    }

    /// The node id, from the required `NODE_ID` environment variable.
    pub fn node_id(&self) -> Result<String> {
        self.node_id
            .clone()
            .ok_or_else(|| NodeError::Config("NODE_ID environment variable is not set".to_string()))
    }

    /// Block store directory for this node: `./tmp/blocks_<NODE_ID>/`.
    pub fn blocks_dir(&self) -> Result<String> {
        Ok(format!("{}/blocks_{}", DATA_DIR, self.node_id()?))
    }

    /// Wallet file for this node: `./tmp/wallets_<NODE_ID>.data`.
    pub fn wallet_file(&self) -> Result<String> {
        Ok(format!("{}/wallets_{}.data", DATA_DIR, self.node_id()?))
    }

    /// Newline-separated list of candidate TCP ports for peer discovery.
    pub fn ports_file(&self) -> &'static str {
        PORTS_FILE
    }
}
