//! Configuration management
//!
//! Process-level configuration resolved once at startup: the required
//! `NODE_ID` environment variable and the store, wallet and ports paths
//! derived from it.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
