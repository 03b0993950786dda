//! `desci` - Crowdfunding for experiments and a market for their data
//!
//! This library holds the research funding contract (experiments, datasets,
//! dataset NFTs, paid access and citations), the SQLite ledger it runs on, the
//! chain provider seam and the REST API served on top of it.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod storage;
pub mod units;

pub use chain::{Chain, LocalChain, OfflineChain};
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerLimits};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
pub use units::{Address, TxHash, Wei};
