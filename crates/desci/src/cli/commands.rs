//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::api::DEFAULT_DURATION_DAYS;
use crate::units::{Address, Wei};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Interface to bind (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Experiment commands.
#[derive(Debug, Subcommand)]
pub enum ExperimentCommand {
    /// Create a crowdfunded experiment
    Create {
        /// Short title
        #[arg(short, long)]
        title: String,

        /// What the experiment is about
        #[arg(short, long)]
        description: String,

        /// Funding goal in ether
        #[arg(short, long, value_parser = parse_ether)]
        goal: Wei,

        /// Length of the funding period in days
        #[arg(long, default_value_t = DEFAULT_DURATION_DAYS)]
        duration_days: u32,

        /// Sending account (defaults to the first development account)
        #[arg(long)]
        from: Option<Address>,
    },

    /// Contribute to an experiment
    Fund {
        /// Experiment id
        id: u64,

        /// Amount in ether
        #[arg(short, long, value_parser = parse_ether)]
        amount: Wei,

        /// Sending account
        #[arg(long)]
        from: Option<Address>,
    },

    /// Show one experiment
    Show {
        /// Experiment id
        id: u64,
    },

    /// List all experiments
    List,
}

/// Dataset commands.
#[derive(Debug, Subcommand)]
pub enum DatasetCommand {
    /// Upload a dataset to one of your experiments
    Upload {
        /// Experiment the dataset belongs to
        #[arg(short, long)]
        experiment: u64,

        /// Short title
        #[arg(short, long)]
        title: String,

        /// Description of the data
        #[arg(short, long, default_value = "")]
        description: String,

        /// Where the data lives (e.g. ipfs://...)
        #[arg(short, long)]
        uri: String,

        /// Price of read access in ether
        #[arg(short, long, value_parser = parse_ether, default_value = "0")]
        price: Wei,

        /// Let anyone read the data
        #[arg(long)]
        open_access: bool,

        /// Sending account
        #[arg(long)]
        from: Option<Address>,
    },

    /// Mint a dataset as an NFT
    Nftize {
        /// Dataset id
        id: u64,

        /// Metadata URI of the token
        #[arg(long)]
        token_uri: String,

        /// Sending account
        #[arg(long)]
        from: Option<Address>,
    },

    /// Buy read access to a dataset
    Purchase {
        /// Dataset id
        id: u64,

        /// Amount in ether (defaults to the access price)
        #[arg(short, long, value_parser = parse_ether)]
        amount: Option<Wei>,

        /// Sending account
        #[arg(long)]
        from: Option<Address>,
    },

    /// Record that one dataset cites another
    Cite {
        /// The citing dataset
        citing: u64,

        /// The cited dataset
        cited: u64,

        /// Sending account
        #[arg(long)]
        from: Option<Address>,
    },

    /// Show one dataset
    Show {
        /// Dataset id
        id: u64,
    },

    /// List all datasets
    List,

    /// List the datasets citing a dataset
    Citations {
        /// Dataset id
        id: u64,
    },

    /// Check whether an account can read a dataset
    Access {
        /// Dataset id
        id: u64,

        /// Account to check
        account: Address,
    },
}

/// Dataset NFT queries.
#[derive(Debug, Subcommand)]
pub enum NftCommand {
    /// Show the holder and metadata URI of a token
    Show {
        /// Token id (the dataset id)
        id: u64,
    },

    /// List the tokens held by an account
    List {
        /// Holder address
        address: Address,
    },
}

/// Portfolio command arguments.
#[derive(Debug, Args)]
pub struct PortfolioCommand {
    /// Address to describe
    pub address: Address,
}

/// Events command arguments.
#[derive(Debug, Args)]
pub struct EventsCommand {
    /// Number of most recent events to show
    #[arg(short, long, default_value = "20")]
    pub last: usize,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Parse an ether amount given on the command line.
fn parse_ether(s: &str) -> Result<Wei, String> {
    Wei::parse_ether(s).map_err(|e| e.to_string())
}
