//! Command-line interface for desci.
//!
//! This module provides the CLI structure for the `desci` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, DatasetCommand, EventsCommand, ExperimentCommand, NftCommand,
    PortfolioCommand, ServeCommand,
};

use crate::logging::Verbosity;

/// desci - Crowdfund experiments and trade the data they produce
///
/// Runs the research funding contract on a local ledger, serves it over a
/// REST API and lets you call it directly from the shell.
#[derive(Debug, Parser)]
#[command(name = "desci")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the REST API server
    Serve(ServeCommand),

    /// Create, fund and inspect experiments
    #[command(subcommand)]
    Experiment(ExperimentCommand),

    /// Upload, mint, buy and cite datasets
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// Look up dataset NFTs
    #[command(subcommand)]
    Nft(NftCommand),

    /// Show what an address created, funded and owns
    Portfolio(PortfolioCommand),

    /// List the development accounts
    Accounts,

    /// Show the most recent ledger events
    Events(EventsCommand),

    /// Show ledger status
    Status,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Address, Wei};
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            json: false,
            command: Command::Status,
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "desci");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["desci", "serve", "--port", "8080"]).unwrap();
        match cli.command {
            Command::Serve(serve) => {
                assert_eq!(serve.port, Some(8080));
                assert_eq!(serve.host, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_experiment_create() {
        let cli = Cli::try_parse_from([
            "desci",
            "experiment",
            "create",
            "--title",
            "Protein folding",
            "--description",
            "Folding at home",
            "--goal",
            "12.5",
        ])
        .unwrap();
        match cli.command {
            Command::Experiment(ExperimentCommand::Create {
                goal,
                duration_days,
                from,
                ..
            }) => {
                assert_eq!(goal, Wei::parse_ether("12.5").unwrap());
                assert_eq!(duration_days, 30);
                assert!(from.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_experiment_fund_with_sender() {
        let from = Address::derive("backer").to_string();
        let cli = Cli::try_parse_from([
            "desci",
            "experiment",
            "fund",
            "4",
            "--amount",
            "0.25",
            "--from",
            from.as_str(),
        ])
        .unwrap();
        match cli.command {
            Command::Experiment(ExperimentCommand::Fund { id, from, .. }) => {
                assert_eq!(id, 4);
                assert_eq!(from, Some(Address::derive("backer")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_amount() {
        let result =
            Cli::try_parse_from(["desci", "experiment", "fund", "1", "--amount", "lots"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_dataset_purchase_without_amount() {
        let cli = Cli::try_parse_from(["desci", "dataset", "purchase", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Dataset(DatasetCommand::Purchase {
                id: 2,
                amount: None,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_dataset_access() {
        let account = Address::derive("reader").to_string();
        let cli =
            Cli::try_parse_from(["desci", "dataset", "access", "1", account.as_str()]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Dataset(DatasetCommand::Access { id: 1, .. })
        ));
    }

    #[test]
    fn test_parse_nft_commands() {
        let cli = Cli::try_parse_from(["desci", "nft", "show", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Nft(NftCommand::Show { id: 3 })));

        let holder = Address::derive("holder");
        let cli =
            Cli::try_parse_from(["desci", "nft", "list", holder.to_string().as_str()]).unwrap();
        match cli.command {
            Command::Nft(NftCommand::List { address }) => assert_eq!(address, holder),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["desci", "nft", "list", "0x12"]).is_err());
    }

    #[test]
    fn test_parse_events() {
        let cli = Cli::try_parse_from(["desci", "events", "--last", "5"]).unwrap();
        match cli.command {
            Command::Events(events) => assert_eq!(events.last, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["desci", "-c", "/custom/config.toml", "status"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["desci", "status", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_with_quiet() {
        let args = vec!["desci", "-q", "accounts"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Accounts));
    }
}
