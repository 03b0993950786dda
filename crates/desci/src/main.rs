//! `desci` - CLI for the research funding ledger
//!
//! This binary serves the REST API and calls the contract directly against
//! the local ledger database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;

use desci::api::{
    self, AccessView, AppState, CitationsView, DatasetView, ExperimentView, NftsView,
    PortfolioView, TokenView,
};
use desci::chain::{create_chain, dev_accounts};
use desci::cli::{
    Cli, Command, ConfigCommand, DatasetCommand, EventsCommand, ExperimentCommand, NftCommand,
    ServeCommand,
};
use desci::model::{Call, NewDataset, NewExperiment, Receipt};
use desci::units::Address;
use desci::{init_logging, Config, Ledger, Storage};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;
    let json = cli.json;

    // Execute the command
    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, &serve_cmd),
        Command::Experiment(cmd) => handle_experiment(&config, cmd, json),
        Command::Dataset(cmd) => handle_dataset(&config, cmd, json),
        Command::Nft(cmd) => handle_nft(&config, cmd, json),
        Command::Portfolio(cmd) => {
            let ledger = open_ledger(&config)?;
            let portfolio = PortfolioView::from(ledger.portfolio(&cmd.address, Utc::now())?);
            print_portfolio(&portfolio, json)
        }
        Command::Accounts => handle_accounts(&config, json),
        Command::Events(cmd) => handle_events(&config, &cmd, json),
        Command::Status => handle_status(&config, json),
        Command::Config(cmd) => handle_config(&config, cmd, json),
    }
}

fn handle_serve(mut config: Config, cmd: &ServeCommand) -> Result<()> {
    if let Some(host) = &cmd.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(async {
        let chain = create_chain(&config)?;
        let state = AppState::new(chain, config.server.environment);
        api::serve(state, &config.bind_address()).await
    })?;
    Ok(())
}

fn handle_experiment(config: &Config, cmd: ExperimentCommand, json: bool) -> Result<()> {
    let ledger = open_ledger(config)?;
    let contract = config.contract_address()?;

    match cmd {
        ExperimentCommand::Create {
            title,
            description,
            goal,
            duration_days,
            from,
        } => {
            let call = Call::new(sender(config, from)?);
            let (id, receipt) = ledger.create_experiment(
                &call,
                &NewExperiment {
                    title,
                    description,
                    funding_goal: goal,
                    duration_days,
                },
            )?;
            print_receipt(&receipt, &format!("Created experiment {id}"), json)
        }
        ExperimentCommand::Fund { id, amount, from } => {
            let call = Call::new(sender(config, from)?).with_value(amount);
            let receipt = ledger.fund_experiment(&call, id)?;
            let message = format!("Funded experiment {id} with {} ETH", amount.format_ether());
            print_receipt(&receipt, &message, json)
        }
        ExperimentCommand::Show { id } => {
            let view = ExperimentView::from_chain(&ledger.experiment(id)?, contract, Utc::now());
            if json {
                return print_json(&view);
            }
            print_experiment(&view);
            println!("  Datasets:    {:?}", ledger.experiment_datasets(id)?);
            Ok(())
        }
        ExperimentCommand::List => {
            let now = Utc::now();
            let views: Vec<ExperimentView> = ledger
                .experiments()?
                .iter()
                .map(|experiment| ExperimentView::from_chain(experiment, contract, now))
                .collect();
            if json {
                return print_json(&views);
            }
            if views.is_empty() {
                println!("No experiments yet.");
            } else {
                println!("{} experiment(s)", ledger.total_experiments()?);
            }
            for view in &views {
                println!(
                    "#{:<4} {:<40} {:>10} / {:<10} ETH  {:>3}%  {:?}",
                    view.id,
                    view.title,
                    view.funding_raised,
                    view.funding_goal,
                    view.progress,
                    view.status
                );
            }
            Ok(())
        }
    }
}

fn handle_dataset(config: &Config, cmd: DatasetCommand, json: bool) -> Result<()> {
    let ledger = open_ledger(config)?;

    match cmd {
        DatasetCommand::Upload {
            experiment,
            title,
            description,
            uri,
            price,
            open_access,
            from,
        } => {
            let call = Call::new(sender(config, from)?);
            let (id, receipt) = ledger.upload_dataset(
                &call,
                &NewDataset {
                    experiment_id: experiment,
                    title,
                    description,
                    data_uri: uri,
                    access_price: price,
                    is_open_access: open_access,
                },
            )?;
            print_receipt(&receipt, &format!("Uploaded dataset {id}"), json)
        }
        DatasetCommand::Nftize {
            id,
            token_uri,
            from,
        } => {
            let call = Call::new(sender(config, from)?);
            let receipt = ledger.nftize_dataset(&call, id, &token_uri)?;
            print_receipt(&receipt, &format!("Minted dataset {id} as token {id}"), json)
        }
        DatasetCommand::Purchase { id, amount, from } => {
            let amount = match amount {
                Some(amount) => amount,
                None => ledger.dataset(id)?.access_price,
            };
            let call = Call::new(sender(config, from)?).with_value(amount);
            let receipt = ledger.purchase_data_access(&call, id)?;
            print_receipt(
                &receipt,
                &format!(
                    "Bought access to dataset {id} for {} ETH",
                    amount.format_ether()
                ),
                json,
            )
        }
        DatasetCommand::Cite {
            citing,
            cited,
            from,
        } => {
            let call = Call::new(sender(config, from)?);
            let receipt = ledger.cite_dataset(&call, citing, cited)?;
            print_receipt(
                &receipt,
                &format!("Dataset {citing} now cites dataset {cited}"),
                json,
            )
        }
        DatasetCommand::Show { id } => {
            let view = DatasetView::from(ledger.dataset(id)?);
            if json {
                return print_json(&view);
            }
            print_dataset(&view);
            Ok(())
        }
        DatasetCommand::List => {
            let views: Vec<DatasetView> = ledger.datasets()?.into_iter().map(Into::into).collect();
            if json {
                return print_json(&views);
            }
            if views.is_empty() {
                println!("No datasets yet.");
            } else {
                println!("{} dataset(s)", ledger.total_datasets()?);
            }
            for view in &views {
                println!(
                    "#{:<4} {:<40} experiment {:<4} {:>8} ETH  {} citation(s){}",
                    view.id,
                    view.title,
                    view.experiment_id,
                    view.access_price,
                    view.citation_count,
                    if view.is_nftized { "  [NFT]" } else { "" }
                );
            }
            Ok(())
        }
        DatasetCommand::Citations { id } => {
            let citations = ledger.dataset_citations(id)?;
            let view = CitationsView {
                dataset_id: id,
                citation_count: citations.len() as u64,
                citations,
            };
            if json {
                return print_json(&view);
            }
            println!("Dataset {} has {} citation(s)", id, view.citation_count);
            for citing in &view.citations {
                println!("  cited by dataset {citing}");
            }
            Ok(())
        }
        DatasetCommand::Access { id, account } => {
            let view = AccessView {
                dataset_id: id,
                account,
                has_access: ledger.has_access(id, &account)?,
            };
            if json {
                return print_json(&view);
            }
            let verdict = if view.has_access { "can" } else { "cannot" };
            println!("{account} {verdict} read dataset {id}");
            Ok(())
        }
    }
}

fn handle_nft(config: &Config, cmd: NftCommand, json: bool) -> Result<()> {
    let ledger = open_ledger(config)?;
    let token = |id: u64| -> desci::Result<TokenView> {
        Ok(TokenView {
            token_id: id,
            owner: ledger.owner_of(id)?,
            token_uri: ledger.token_uri(id)?,
        })
    };

    match cmd {
        NftCommand::Show { id } => {
            let view = token(id)?;
            if json {
                return print_json(&view);
            }
            println!("Token #{}", view.token_id);
            println!("  Owner: {}", view.owner);
            println!("  URI:   {}", view.token_uri);
            Ok(())
        }
        NftCommand::List { address } => {
            let view = NftsView {
                address,
                balance: ledger.balance_of(&address)?,
                tokens: ledger
                    .tokens_of(&address)?
                    .into_iter()
                    .map(token)
                    .collect::<desci::Result<_>>()?,
            };
            if json {
                return print_json(&view);
            }
            println!("{} holds {} token(s)", view.address, view.balance);
            for token in &view.tokens {
                println!("  #{:<4} {}", token.token_id, token.token_uri);
            }
            Ok(())
        }
    }
}

fn handle_accounts(config: &Config, json: bool) -> Result<()> {
    let accounts = dev_accounts(config.chain.dev_accounts);
    if json {
        return print_json(&serde_json::json!({ "accounts": accounts }));
    }
    for (i, account) in accounts.iter().enumerate() {
        println!("{i:>2}  {account}");
    }
    Ok(())
}

fn handle_events(config: &Config, cmd: &EventsCommand, json: bool) -> Result<()> {
    let ledger = open_ledger(config)?;
    let events = ledger.recent_events(cmd.last)?;
    if json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No events yet.");
    }
    for event in &events {
        println!(
            "block {:<6} {:<22} {}  {}",
            event.block_number, event.kind, event.tx_hash, event.payload
        );
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let storage = Storage::open(config.database_path())?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "network": config.chain.network_name,
            "chain_id": config.chain.chain_id,
            "chain_enabled": config.chain.enabled,
            "stats": stats,
        });
        return print_json(&status);
    }

    println!("desci status");
    println!("------------");
    println!("Database:      {}", config.database_path().display());
    println!(
        "Network:       {} (chain id {}){}",
        config.chain.network_name,
        config.chain.chain_id,
        if config.chain.enabled { "" } else { ", disabled" }
    );
    println!("Block number:  {}", stats.block_number);
    println!("Experiments:   {}", stats.experiments);
    println!("Datasets:      {}", stats.datasets);
    println!("Tokens:        {}", stats.tokens);
    println!("Events:        {}", stats.events);
    println!("Size:          {} bytes", stats.db_size_bytes);
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand, json: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            if json {
                return print_json(config);
            }
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[Storage]");
            println!("  Database path:      {}", config.database_path().display());
            println!();
            println!("[Ledger]");
            println!("  Max duration (days): {}", config.ledger.max_duration_days);
            println!("  Max title length:    {}", config.ledger.max_title_length);
            println!(
                "  Max description:     {}",
                config.ledger.max_description_length
            );
            println!();
            println!("[Chain]");
            println!("  Enabled:            {}", config.chain.enabled);
            println!("  Network:            {}", config.chain.network_name);
            println!("  Chain id:           {}", config.chain.chain_id);
            println!("  Contract:           {}", config.chain.contract_address);
            println!("  Dev accounts:       {}", config.chain.dev_accounts);
            println!();
            println!("[Server]");
            println!("  Bind address:       {}", config.bind_address());
            println!("  Environment:        {}", config.server.environment);
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn open_ledger(config: &Config) -> Result<Ledger> {
    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("failed to open ledger at {}", path.display()))?;
    Ok(Ledger::new(storage, config.ledger.limits()))
}

/// The explicit sender, or the first development account.
fn sender(config: &Config, from: Option<Address>) -> Result<Address> {
    match from {
        Some(from) => Ok(from),
        None => dev_accounts(config.chain.dev_accounts)
            .first()
            .copied()
            .context("no development accounts configured"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_receipt(receipt: &Receipt, message: &str, json: bool) -> Result<()> {
    if json {
        return print_json(receipt);
    }
    println!("{message}");
    println!("  tx:    {}", receipt.tx_hash);
    println!("  block: {}", receipt.block_number);
    Ok(())
}

fn print_experiment(view: &ExperimentView) {
    println!("Experiment #{}: {}", view.id, view.title);
    println!("  {}", view.description);
    if let Some(researcher) = view.researcher {
        println!("  Researcher:  {researcher}");
    }
    println!(
        "  Funding:     {} / {} ETH ({}%)",
        view.funding_raised, view.funding_goal, view.progress
    );
    println!("  Backers:     {}", view.backers);
    println!("  Status:      {:?}", view.status);
    if let Some(deadline) = view.deadline {
        println!("  Deadline:    {} ({} days left)", deadline, view.days_left);
    }
}

fn print_dataset(view: &DatasetView) {
    println!("Dataset #{}: {}", view.id, view.title);
    if !view.description.is_empty() {
        println!("  {}", view.description);
    }
    println!("  Experiment:  {}", view.experiment_id);
    println!("  Owner:       {}", view.owner);
    println!("  Data URI:    {}", view.data_uri);
    if view.is_open_access {
        println!("  Access:      open");
    } else {
        println!("  Access:      {} ETH", view.access_price);
    }
    if let Some(token_uri) = &view.token_uri {
        println!("  Token URI:   {token_uri}");
    }
    println!("  Citations:   {}", view.citation_count);
}

fn print_portfolio(view: &PortfolioView, json: bool) -> Result<()> {
    if json {
        return print_json(view);
    }
    println!("Portfolio of {}", view.address);
    println!();
    println!("Projects ({}):", view.projects.len());
    for project in &view.projects {
        println!(
            "  #{:<4} {:<40} {} / {} ETH  datasets {:?}",
            project.experiment_id,
            project.title,
            project.funding_raised,
            project.funding_goal,
            project.datasets
        );
    }
    println!("Investments ({}):", view.investments.len());
    for investment in &view.investments {
        println!(
            "  #{:<4} {:<40} {} ETH  {} citation(s)",
            investment.experiment_id, investment.title, investment.amount, investment.citations
        );
    }
    println!("Datasets owned:  {:?}", view.datasets);
    println!("Tokens held:     {:?}", view.tokens);
    println!("Access bought:   {:?}", view.purchased);
    println!("Access earnings: {} ETH", view.earnings);
    Ok(())
}
