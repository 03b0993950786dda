//! Chain provider seam.
//!
//! The API talks to the contract through [`Chain`], which combines what a
//! wallet provider offers (accounts, network, block number) with the contract
//! calls themselves.
//!
//! # Providers
//!
//! - [`LocalChain`]: the SQLite-backed [`Ledger`] behind a mutex
//! - [`OfflineChain`]: fails every call, which puts the API in fallback mode

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{ChainConfig, Config};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::model::{Call, Dataset, Experiment, NewDataset, NewExperiment, Portfolio, Receipt};
use crate::storage::Storage;
use crate::units::{Address, Wei};

/// What the provider reports about the network it is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    /// Network name.
    pub name: String,
    /// Chain id.
    pub chain_id: u64,
    /// Latest block number.
    pub block_number: u64,
    /// Address of the experiment-funding contract.
    pub contract_address: Address,
}

/// A wallet provider connected to the experiment-funding contract.
///
/// Every mutating call is sent from `from`; payable calls carry `amount`.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Network, chain id and current block.
    async fn network(&self) -> Result<NetworkInfo>;

    /// Accounts the provider can sign for.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Latest block number.
    async fn block_number(&self) -> Result<u64>;

    /// `createExperiment`.
    async fn create_experiment(&self, from: Address, args: NewExperiment)
        -> Result<(u64, Receipt)>;

    /// `fundExperiment`.
    async fn fund_experiment(&self, from: Address, id: u64, amount: Wei) -> Result<Receipt>;

    /// `uploadDataset`.
    async fn upload_dataset(&self, from: Address, args: NewDataset) -> Result<(u64, Receipt)>;

    /// `nftizeDataset`.
    async fn nftize_dataset(&self, from: Address, id: u64, token_uri: String) -> Result<Receipt>;

    /// `purchaseDataAccess`.
    async fn purchase_data_access(&self, from: Address, id: u64, amount: Wei) -> Result<Receipt>;

    /// `citeDataset`.
    async fn cite_dataset(&self, from: Address, citing_id: u64, cited_id: u64) -> Result<Receipt>;

    /// `getExperiment`.
    async fn experiment(&self, id: u64) -> Result<Experiment>;

    /// Every experiment, in id order.
    async fn experiments(&self) -> Result<Vec<Experiment>>;

    /// `getDataset`.
    async fn dataset(&self, id: u64) -> Result<Dataset>;

    /// Every dataset, in id order.
    async fn datasets(&self) -> Result<Vec<Dataset>>;

    /// `getDatasetCitations`.
    async fn dataset_citations(&self, id: u64) -> Result<Vec<u64>>;

    /// `hasAccess`.
    async fn has_access(&self, id: u64, account: Address) -> Result<bool>;

    /// `ownerOf`.
    async fn owner_of(&self, token_id: u64) -> Result<Address>;

    /// `tokenURI`.
    async fn token_uri(&self, token_id: u64) -> Result<String>;

    /// `balanceOf`.
    async fn balance_of(&self, owner: Address) -> Result<u64>;

    /// Token ids held by an account, ascending.
    async fn tokens_of(&self, owner: Address) -> Result<Vec<u64>>;

    /// Projects, investments, datasets and tokens of an address.
    async fn portfolio(&self, address: Address) -> Result<Portfolio>;
}

/// Development accounts exposed by a local provider.
///
/// Derived from fixed labels, so every run sees the same addresses.
#[must_use]
pub fn dev_accounts(count: usize) -> Vec<Address> {
    (0..count)
        .map(|i| Address::derive(&format!("desci-dev-account-{i}")))
        .collect()
}

/// Create the chain provider described by the configuration.
///
/// A disabled chain yields an [`OfflineChain`] without touching the database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the contract address
/// is invalid.
pub fn create_chain(config: &Config) -> Result<Arc<dyn Chain>> {
    if !config.chain.enabled {
        info!("Chain disabled; API will serve fallback data");
        return Ok(Arc::new(OfflineChain::new("chain disabled in configuration")));
    }

    let storage = Storage::open(config.database_path())?;
    let ledger = Ledger::new(storage, config.ledger.limits());
    Ok(Arc::new(LocalChain::new(ledger, &config.chain)?))
}

/// The local ledger exposed as a chain.
#[derive(Debug, Clone)]
pub struct LocalChain {
    ledger: Arc<Mutex<Ledger>>,
    network_name: String,
    chain_id: u64,
    contract_address: Address,
    accounts: Vec<Address>,
}

impl LocalChain {
    /// Wrap a ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured contract address does not parse.
    pub fn new(ledger: Ledger, config: &ChainConfig) -> Result<Self> {
        Ok(Self {
            ledger: Arc::new(Mutex::new(ledger)),
            network_name: config.network_name.clone(),
            chain_id: config.chain_id,
            contract_address: config.contract_address.parse()?,
            accounts: dev_accounts(config.dev_accounts),
        })
    }

    /// Shared handle to the wrapped ledger.
    #[must_use]
    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    fn call(from: Address) -> Call {
        Call::new(from).at(Utc::now())
    }
}

#[async_trait]
impl Chain for LocalChain {
    fn name(&self) -> &str {
        "local"
    }

    async fn network(&self) -> Result<NetworkInfo> {
        let block_number = self.ledger.lock().await.block_number()?;
        Ok(NetworkInfo {
            name: self.network_name.clone(),
            chain_id: self.chain_id,
            block_number,
            contract_address: self.contract_address,
        })
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts.clone())
    }

    async fn block_number(&self) -> Result<u64> {
        self.ledger.lock().await.block_number()
    }

    async fn create_experiment(
        &self,
        from: Address,
        args: NewExperiment,
    ) -> Result<(u64, Receipt)> {
        debug!("createExperiment from {}", from);
        self.ledger
            .lock()
            .await
            .create_experiment(&Self::call(from), &args)
    }

    async fn fund_experiment(&self, from: Address, id: u64, amount: Wei) -> Result<Receipt> {
        debug!("fundExperiment({}) from {} with {} wei", id, from, amount);
        self.ledger
            .lock()
            .await
            .fund_experiment(&Self::call(from).with_value(amount), id)
    }

    async fn upload_dataset(&self, from: Address, args: NewDataset) -> Result<(u64, Receipt)> {
        debug!("uploadDataset from {}", from);
        self.ledger
            .lock()
            .await
            .upload_dataset(&Self::call(from), &args)
    }

    async fn nftize_dataset(&self, from: Address, id: u64, token_uri: String) -> Result<Receipt> {
        debug!("nftizeDataset({}) from {}", id, from);
        self.ledger
            .lock()
            .await
            .nftize_dataset(&Self::call(from), id, &token_uri)
    }

    async fn purchase_data_access(&self, from: Address, id: u64, amount: Wei) -> Result<Receipt> {
        debug!("purchaseDataAccess({}) from {} with {} wei", id, from, amount);
        self.ledger
            .lock()
            .await
            .purchase_data_access(&Self::call(from).with_value(amount), id)
    }

    async fn cite_dataset(&self, from: Address, citing_id: u64, cited_id: u64) -> Result<Receipt> {
        debug!("citeDataset({}, {}) from {}", citing_id, cited_id, from);
        self.ledger
            .lock()
            .await
            .cite_dataset(&Self::call(from), citing_id, cited_id)
    }

    async fn experiment(&self, id: u64) -> Result<Experiment> {
        self.ledger.lock().await.experiment(id)
    }

    async fn experiments(&self) -> Result<Vec<Experiment>> {
        self.ledger.lock().await.experiments()
    }

    async fn dataset(&self, id: u64) -> Result<Dataset> {
        self.ledger.lock().await.dataset(id)
    }

    async fn datasets(&self) -> Result<Vec<Dataset>> {
        self.ledger.lock().await.datasets()
    }

    async fn dataset_citations(&self, id: u64) -> Result<Vec<u64>> {
        self.ledger.lock().await.dataset_citations(id)
    }

    async fn has_access(&self, id: u64, account: Address) -> Result<bool> {
        self.ledger.lock().await.has_access(id, &account)
    }

    async fn owner_of(&self, token_id: u64) -> Result<Address> {
        self.ledger.lock().await.owner_of(token_id)
    }

    async fn token_uri(&self, token_id: u64) -> Result<String> {
        self.ledger.lock().await.token_uri(token_id)
    }

    async fn balance_of(&self, owner: Address) -> Result<u64> {
        self.ledger.lock().await.balance_of(&owner)
    }

    async fn tokens_of(&self, owner: Address) -> Result<Vec<u64>> {
        self.ledger.lock().await.tokens_of(&owner)
    }

    async fn portfolio(&self, address: Address) -> Result<Portfolio> {
        self.ledger.lock().await.portfolio(&address, Utc::now())
    }
}

/// A provider that cannot reach any chain.
#[derive(Debug, Clone)]
pub struct OfflineChain {
    reason: String,
}

impl OfflineChain {
    /// Create an offline provider failing with `reason`.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable<T>(&self) -> Result<T> {
        Err(Error::chain_unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl Chain for OfflineChain {
    fn name(&self) -> &str {
        "offline"
    }

    async fn network(&self) -> Result<NetworkInfo> {
        self.unavailable()
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.unavailable()
    }

    async fn block_number(&self) -> Result<u64> {
        self.unavailable()
    }

    async fn create_experiment(&self, _: Address, _: NewExperiment) -> Result<(u64, Receipt)> {
        self.unavailable()
    }

    async fn fund_experiment(&self, _: Address, _: u64, _: Wei) -> Result<Receipt> {
        self.unavailable()
    }

    async fn upload_dataset(&self, _: Address, _: NewDataset) -> Result<(u64, Receipt)> {
        self.unavailable()
    }

    async fn nftize_dataset(&self, _: Address, _: u64, _: String) -> Result<Receipt> {
        self.unavailable()
    }

    async fn purchase_data_access(&self, _: Address, _: u64, _: Wei) -> Result<Receipt> {
        self.unavailable()
    }

    async fn cite_dataset(&self, _: Address, _: u64, _: u64) -> Result<Receipt> {
        self.unavailable()
    }

    async fn experiment(&self, _: u64) -> Result<Experiment> {
        self.unavailable()
    }

    async fn experiments(&self) -> Result<Vec<Experiment>> {
        self.unavailable()
    }

    async fn dataset(&self, _: u64) -> Result<Dataset> {
        self.unavailable()
    }

    async fn datasets(&self) -> Result<Vec<Dataset>> {
        self.unavailable()
    }

    async fn dataset_citations(&self, _: u64) -> Result<Vec<u64>> {
        self.unavailable()
    }

    async fn has_access(&self, _: u64, _: Address) -> Result<bool> {
        self.unavailable()
    }

    async fn owner_of(&self, _: u64) -> Result<Address> {
        self.unavailable()
    }

    async fn token_uri(&self, _: u64) -> Result<String> {
        self.unavailable()
    }

    async fn balance_of(&self, _: Address) -> Result<u64> {
        self.unavailable()
    }

    async fn tokens_of(&self, _: Address) -> Result<Vec<u64>> {
        self.unavailable()
    }

    async fn portfolio(&self, _: Address) -> Result<Portfolio> {
        self.unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_chain() -> LocalChain {
        LocalChain::new(Ledger::open_in_memory().unwrap(), &ChainConfig::default()).unwrap()
    }

    fn experiment_args() -> NewExperiment {
        NewExperiment {
            title: "CRISPR Gene Therapy".to_string(),
            description: "Off-target effects in hepatocytes".to_string(),
            funding_goal: Wei::from_ether(2),
            duration_days: 14,
        }
    }

    #[test]
    fn test_dev_accounts_are_stable_and_distinct() {
        let accounts = dev_accounts(5);
        assert_eq!(accounts.len(), 5);
        assert_eq!(accounts, dev_accounts(5));

        let mut unique = accounts.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn test_local_network_info() {
        let chain = local_chain();
        let network = chain.network().await.unwrap();

        assert_eq!(network.name, "localhost");
        assert_eq!(network.chain_id, 31_337);
        assert_eq!(network.block_number, 0);
        assert_eq!(chain.accounts().await.unwrap().len(), 5);
        assert_eq!(chain.name(), "local");
    }

    #[tokio::test]
    async fn test_local_create_and_fund() {
        let chain = local_chain();
        let accounts = chain.accounts().await.unwrap();

        let (id, receipt) = chain
            .create_experiment(accounts[0], experiment_args())
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(receipt.block_number, 1);

        chain
            .fund_experiment(accounts[1], id, Wei::from_ether(2))
            .await
            .unwrap();

        let experiment = chain.experiment(id).await.unwrap();
        assert!(experiment.funding_complete);
        assert_eq!(experiment.contributors, vec![accounts[1]]);
        assert_eq!(chain.block_number().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_local_dataset_flow() {
        let chain = local_chain();
        let accounts = chain.accounts().await.unwrap();
        let (experiment_id, _) = chain
            .create_experiment(accounts[0], experiment_args())
            .await
            .unwrap();

        let (dataset_id, _) = chain
            .upload_dataset(
                accounts[0],
                NewDataset {
                    experiment_id,
                    title: "Sequencing reads".to_string(),
                    description: "FASTQ files".to_string(),
                    data_uri: "ipfs://QmReads".to_string(),
                    access_price: Wei::from_ether(1),
                    is_open_access: false,
                },
            )
            .await
            .unwrap();
        chain
            .nftize_dataset(accounts[0], dataset_id, "ipfs://QmMeta".to_string())
            .await
            .unwrap();
        chain
            .purchase_data_access(accounts[2], dataset_id, Wei::from_ether(1))
            .await
            .unwrap();

        assert_eq!(chain.owner_of(dataset_id).await.unwrap(), accounts[0]);
        assert_eq!(chain.token_uri(dataset_id).await.unwrap(), "ipfs://QmMeta");
        assert_eq!(chain.balance_of(accounts[0]).await.unwrap(), 1);
        assert_eq!(chain.tokens_of(accounts[0]).await.unwrap(), vec![dataset_id]);
        assert_eq!(chain.balance_of(accounts[2]).await.unwrap(), 0);
        assert!(chain.token_uri(dataset_id + 1).await.unwrap_err().is_not_found());
        assert!(chain.has_access(dataset_id, accounts[2]).await.unwrap());
        assert!(!chain.has_access(dataset_id, accounts[3]).await.unwrap());

        let portfolio = chain.portfolio(accounts[0]).await.unwrap();
        assert_eq!(portfolio.tokens, vec![dataset_id]);
        assert_eq!(portfolio.earnings, Wei::from_ether(1));
    }

    #[tokio::test]
    async fn test_local_chain_surfaces_contract_errors() {
        let chain = local_chain();
        let accounts = chain.accounts().await.unwrap();

        let err = chain
            .fund_experiment(accounts[0], 42, Wei::new(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_offline_chain_fails_everything() {
        let chain = OfflineChain::new("no provider");

        assert!(chain.network().await.unwrap_err().is_chain_unavailable());
        assert!(chain.accounts().await.unwrap_err().is_chain_unavailable());
        assert!(chain.experiments().await.unwrap_err().is_chain_unavailable());
        let err = chain
            .create_experiment(Address::ZERO, experiment_args())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no provider"));
    }

    #[test]
    fn test_create_chain_disabled_is_offline() {
        let mut config = Config::default();
        config.chain.enabled = false;
        config.storage.database_path = Some("/nonexistent/never/opened.db".into());

        let chain = create_chain(&config).unwrap();
        assert_eq!(chain.name(), "offline");
    }

    #[test]
    fn test_create_chain_enabled_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("ledger.db"));

        let chain = create_chain(&config).unwrap();
        assert_eq!(chain.name(), "local");
        assert!(dir.path().join("ledger.db").exists());
    }
}
