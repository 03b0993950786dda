//! The experiment-funding contract.
//!
//! [`Ledger`] applies contract calls on top of [`Storage`]: every mutating call
//! is validated, applied inside a single transaction, advances the block
//! number, appends its events to the log and returns a [`Receipt`]. A call
//! that fails validation leaves no trace.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{
    Call, Dataset, EventKind, Experiment, Investment, LedgerEvent, NewDataset, NewExperiment,
    Portfolio, ProjectSummary, Receipt,
};
use crate::storage::Storage;
use crate::units::{Address, TxHash, Wei};

static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://\S+$").expect("URI pattern is valid")
});

/// Input limits enforced by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLimits {
    /// Longest funding period accepted.
    pub max_duration_days: u32,
    /// Longest title accepted, in characters.
    pub max_title_length: usize,
    /// Longest description accepted, in characters.
    pub max_description_length: usize,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_duration_days: 365,
            max_title_length: 200,
            max_description_length: 5_000,
        }
    }
}

/// The contract state and its rules.
#[derive(Debug)]
pub struct Ledger {
    storage: Storage,
    limits: LedgerLimits,
}

impl Ledger {
    /// Create a ledger over an opened storage.
    #[must_use]
    pub fn new(storage: Storage, limits: LedgerLimits) -> Self {
        Self { storage, limits }
    }

    /// Create a ledger over a fresh in-memory database with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Storage::open_in_memory()?, LedgerLimits::default()))
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The limits this ledger enforces.
    #[must_use]
    pub fn limits(&self) -> LedgerLimits {
        self.limits
    }

    // === Mutating calls ===

    /// `createExperiment`: open a funding campaign for the caller.
    ///
    /// # Errors
    ///
    /// Fails if value is attached, the title or description is empty or too
    /// long, the goal is zero, or the duration is out of range.
    pub fn create_experiment(&self, call: &Call, args: &NewExperiment) -> Result<(u64, Receipt)> {
        const METHOD: &str = "createExperiment";
        ensure_not_payable(call, METHOD)?;
        validate_text("title", &args.title, self.limits.max_title_length, true)?;
        validate_text(
            "description",
            &args.description,
            self.limits.max_description_length,
            false,
        )?;
        if args.funding_goal.is_zero() {
            return Err(Error::invalid_input("funding_goal", "must be greater than zero"));
        }
        if args.duration_days == 0 || args.duration_days > self.limits.max_duration_days {
            return Err(Error::invalid_input(
                "duration_days",
                format!("must be between 1 and {}", self.limits.max_duration_days),
            ));
        }
        let deadline = args
            .deadline_from(call.timestamp)
            .ok_or_else(|| Error::invalid_input("duration_days", "deadline out of range"))?;

        let tx = self.storage.begin()?;
        let id = self
            .storage
            .insert_experiment(args, &call.from, call.timestamp)?;
        let receipt = self.seal(
            call,
            METHOD,
            vec![(
                EventKind::ExperimentCreated,
                json!({
                    "experimentId": id,
                    "researcher": call.from,
                    "title": args.title,
                    "fundingGoal": args.funding_goal,
                    "deadline": deadline,
                }),
            )],
        )?;
        tx.commit()?;

        info!("Experiment {} created by {}", id, call.from);
        Ok((id, receipt))
    }

    /// `fundExperiment`: contribute the call value to an experiment.
    ///
    /// Flips `funding_complete` the first time the raised total reaches the
    /// goal. Contributions keep being accepted until the deadline.
    ///
    /// # Errors
    ///
    /// Fails if the experiment does not exist, is inactive, its deadline has
    /// passed, or no value is attached. No call deactivates an experiment
    /// yet; the `is_active` check guards rows written with the flag cleared.
    pub fn fund_experiment(&self, call: &Call, id: u64) -> Result<Receipt> {
        let tx = self.storage.begin()?;
        let experiment = self.experiment(id)?;

        if !experiment.is_active {
            return Err(Error::ExperimentInactive(id));
        }
        if call.timestamp > experiment.deadline {
            return Err(Error::FundingClosed {
                id,
                deadline: experiment.deadline,
            });
        }
        if call.value.is_zero() {
            return Err(Error::ZeroContribution);
        }

        let raised = experiment
            .funding_raised
            .checked_add(call.value)
            .ok_or(Error::Overflow("funding_raised"))?;
        let previous = self
            .storage
            .contribution(id, &call.from)?
            .unwrap_or(Wei::ZERO);
        let total = previous
            .checked_add(call.value)
            .ok_or(Error::Overflow("contribution"))?;

        let reached = !experiment.funding_complete && raised >= experiment.funding_goal;
        self.storage.set_contribution(id, &call.from, total)?;
        self.storage
            .update_experiment_funding(id, raised, experiment.funding_complete || reached)?;

        let mut events = vec![(
            EventKind::ExperimentFunded,
            json!({
                "experimentId": id,
                "funder": call.from,
                "amount": call.value,
                "fundingRaised": raised,
            }),
        )];
        if reached {
            events.push((
                EventKind::FundingGoalReached,
                json!({ "experimentId": id, "fundingRaised": raised }),
            ));
        }
        let receipt = self.seal(call, "fundExperiment", events)?;
        tx.commit()?;

        info!(
            "Experiment {} funded with {} wei by {} (raised {})",
            id, call.value, call.from, raised
        );
        if reached {
            info!("Experiment {} reached its funding goal", id);
        }
        Ok(receipt)
    }

    /// `uploadDataset`: attach a dataset to one of the caller's experiments.
    ///
    /// # Errors
    ///
    /// Fails if value is attached, the experiment does not exist, the caller is
    /// not its researcher, or the title or URI is invalid.
    pub fn upload_dataset(&self, call: &Call, args: &NewDataset) -> Result<(u64, Receipt)> {
        const METHOD: &str = "uploadDataset";
        ensure_not_payable(call, METHOD)?;
        validate_text("title", &args.title, self.limits.max_title_length, true)?;
        validate_text(
            "description",
            &args.description,
            self.limits.max_description_length,
            false,
        )?;
        validate_uri("data_uri", &args.data_uri)?;

        let tx = self.storage.begin()?;
        let experiment = self.experiment(args.experiment_id)?;
        if experiment.researcher != call.from {
            return Err(Error::NotResearcher {
                experiment_id: experiment.id,
                caller: call.from,
            });
        }

        let id = self.storage.insert_dataset(args, &call.from, call.timestamp)?;
        let receipt = self.seal(
            call,
            METHOD,
            vec![(
                EventKind::DatasetUploaded,
                json!({
                    "datasetId": id,
                    "experimentId": args.experiment_id,
                    "owner": call.from,
                    "accessPrice": args.access_price,
                    "isOpenAccess": args.is_open_access,
                }),
            )],
        )?;
        tx.commit()?;

        info!(
            "Dataset {} uploaded to experiment {} by {}",
            id, args.experiment_id, call.from
        );
        Ok((id, receipt))
    }

    /// `nftizeDataset`: mint the dataset as an NFT owned by its owner.
    ///
    /// The token id equals the dataset id.
    ///
    /// # Errors
    ///
    /// Fails if value is attached, the dataset does not exist, the caller does
    /// not own it, it is already minted, or the token URI is invalid.
    pub fn nftize_dataset(&self, call: &Call, id: u64, token_uri: &str) -> Result<Receipt> {
        const METHOD: &str = "nftizeDataset";
        ensure_not_payable(call, METHOD)?;
        validate_uri("token_uri", token_uri)?;

        let tx = self.storage.begin()?;
        let dataset = self.dataset(id)?;
        if dataset.owner != call.from {
            return Err(Error::NotDatasetOwner {
                dataset_id: id,
                caller: call.from,
            });
        }
        if dataset.is_nftized {
            return Err(Error::AlreadyNftized(id));
        }

        self.storage
            .insert_token(id, &dataset.owner, token_uri, call.timestamp)?;
        self.storage.mark_nftized(id, token_uri)?;
        let receipt = self.seal(
            call,
            METHOD,
            vec![(
                EventKind::DatasetNftized,
                json!({
                    "datasetId": id,
                    "tokenId": id,
                    "owner": dataset.owner,
                    "tokenUri": token_uri,
                }),
            )],
        )?;
        tx.commit()?;

        info!("Dataset {} minted as token {} for {}", id, id, dataset.owner);
        Ok(receipt)
    }

    /// `purchaseDataAccess`: buy read access to a dataset with the call value.
    ///
    /// # Errors
    ///
    /// Fails if the dataset does not exist, is open access, the caller already
    /// has access, or the value does not cover the access price.
    pub fn purchase_data_access(&self, call: &Call, id: u64) -> Result<Receipt> {
        let tx = self.storage.begin()?;
        let dataset = self.dataset(id)?;

        if dataset.is_open_access {
            return Err(Error::OpenAccess(id));
        }
        if dataset.owner == call.from || self.storage.access_grant_exists(id, &call.from)? {
            return Err(Error::AlreadyHasAccess {
                dataset_id: id,
                account: call.from,
            });
        }
        if call.value < dataset.access_price {
            return Err(Error::InsufficientPayment {
                required: dataset.access_price,
                sent: call.value,
            });
        }

        self.storage
            .insert_access_grant(id, &call.from, call.value, call.timestamp)?;
        let receipt = self.seal(
            call,
            "purchaseDataAccess",
            vec![(
                EventKind::DataAccessPurchased,
                json!({
                    "datasetId": id,
                    "buyer": call.from,
                    "owner": dataset.owner,
                    "paid": call.value,
                }),
            )],
        )?;
        tx.commit()?;

        info!(
            "{} bought access to dataset {} for {} wei",
            call.from, id, call.value
        );
        Ok(receipt)
    }

    /// `citeDataset`: record that `citing_id` cites `cited_id`.
    ///
    /// # Errors
    ///
    /// Fails if value is attached, either dataset does not exist, a dataset
    /// cites itself, the caller does not own the citing dataset, or the
    /// citation is already recorded.
    pub fn cite_dataset(&self, call: &Call, citing_id: u64, cited_id: u64) -> Result<Receipt> {
        const METHOD: &str = "citeDataset";
        ensure_not_payable(call, METHOD)?;
        if citing_id == cited_id {
            return Err(Error::SelfCitation(citing_id));
        }

        let tx = self.storage.begin()?;
        let citing = self.dataset(citing_id)?;
        let cited = self.dataset(cited_id)?;
        if citing.owner != call.from {
            return Err(Error::NotDatasetOwner {
                dataset_id: citing_id,
                caller: call.from,
            });
        }
        if self.storage.citation_exists(cited_id, citing_id)? {
            return Err(Error::DuplicateCitation {
                citing: citing_id,
                cited: cited_id,
            });
        }

        let block_number = self.storage.block_number()? + 1;
        self.storage
            .insert_citation(cited_id, citing_id, block_number)?;
        let receipt = self.seal(
            call,
            METHOD,
            vec![(
                EventKind::DatasetCited,
                json!({
                    "citingId": citing_id,
                    "citedId": cited_id,
                    "citationCount": cited.citation_count + 1,
                }),
            )],
        )?;
        tx.commit()?;

        info!("Dataset {} cited by dataset {}", cited_id, citing_id);
        Ok(receipt)
    }

    /// Advance the block number and log the call's events.
    fn seal(
        &self,
        call: &Call,
        method: &str,
        events: Vec<(EventKind, serde_json::Value)>,
    ) -> Result<Receipt> {
        let block_number = self.storage.block_number()? + 1;
        let payload = events
            .iter()
            .map(|(_, payload)| payload.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let tx_hash = TxHash::compute(block_number, &call.from, method, &payload);

        for (kind, payload) in &events {
            self.storage
                .insert_event(block_number, &tx_hash, *kind, payload, call.timestamp)?;
        }
        self.storage.set_block_number(block_number)?;

        debug!("{} sealed in block {} as {}", method, block_number, tx_hash);
        Ok(Receipt {
            tx_hash,
            block_number,
            method: method.to_string(),
        })
    }

    // === Experiment getters ===

    /// `getExperiment`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for an unknown id.
    pub fn experiment(&self, id: u64) -> Result<Experiment> {
        self.storage
            .get_experiment(id)?
            .ok_or(Error::ExperimentNotFound(id))
    }

    /// All experiments in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn experiments(&self) -> Result<Vec<Experiment>> {
        self.storage.list_experiments()
    }

    /// `getTotalExperiments`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn total_experiments(&self) -> Result<u64> {
        self.storage.count_experiments()
    }

    /// `getResearcherExperiments`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn researcher_experiments(&self, researcher: &Address) -> Result<Vec<u64>> {
        self.storage.experiment_ids_by_researcher(researcher)
    }

    /// Total contributed by an account to an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for an unknown id.
    pub fn contribution(&self, id: u64, contributor: &Address) -> Result<Wei> {
        self.experiment(id)?;
        Ok(self
            .storage
            .contribution(id, contributor)?
            .unwrap_or(Wei::ZERO))
    }

    /// Datasets uploaded to an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for an unknown id.
    pub fn experiment_datasets(&self, id: u64) -> Result<Vec<u64>> {
        self.experiment(id)?;
        self.storage.dataset_ids_by_experiment(id)
    }

    // === Dataset getters ===

    /// `getDataset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for an unknown id.
    pub fn dataset(&self, id: u64) -> Result<Dataset> {
        self.storage
            .get_dataset(id)?
            .ok_or(Error::DatasetNotFound(id))
    }

    /// All datasets in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn datasets(&self) -> Result<Vec<Dataset>> {
        self.storage.list_datasets()
    }

    /// `getTotalDatasets`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn total_datasets(&self) -> Result<u64> {
        self.storage.count_datasets()
    }

    /// `getResearcherDatasets`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn researcher_datasets(&self, owner: &Address) -> Result<Vec<u64>> {
        self.storage.dataset_ids_by_owner(owner)
    }

    /// `getDatasetCitations`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for an unknown id.
    pub fn dataset_citations(&self, id: u64) -> Result<Vec<u64>> {
        Ok(self.dataset(id)?.citations)
    }

    /// `hasAccess`: open access, ownership or a purchased grant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for an unknown id.
    pub fn has_access(&self, id: u64, account: &Address) -> Result<bool> {
        let dataset = self.dataset(id)?;
        Ok(dataset.is_open_access
            || dataset.owner == *account
            || self.storage.access_grant_exists(id, account)?)
    }

    // === Token getters ===

    /// `ownerOf`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenNotFound`] if the token was never minted.
    pub fn owner_of(&self, token_id: u64) -> Result<Address> {
        self.storage
            .token_owner(token_id)?
            .ok_or(Error::TokenNotFound(token_id))
    }

    /// `balanceOf`: number of tokens held.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn balance_of(&self, owner: &Address) -> Result<u64> {
        Ok(self.tokens_of(owner)?.len() as u64)
    }

    /// Token ids held by an account, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn tokens_of(&self, owner: &Address) -> Result<Vec<u64>> {
        self.storage.tokens_of(owner)
    }

    /// `tokenURI`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenNotFound`] if the token was never minted.
    pub fn token_uri(&self, token_id: u64) -> Result<String> {
        self.storage
            .token_uri(token_id)?
            .ok_or(Error::TokenNotFound(token_id))
    }

    // === Chain getters ===

    /// Current block number.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn block_number(&self) -> Result<u64> {
        self.storage.block_number()
    }

    /// The most recent events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<LedgerEvent>> {
        self.storage.recent_events(limit)
    }

    /// Everything the ledger knows about an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn portfolio(&self, address: &Address, now: DateTime<Utc>) -> Result<Portfolio> {
        let mut projects = Vec::new();
        for id in self.researcher_experiments(address)? {
            let experiment = self.experiment(id)?;
            projects.push(ProjectSummary {
                experiment_id: id,
                title: experiment.title.clone(),
                funding_goal: experiment.funding_goal,
                funding_raised: experiment.funding_raised,
                status: experiment.status_at(now),
                progress: experiment.progress_percent(),
                datasets: self.experiment_datasets(id)?,
            });
        }

        let mut investments = Vec::new();
        for (id, amount) in self.storage.contributions_by(address)? {
            let experiment = self.experiment(id)?;
            let mut citations = 0;
            let mut accessible_datasets = Vec::new();
            for dataset_id in self.storage.dataset_ids_by_experiment(id)? {
                let dataset = self.dataset(dataset_id)?;
                citations += dataset.citation_count;
                if self.has_access(dataset_id, address)? {
                    accessible_datasets.push(dataset_id);
                }
            }
            investments.push(Investment {
                experiment_id: id,
                title: experiment.title,
                amount,
                citations,
                accessible_datasets,
            });
        }

        Ok(Portfolio {
            address: *address,
            projects,
            investments,
            datasets: self.researcher_datasets(address)?,
            tokens: self.tokens_of(address)?,
            purchased: self.storage.granted_dataset_ids(address)?,
            earnings: self.storage.earnings_of(address)?,
        })
    }
}

fn ensure_not_payable(call: &Call, method: &'static str) -> Result<()> {
    if call.value.is_zero() {
        Ok(())
    } else {
        Err(Error::NotPayable { method })
    }
}

fn validate_text(field: &'static str, value: &str, max: usize, required: bool) -> Result<()> {
    if required && value.trim().is_empty() {
        return Err(Error::invalid_input(field, "must not be empty"));
    }
    if value.chars().count() > max {
        return Err(Error::invalid_input(
            field,
            format!("longer than {max} characters"),
        ));
    }
    Ok(())
}

fn validate_uri(field: &'static str, value: &str) -> Result<()> {
    if URI_RE.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid_input(
            field,
            format!("expected scheme://location, got {value:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct Accounts {
        researcher1: Address,
        researcher2: Address,
        funder1: Address,
        funder2: Address,
    }

    fn accounts() -> Accounts {
        Accounts {
            researcher1: Address::derive("researcher1"),
            researcher2: Address::derive("researcher2"),
            funder1: Address::derive("funder1"),
            funder2: Address::derive("funder2"),
        }
    }

    fn quantum_experiment() -> NewExperiment {
        NewExperiment {
            title: "Quantum Computing Research".to_string(),
            description: "Exploring quantum algorithms for drug discovery".to_string(),
            funding_goal: Wei::from_ether(10),
            duration_days: 30,
        }
    }

    fn quantum_dataset(experiment_id: u64) -> NewDataset {
        NewDataset {
            experiment_id,
            title: "Quantum Computing Results Dataset".to_string(),
            description: "Raw data from quantum computing simulations".to_string(),
            data_uri: "ipfs://QmXyz".to_string(),
            access_price: Wei::parse_ether("0.1").unwrap(),
            is_open_access: false,
        }
    }

    fn open_dataset(experiment_id: u64, title: &str, uri: &str) -> NewDataset {
        NewDataset {
            experiment_id,
            title: title.to_string(),
            description: format!("{title} description"),
            data_uri: uri.to_string(),
            access_price: Wei::ZERO,
            is_open_access: true,
        }
    }

    /// Ledger with one experiment created by researcher1.
    fn ledger_with_experiment() -> (Ledger, Accounts) {
        let ledger = Ledger::open_in_memory().unwrap();
        let acc = accounts();
        ledger
            .create_experiment(&Call::new(acc.researcher1), &quantum_experiment())
            .unwrap();
        (ledger, acc)
    }

    // === Experiment management ===

    #[test]
    fn test_create_experiment() {
        let ledger = Ledger::open_in_memory().unwrap();
        let acc = accounts();

        let (id, receipt) = ledger
            .create_experiment(&Call::new(acc.researcher1), &quantum_experiment())
            .unwrap();

        assert_eq!(id, 1);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.method, "createExperiment");
        assert_eq!(ledger.total_experiments().unwrap(), 1);
        assert_eq!(
            ledger.researcher_experiments(&acc.researcher1).unwrap(),
            vec![1]
        );

        let experiment = ledger.experiment(1).unwrap();
        assert_eq!(experiment.title, "Quantum Computing Research");
        assert_eq!(
            experiment.description,
            "Exploring quantum algorithms for drug discovery"
        );
        assert_eq!(experiment.researcher, acc.researcher1);
        assert_eq!(experiment.funding_goal, Wei::from_ether(10));
        assert!(experiment.is_active);
        assert_eq!(
            experiment.deadline,
            experiment.created_at + Duration::days(30)
        );
    }

    #[test]
    fn test_fund_experiment() {
        let (ledger, acc) = ledger_with_experiment();

        ledger
            .fund_experiment(
                &Call::new(acc.funder1).with_value(Wei::from_ether(5)),
                1,
            )
            .unwrap();

        let experiment = ledger.experiment(1).unwrap();
        assert_eq!(experiment.funding_raised, Wei::from_ether(5));
        assert_eq!(experiment.contributors, vec![acc.funder1]);
        assert!(!experiment.funding_complete);
    }

    #[test]
    fn test_funding_complete_when_goal_reached() {
        let (ledger, acc) = ledger_with_experiment();

        ledger
            .fund_experiment(
                &Call::new(acc.funder1).with_value(Wei::from_ether(10)),
                1,
            )
            .unwrap();

        let experiment = ledger.experiment(1).unwrap();
        assert_eq!(experiment.funding_raised, Wei::from_ether(10));
        assert!(experiment.funding_complete);

        let kinds: Vec<EventKind> = ledger
            .recent_events(10)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&EventKind::FundingGoalReached));
    }

    #[test]
    fn test_completion_flips_exactly_at_threshold() {
        let (ledger, acc) = ledger_with_experiment();
        let just_short = Wei::new(Wei::from_ether(10).as_u128() - 1);

        ledger
            .fund_experiment(&Call::new(acc.funder1).with_value(just_short), 1)
            .unwrap();
        assert!(!ledger.experiment(1).unwrap().funding_complete);

        ledger
            .fund_experiment(&Call::new(acc.funder2).with_value(Wei::new(1)), 1)
            .unwrap();
        assert!(ledger.experiment(1).unwrap().funding_complete);
    }

    #[test]
    fn test_funding_after_completion_keeps_flag_and_single_goal_event() {
        let (ledger, acc) = ledger_with_experiment();

        for _ in 0..3 {
            ledger
                .fund_experiment(
                    &Call::new(acc.funder1).with_value(Wei::from_ether(5)),
                    1,
                )
                .unwrap();
        }

        let experiment = ledger.experiment(1).unwrap();
        assert!(experiment.funding_complete);
        assert_eq!(experiment.funding_raised, Wei::from_ether(15));
        let reached = ledger
            .recent_events(100)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::FundingGoalReached)
            .count();
        assert_eq!(reached, 1);
    }

    #[test]
    fn test_raised_equals_sum_of_contributions() {
        let (ledger, acc) = ledger_with_experiment();
        let payments = [
            (acc.funder1, Wei::from_ether(1)),
            (acc.funder2, Wei::parse_ether("2.5").unwrap()),
            (acc.funder1, Wei::parse_ether("0.25").unwrap()),
            (acc.researcher2, Wei::new(7)),
        ];
        for (from, value) in payments {
            ledger
                .fund_experiment(&Call::new(from).with_value(value), 1)
                .unwrap();
        }

        let experiment = ledger.experiment(1).unwrap();
        let expected: Wei = payments.iter().map(|(_, v)| *v).sum();
        assert_eq!(experiment.funding_raised, expected);
        let recorded: Wei = experiment
            .contributors
            .iter()
            .map(|c| ledger.contribution(1, c).unwrap())
            .sum();
        assert_eq!(recorded, experiment.funding_raised);
        assert_eq!(
            experiment.contributors,
            vec![acc.funder1, acc.funder2, acc.researcher2]
        );
        assert_eq!(
            ledger.contribution(1, &acc.funder1).unwrap(),
            Wei::parse_ether("1.25").unwrap()
        );
    }

    #[test]
    fn test_fund_rejects_zero_value() {
        let (ledger, acc) = ledger_with_experiment();
        let err = ledger
            .fund_experiment(&Call::new(acc.funder1), 1)
            .unwrap_err();
        assert!(matches!(err, Error::ZeroContribution));
        assert_eq!(ledger.block_number().unwrap(), 1);
    }

    #[test]
    fn test_fund_unknown_experiment() {
        let (ledger, acc) = ledger_with_experiment();
        let err = ledger
            .fund_experiment(&Call::new(acc.funder1).with_value(Wei::new(1)), 9)
            .unwrap_err();
        assert!(matches!(err, Error::ExperimentNotFound(9)));
    }

    #[test]
    fn test_fund_after_deadline_is_rejected() {
        let (ledger, acc) = ledger_with_experiment();
        let deadline = ledger.experiment(1).unwrap().deadline;

        let err = ledger
            .fund_experiment(
                &Call::new(acc.funder1)
                    .with_value(Wei::new(1))
                    .at(deadline + Duration::seconds(1)),
                1,
            )
            .unwrap_err();
        assert!(matches!(err, Error::FundingClosed { id: 1, .. }));
        assert_eq!(ledger.experiment(1).unwrap().funding_raised, Wei::ZERO);
    }

    #[test]
    fn test_create_experiment_validation() {
        let ledger = Ledger::open_in_memory().unwrap();
        let from = Address::derive("r");

        let mut args = quantum_experiment();
        args.title = "   ".to_string();
        assert!(ledger.create_experiment(&Call::new(from), &args).is_err());

        let mut args = quantum_experiment();
        args.funding_goal = Wei::ZERO;
        assert!(ledger.create_experiment(&Call::new(from), &args).is_err());

        let mut args = quantum_experiment();
        args.duration_days = 0;
        assert!(ledger.create_experiment(&Call::new(from), &args).is_err());

        let mut args = quantum_experiment();
        args.duration_days = 366;
        assert!(ledger.create_experiment(&Call::new(from), &args).is_err());

        let err = ledger
            .create_experiment(
                &Call::new(from).with_value(Wei::new(1)),
                &quantum_experiment(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotPayable { .. }));

        assert_eq!(ledger.total_experiments().unwrap(), 0);
        assert_eq!(ledger.block_number().unwrap(), 0);
    }

    #[test]
    fn test_create_experiment_deadline_overflow_is_rejected() {
        let limits = LedgerLimits {
            max_duration_days: u32::MAX,
            ..LedgerLimits::default()
        };
        let ledger = Ledger::new(Storage::open_in_memory().unwrap(), limits);
        let mut args = quantum_experiment();
        args.duration_days = 4_000_000_000;

        let err = ledger
            .create_experiment(&Call::new(Address::derive("r")), &args)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidInput {
                field: "duration_days",
                ..
            }
        ));
        assert_eq!(ledger.total_experiments().unwrap(), 0);
        assert_eq!(ledger.block_number().unwrap(), 0);
    }

    // === Dataset management ===

    #[test]
    fn test_upload_dataset() {
        let (ledger, acc) = ledger_with_experiment();

        let (id, _) = ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();

        assert_eq!(id, 1);
        assert_eq!(ledger.total_datasets().unwrap(), 1);
        assert_eq!(
            ledger.researcher_datasets(&acc.researcher1).unwrap(),
            vec![1]
        );

        let dataset = ledger.dataset(1).unwrap();
        assert_eq!(dataset.title, "Quantum Computing Results Dataset");
        assert_eq!(
            dataset.description,
            "Raw data from quantum computing simulations"
        );
        assert_eq!(dataset.owner, acc.researcher1);
        assert_eq!(dataset.access_price, Wei::parse_ether("0.1").unwrap());
        assert!(!dataset.is_open_access);
        assert!(!dataset.is_nftized);
        assert_eq!(ledger.experiment_datasets(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_upload_dataset_requires_researcher() {
        let (ledger, acc) = ledger_with_experiment();

        let err = ledger
            .upload_dataset(&Call::new(acc.researcher2), &quantum_dataset(1))
            .unwrap_err();
        assert!(err.is_permission_error());
        assert_eq!(ledger.total_datasets().unwrap(), 0);
    }

    #[test]
    fn test_upload_dataset_rejects_bad_uri() {
        let (ledger, acc) = ledger_with_experiment();
        let mut args = quantum_dataset(1);
        args.data_uri = "not a uri".to_string();

        let err = ledger
            .upload_dataset(&Call::new(acc.researcher1), &args)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { field: "data_uri", .. }));
    }

    #[test]
    fn test_nftize_dataset() {
        let (ledger, acc) = ledger_with_experiment();
        ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();

        ledger
            .nftize_dataset(&Call::new(acc.researcher1), 1, "ipfs://QmAbc")
            .unwrap();

        let dataset = ledger.dataset(1).unwrap();
        assert!(dataset.is_nftized);
        assert_eq!(dataset.token_uri.as_deref(), Some("ipfs://QmAbc"));
        assert_eq!(ledger.owner_of(1).unwrap(), acc.researcher1);
        assert_eq!(ledger.balance_of(&acc.researcher1).unwrap(), 1);
        assert_eq!(ledger.tokens_of(&acc.researcher1).unwrap(), vec![1]);
        assert_eq!(ledger.balance_of(&acc.funder1).unwrap(), 0);
        assert_eq!(ledger.token_uri(1).unwrap(), "ipfs://QmAbc");
    }

    #[test]
    fn test_nftize_twice_or_by_stranger_fails() {
        let (ledger, acc) = ledger_with_experiment();
        ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();

        let err = ledger
            .nftize_dataset(&Call::new(acc.funder1), 1, "ipfs://QmAbc")
            .unwrap_err();
        assert!(matches!(err, Error::NotDatasetOwner { dataset_id: 1, .. }));

        ledger
            .nftize_dataset(&Call::new(acc.researcher1), 1, "ipfs://QmAbc")
            .unwrap();
        let err = ledger
            .nftize_dataset(&Call::new(acc.researcher1), 1, "ipfs://QmDef")
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyNftized(1)));
        assert_eq!(ledger.token_uri(1).unwrap(), "ipfs://QmAbc");
    }

    #[test]
    fn test_owner_of_unminted_token() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert!(matches!(ledger.owner_of(1), Err(Error::TokenNotFound(1))));
    }

    #[test]
    fn test_purchase_data_access() {
        let (ledger, acc) = ledger_with_experiment();
        ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();

        assert!(!ledger.has_access(1, &acc.funder1).unwrap());
        ledger
            .purchase_data_access(
                &Call::new(acc.funder1).with_value(Wei::parse_ether("0.1").unwrap()),
                1,
            )
            .unwrap();

        assert!(ledger.has_access(1, &acc.funder1).unwrap());
        assert!(!ledger.has_access(1, &acc.funder2).unwrap());
        assert_eq!(
            ledger.storage().earnings_of(&acc.researcher1).unwrap(),
            Wei::parse_ether("0.1").unwrap()
        );
    }

    #[test]
    fn test_access_requires_matching_payment() {
        let (ledger, acc) = ledger_with_experiment();
        ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();

        let err = ledger
            .purchase_data_access(
                &Call::new(acc.funder1).with_value(Wei::parse_ether("0.05").unwrap()),
                1,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientPayment { .. }));
        assert!(!ledger.has_access(1, &acc.funder1).unwrap());

        ledger
            .purchase_data_access(
                &Call::new(acc.funder1).with_value(Wei::parse_ether("0.1").unwrap()),
                1,
            )
            .unwrap();
        let err = ledger
            .purchase_data_access(
                &Call::new(acc.funder1).with_value(Wei::parse_ether("0.1").unwrap()),
                1,
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_owner_and_open_access() {
        let (ledger, acc) = ledger_with_experiment();
        ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();
        ledger
            .upload_dataset(
                &Call::new(acc.researcher1),
                &open_dataset(1, "Open", "ipfs://open"),
            )
            .unwrap();

        assert!(ledger.has_access(1, &acc.researcher1).unwrap());
        assert!(ledger.has_access(2, &acc.funder2).unwrap());

        let err = ledger
            .purchase_data_access(&Call::new(acc.funder2).with_value(Wei::new(1)), 2)
            .unwrap_err();
        assert!(matches!(err, Error::OpenAccess(2)));

        let err = ledger
            .purchase_data_access(
                &Call::new(acc.researcher1).with_value(Wei::from_ether(1)),
                1,
            )
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyHasAccess { .. }));
    }

    #[test]
    fn test_cite_dataset() {
        let (ledger, acc) = ledger_with_experiment();
        let call = Call::new(acc.researcher1);
        ledger
            .upload_dataset(&call, &open_dataset(1, "Dataset 1", "ipfs://dataset1"))
            .unwrap();
        ledger
            .upload_dataset(&call, &open_dataset(1, "Dataset 2", "ipfs://dataset2"))
            .unwrap();

        ledger.cite_dataset(&call, 2, 1).unwrap();

        let dataset = ledger.dataset(1).unwrap();
        assert_eq!(dataset.citation_count, 1);
        assert_eq!(ledger.dataset_citations(1).unwrap(), vec![2]);
        assert!(ledger.dataset_citations(2).unwrap().is_empty());
    }

    #[test]
    fn test_citation_rules() {
        let (ledger, acc) = ledger_with_experiment();
        let call = Call::new(acc.researcher1);
        ledger
            .upload_dataset(&call, &open_dataset(1, "Dataset 1", "ipfs://dataset1"))
            .unwrap();
        ledger
            .upload_dataset(&call, &open_dataset(1, "Dataset 2", "ipfs://dataset2"))
            .unwrap();

        assert!(matches!(
            ledger.cite_dataset(&call, 1, 1),
            Err(Error::SelfCitation(1))
        ));
        assert!(matches!(
            ledger.cite_dataset(&call, 2, 9),
            Err(Error::DatasetNotFound(9))
        ));
        assert!(ledger
            .cite_dataset(&Call::new(acc.funder1), 2, 1)
            .unwrap_err()
            .is_permission_error());

        ledger.cite_dataset(&call, 2, 1).unwrap();
        assert!(matches!(
            ledger.cite_dataset(&call, 2, 1),
            Err(Error::DuplicateCitation { citing: 2, cited: 1 })
        ));
    }

    #[test]
    fn test_citation_count_matches_list() {
        let (ledger, acc) = ledger_with_experiment();
        let call = Call::new(acc.researcher1);
        for i in 1..=4 {
            ledger
                .upload_dataset(
                    &call,
                    &open_dataset(1, &format!("Dataset {i}"), &format!("ipfs://d{i}")),
                )
                .unwrap();
        }
        for citing in 2..=4 {
            ledger.cite_dataset(&call, citing, 1).unwrap();
        }
        ledger.cite_dataset(&call, 4, 2).unwrap();

        for dataset in ledger.datasets().unwrap() {
            assert_eq!(
                dataset.citation_count as usize,
                ledger.dataset_citations(dataset.id).unwrap().len()
            );
        }
        assert_eq!(ledger.dataset_citations(1).unwrap(), vec![2, 3, 4]);
    }

    // === Chain bookkeeping ===

    #[test]
    fn test_block_number_advances_once_per_call() {
        let (ledger, acc) = ledger_with_experiment();
        assert_eq!(ledger.block_number().unwrap(), 1);

        let receipt = ledger
            .fund_experiment(
                &Call::new(acc.funder1).with_value(Wei::from_ether(10)),
                1,
            )
            .unwrap();
        assert_eq!(receipt.block_number, 2);

        let events = ledger.recent_events(10).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .filter(|e| e.block_number == 2)
            .all(|e| e.tx_hash == receipt.tx_hash));
    }

    #[test]
    fn test_failed_call_leaves_no_trace() {
        let (ledger, acc) = ledger_with_experiment();
        let before = ledger.storage().stats().unwrap();

        let _ = ledger.upload_dataset(&Call::new(acc.funder1), &quantum_dataset(1));
        let _ = ledger.fund_experiment(&Call::new(acc.funder1), 1);

        assert_eq!(ledger.storage().stats().unwrap(), before);
    }

    #[test]
    fn test_portfolio() {
        let (ledger, acc) = ledger_with_experiment();
        ledger
            .upload_dataset(&Call::new(acc.researcher1), &quantum_dataset(1))
            .unwrap();
        ledger
            .nftize_dataset(&Call::new(acc.researcher1), 1, "ipfs://QmAbc")
            .unwrap();
        ledger
            .fund_experiment(
                &Call::new(acc.funder1).with_value(Wei::from_ether(4)),
                1,
            )
            .unwrap();
        ledger
            .purchase_data_access(
                &Call::new(acc.funder1).with_value(Wei::parse_ether("0.1").unwrap()),
                1,
            )
            .unwrap();

        let now = Utc::now();
        let researcher = ledger.portfolio(&acc.researcher1, now).unwrap();
        assert_eq!(researcher.projects.len(), 1);
        assert_eq!(researcher.projects[0].progress, 40);
        assert_eq!(researcher.projects[0].datasets, vec![1]);
        assert_eq!(researcher.datasets, vec![1]);
        assert_eq!(researcher.tokens, vec![1]);
        assert_eq!(researcher.earnings, Wei::parse_ether("0.1").unwrap());
        assert!(researcher.investments.is_empty());
        assert!(researcher.purchased.is_empty());

        let funder = ledger.portfolio(&acc.funder1, now).unwrap();
        assert!(funder.projects.is_empty());
        assert_eq!(funder.investments.len(), 1);
        assert_eq!(funder.investments[0].amount, Wei::from_ether(4));
        assert_eq!(funder.investments[0].accessible_datasets, vec![1]);
        assert_eq!(funder.purchased, vec![1]);
        assert!(funder.tokens.is_empty());
    }
}
