//! JSON shapes served by the API.
//!
//! Field names are camelCase and amounts are ether decimal strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    Dataset, Experiment, ExperimentStatus, Investment, Portfolio, ProjectSummary, Receipt,
};
use crate::units::{Address, TxHash};

/// Where an experiment record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Read from the chain.
    Chain,
    /// Served from the mock catalog.
    Mock,
    /// Chain funding state laid over a catalog entry.
    Merged,
}

/// Long-form description of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentDetails {
    /// What the research is about.
    pub overview: String,
    /// How it will be carried out.
    pub methodology: String,
    /// Expected outcome.
    pub impact: String,
}

/// An experiment as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentView {
    /// Experiment id.
    pub id: u64,
    /// Short title.
    pub title: String,
    /// What the experiment is about.
    pub description: String,
    /// Research field, for catalog entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Researcher running the experiment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub researcher: Option<Address>,
    /// Amount asked for, in ether.
    pub funding_goal: String,
    /// Amount raised so far, in ether.
    pub funding_raised: String,
    /// Number of distinct contributors.
    pub backers: usize,
    /// Whole days until the deadline.
    pub days_left: i64,
    /// Percentage of the goal raised.
    pub progress: u8,
    /// Funding status.
    pub status: ExperimentStatus,
    /// The goal has been reached.
    pub funding_complete: bool,
    /// End of the funding period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Contract holding the experiment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    /// Long-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ExperimentDetails>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Where the record came from.
    pub source: DataSource,
}

impl ExperimentView {
    /// View of a chain record.
    #[must_use]
    pub fn from_chain(experiment: &Experiment, contract: Address, now: DateTime<Utc>) -> Self {
        Self {
            id: experiment.id,
            title: experiment.title.clone(),
            description: experiment.description.clone(),
            category: None,
            researcher: Some(experiment.researcher),
            funding_goal: experiment.funding_goal.format_ether(),
            funding_raised: experiment.funding_raised.format_ether(),
            backers: experiment.contributors.len(),
            days_left: experiment.days_left_at(now),
            progress: experiment.progress_percent(),
            status: experiment.status_at(now),
            funding_complete: experiment.funding_complete,
            deadline: Some(experiment.deadline),
            contract_address: Some(contract),
            details: None,
            tags: Vec::new(),
            source: DataSource::Chain,
        }
    }

    /// Lay the funding state of `chain` over this catalog entry.
    ///
    /// Descriptive fields stay; goal, raised amount, backers, status and
    /// contract address come from the chain.
    #[must_use]
    pub fn merged_with(mut self, chain: Self) -> Self {
        self.researcher = chain.researcher;
        self.funding_goal = chain.funding_goal;
        self.funding_raised = chain.funding_raised;
        self.backers = chain.backers;
        self.days_left = chain.days_left;
        self.progress = chain.progress;
        self.status = chain.status;
        self.funding_complete = chain.funding_complete;
        self.deadline = chain.deadline;
        self.contract_address = chain.contract_address;
        self.source = DataSource::Merged;
        self
    }
}

/// A dataset as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetView {
    /// Dataset id, also its token id.
    pub id: u64,
    /// Experiment the dataset belongs to.
    pub experiment_id: u64,
    /// Short title.
    pub title: String,
    /// Description of the data.
    pub description: String,
    /// Current owner.
    pub owner: Address,
    /// Where the data lives.
    pub data_uri: String,
    /// Price of read access, in ether.
    pub access_price: String,
    /// Anyone may read the data.
    pub is_open_access: bool,
    /// Minted as an NFT.
    pub is_nftized: bool,
    /// NFT metadata URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    /// Number of citing datasets.
    pub citation_count: u64,
    /// Ids of the citing datasets.
    pub citations: Vec<u64>,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}

impl From<Dataset> for DatasetView {
    fn from(dataset: Dataset) -> Self {
        Self {
            id: dataset.id,
            experiment_id: dataset.experiment_id,
            title: dataset.title,
            description: dataset.description,
            owner: dataset.owner,
            data_uri: dataset.data_uri,
            access_price: dataset.access_price.format_ether(),
            is_open_access: dataset.is_open_access,
            is_nftized: dataset.is_nftized,
            token_uri: dataset.token_uri,
            citation_count: dataset.citation_count,
            citations: dataset.citations,
            created_at: dataset.created_at,
        }
    }
}

/// One of the address's own experiments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    /// Experiment id.
    pub experiment_id: u64,
    /// Experiment title.
    pub title: String,
    /// Goal, in ether.
    pub funding_goal: String,
    /// Raised so far, in ether.
    pub funding_raised: String,
    /// Funding status.
    pub status: ExperimentStatus,
    /// Percentage of the goal raised.
    pub progress: u8,
    /// Datasets uploaded to the experiment.
    pub datasets: Vec<u64>,
}

impl From<ProjectSummary> for ProjectView {
    fn from(project: ProjectSummary) -> Self {
        Self {
            experiment_id: project.experiment_id,
            title: project.title,
            funding_goal: project.funding_goal.format_ether(),
            funding_raised: project.funding_raised.format_ether(),
            status: project.status,
            progress: project.progress,
            datasets: project.datasets,
        }
    }
}

/// A contribution the address made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentView {
    /// Experiment id.
    pub experiment_id: u64,
    /// Experiment title.
    pub title: String,
    /// Total contributed, in ether.
    pub amount: String,
    /// Citations received by the experiment's datasets.
    pub citations: u64,
    /// Datasets the address can read.
    pub accessible_datasets: Vec<u64>,
}

impl From<Investment> for InvestmentView {
    fn from(investment: Investment) -> Self {
        Self {
            experiment_id: investment.experiment_id,
            title: investment.title,
            amount: investment.amount.format_ether(),
            citations: investment.citations,
            accessible_datasets: investment.accessible_datasets,
        }
    }
}

/// Portfolio of an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    /// The address described.
    pub address: Address,
    /// Experiments it created.
    pub projects: Vec<ProjectView>,
    /// Experiments it funded.
    pub investments: Vec<InvestmentView>,
    /// Datasets it owns.
    pub datasets: Vec<u64>,
    /// NFT token ids it holds.
    pub tokens: Vec<u64>,
    /// Datasets it bought access to.
    pub purchased: Vec<u64>,
    /// Access fees received, in ether.
    pub earnings: String,
}

impl From<Portfolio> for PortfolioView {
    fn from(portfolio: Portfolio) -> Self {
        Self {
            address: portfolio.address,
            projects: portfolio.projects.into_iter().map(Into::into).collect(),
            investments: portfolio.investments.into_iter().map(Into::into).collect(),
            datasets: portfolio.datasets,
            tokens: portfolio.tokens,
            purchased: portfolio.purchased,
            earnings: portfolio.earnings.format_ether(),
        }
    }
}

/// Hash and block of a submitted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    /// Transaction hash.
    pub hash: TxHash,
    /// Block the call landed in.
    pub block_number: u64,
}

/// Response to a mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    /// Always true; failures use the error body.
    pub success: bool,
    /// The submitted call.
    pub transaction: TransactionView,
    /// Human-readable summary.
    pub message: String,
    /// Set when the call failed and a receipt was made up instead.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
    /// Id of the created experiment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<u64>,
    /// Id of the uploaded dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<u64>,
}

impl TxResponse {
    /// Response for a receipt returned by the chain.
    #[must_use]
    pub fn submitted(receipt: &Receipt, message: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction: TransactionView {
                hash: receipt.tx_hash,
                block_number: receipt.block_number,
            },
            message: message.into(),
            simulated: false,
            experiment_id: None,
            dataset_id: None,
        }
    }

    /// Attach the id of a created experiment.
    #[must_use]
    pub fn with_experiment(mut self, id: u64) -> Self {
        self.experiment_id = Some(id);
        self
    }

    /// Attach the id of an uploaded dataset.
    #[must_use]
    pub fn with_dataset(mut self, id: u64) -> Self {
        self.dataset_id = Some(id);
        self
    }
}

/// Whether an account can read a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessView {
    /// Dataset id.
    pub dataset_id: u64,
    /// Account checked.
    pub account: Address,
    /// Whether it can read the dataset.
    pub has_access: bool,
}

/// A minted dataset token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    /// Token id, equal to the dataset id.
    pub token_id: u64,
    /// Current holder.
    pub owner: Address,
    /// Metadata URI.
    pub token_uri: String,
}

/// Dataset tokens held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftsView {
    /// The holder.
    pub address: Address,
    /// Number of tokens held.
    pub balance: u64,
    /// The tokens, ascending by id.
    pub tokens: Vec<TokenView>,
}

/// Citations of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationsView {
    /// Dataset id.
    pub dataset_id: u64,
    /// Number of citing datasets.
    pub citation_count: u64,
    /// Ids of the citing datasets.
    pub citations: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Wei;
    use chrono::Duration;

    fn chain_experiment(now: DateTime<Utc>) -> Experiment {
        Experiment {
            id: 1,
            title: "On-chain title".to_string(),
            description: "On-chain description".to_string(),
            researcher: Address::derive("researcher"),
            funding_goal: Wei::from_ether(10),
            funding_raised: Wei::parse_ether("2.5").unwrap(),
            deadline: now + Duration::days(3),
            is_active: true,
            funding_complete: false,
            contributors: vec![Address::derive("a"), Address::derive("b")],
            created_at: now,
        }
    }

    #[test]
    fn test_experiment_view_from_chain() {
        let now = Utc::now();
        let view = ExperimentView::from_chain(&chain_experiment(now), Address::ZERO, now);

        assert_eq!(view.funding_goal, "10");
        assert_eq!(view.funding_raised, "2.5");
        assert_eq!(view.backers, 2);
        assert_eq!(view.progress, 25);
        assert_eq!(view.status, ExperimentStatus::Funding);
        assert_eq!(view.source, DataSource::Chain);
    }

    #[test]
    fn test_experiment_view_json_is_camel_case() {
        let now = Utc::now();
        let view = ExperimentView::from_chain(&chain_experiment(now), Address::ZERO, now);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["fundingGoal"], "10");
        assert_eq!(json["fundingComplete"], false);
        assert!(json.get("daysLeft").is_some());
        assert!(json.get("category").is_none());
        assert_eq!(json["source"], "chain");
    }

    #[test]
    fn test_tx_response_hides_simulated_flag_when_false() {
        let receipt = Receipt {
            tx_hash: TxHash::compute(1, &Address::ZERO, "createExperiment", "{}"),
            block_number: 1,
            method: "createExperiment".to_string(),
        };
        let json =
            serde_json::to_value(TxResponse::submitted(&receipt, "ok").with_experiment(1)).unwrap();

        assert!(json.get("simulated").is_none());
        assert_eq!(json["experimentId"], 1);
        assert_eq!(json["transaction"]["blockNumber"], 1);
        assert!(json.get("datasetId").is_none());
    }
}
