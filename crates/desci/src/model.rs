//! Core ledger records.
//!
//! These are the experiment, dataset and event records the ledger stores,
//! along with the call context and receipt that frame every mutating call.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::units::{Address, TxHash, Wei};

/// Context of a contract call: who sent it, how much value it carries and
/// when it was included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// The sending account.
    pub from: Address,
    /// Value attached to the call.
    pub value: Wei,
    /// Timestamp of the block the call lands in.
    pub timestamp: DateTime<Utc>,
}

impl Call {
    /// A call without attached value, stamped now.
    #[must_use]
    pub fn new(from: Address) -> Self {
        Self {
            from,
            value: Wei::ZERO,
            timestamp: Utc::now(),
        }
    }

    /// Attach a value to the call.
    #[must_use]
    pub fn with_value(mut self, value: Wei) -> Self {
        self.value = value;
        self
    }

    /// Override the call timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Funding state of an experiment as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Accepting contributions.
    Funding,
    /// The funding goal has been reached.
    Funded,
    /// The funding period ended without reaching the goal, or the experiment
    /// was deactivated.
    Closed,
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Funding => write!(f, "funding"),
            Self::Funded => write!(f, "funded"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A funding campaign tied to a researcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment id, starting at 1.
    pub id: u64,
    /// Short title.
    pub title: String,
    /// Longer description of the research.
    pub description: String,
    /// Address of the researcher who created the experiment.
    pub researcher: Address,
    /// Amount the researcher asked for.
    pub funding_goal: Wei,
    /// Running total of all contributions.
    pub funding_raised: Wei,
    /// End of the funding period.
    pub deadline: DateTime<Utc>,
    /// Whether the experiment accepts funding.
    pub is_active: bool,
    /// Set once `funding_raised` reached `funding_goal`.
    pub funding_complete: bool,
    /// Contributors in order of their first contribution.
    pub contributors: Vec<Address>,
    /// When the experiment was created.
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    /// Status of the experiment at the given time.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> ExperimentStatus {
        if self.funding_complete {
            ExperimentStatus::Funded
        } else if self.is_active && now <= self.deadline {
            ExperimentStatus::Funding
        } else {
            ExperimentStatus::Closed
        }
    }

    /// Whole days left in the funding period, zero once it has ended.
    #[must_use]
    pub fn days_left_at(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_days().max(0)
    }

    /// Percentage of the goal raised, capped at 100.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        if self.funding_goal.is_zero() {
            return 0;
        }
        let pct = self.funding_raised.as_u128().saturating_mul(100) / self.funding_goal.as_u128();
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}

/// Arguments of `createExperiment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExperiment {
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Amount asked for.
    pub funding_goal: Wei,
    /// Length of the funding period in days.
    pub duration_days: u32,
}

impl NewExperiment {
    /// Deadline of an experiment created at `created_at`, or `None` if it
    /// falls outside the representable time range.
    #[must_use]
    pub fn deadline_from(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_days(i64::from(self.duration_days))
            .and_then(|duration| created_at.checked_add_signed(duration))
    }
}

/// An uploaded research dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset id, starting at 1. Doubles as the NFT token id.
    pub id: u64,
    /// Experiment the dataset belongs to.
    pub experiment_id: u64,
    /// Short title.
    pub title: String,
    /// Description of the data.
    pub description: String,
    /// Current owner.
    pub owner: Address,
    /// Where the data lives (`ipfs://...`, `https://...`).
    pub data_uri: String,
    /// Price of read access.
    pub access_price: Wei,
    /// Anyone may read the data.
    pub is_open_access: bool,
    /// The dataset has been minted as an NFT.
    pub is_nftized: bool,
    /// Metadata URI of the NFT, once minted.
    pub token_uri: Option<String>,
    /// Number of datasets citing this one.
    pub citation_count: u64,
    /// Ids of the datasets citing this one, in citation order.
    pub citations: Vec<u64>,
    /// When the dataset was uploaded.
    pub created_at: DateTime<Utc>,
}

/// Arguments of `uploadDataset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDataset {
    /// Experiment the dataset belongs to.
    pub experiment_id: u64,
    /// Short title.
    pub title: String,
    /// Description of the data.
    pub description: String,
    /// Where the data lives.
    pub data_uri: String,
    /// Price of read access.
    pub access_price: Wei,
    /// Anyone may read the data.
    pub is_open_access: bool,
}

/// Result of an applied contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the call.
    pub tx_hash: TxHash,
    /// Block the call landed in.
    pub block_number: u64,
    /// Contract method that was called.
    pub method: String,
}

/// Kinds of events emitted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An experiment was created.
    ExperimentCreated,
    /// An experiment received a contribution.
    ExperimentFunded,
    /// An experiment reached its funding goal.
    FundingGoalReached,
    /// A dataset was uploaded.
    DatasetUploaded,
    /// A dataset was minted as an NFT.
    DatasetNftized,
    /// Read access to a dataset was purchased.
    DataAccessPurchased,
    /// A dataset cited another.
    DatasetCited,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [Self; 7] = [
        Self::ExperimentCreated,
        Self::ExperimentFunded,
        Self::FundingGoalReached,
        Self::DatasetUploaded,
        Self::DatasetNftized,
        Self::DataAccessPurchased,
        Self::DatasetCited,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExperimentCreated => "experiment_created",
            Self::ExperimentFunded => "experiment_funded",
            Self::FundingGoalReached => "funding_goal_reached",
            Self::DatasetUploaded => "dataset_uploaded",
            Self::DatasetNftized => "dataset_nftized",
            Self::DataAccessPurchased => "data_access_purchased",
            Self::DatasetCited => "dataset_cited",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for EventKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| crate::error::Error::corrupt("events", format!("unknown kind: {s}")))
    }
}

/// An entry of the ledger's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Event id (assigned by storage).
    pub id: i64,
    /// Block the emitting call landed in.
    pub block_number: u64,
    /// Hash of the emitting call.
    pub tx_hash: TxHash,
    /// What happened.
    pub kind: EventKind,
    /// Event arguments.
    pub payload: serde_json::Value,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// One of an address's own experiments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    /// Experiment id.
    pub experiment_id: u64,
    /// Experiment title.
    pub title: String,
    /// Amount asked for.
    pub funding_goal: Wei,
    /// Amount raised so far.
    pub funding_raised: Wei,
    /// Current status.
    pub status: ExperimentStatus,
    /// Percentage of the goal raised.
    pub progress: u8,
    /// Datasets uploaded to the experiment.
    pub datasets: Vec<u64>,
}

/// A contribution an address made to someone's experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    /// Experiment id.
    pub experiment_id: u64,
    /// Experiment title.
    pub title: String,
    /// Total contributed by the address.
    pub amount: Wei,
    /// Sum of citations received by the experiment's datasets.
    pub citations: u64,
    /// Datasets of the experiment the address can read.
    pub accessible_datasets: Vec<u64>,
}

/// Everything the ledger knows about one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    /// The address described.
    pub address: Address,
    /// Experiments created by the address.
    pub projects: Vec<ProjectSummary>,
    /// Experiments funded by the address.
    pub investments: Vec<Investment>,
    /// Datasets owned by the address.
    pub datasets: Vec<u64>,
    /// NFT token ids held by the address.
    pub tokens: Vec<u64>,
    /// Datasets the address bought access to.
    pub purchased: Vec<u64>,
    /// Access fees received for the address's datasets.
    pub earnings: Wei,
}
