//! Error types for desci.
//!
//! This module defines all error types used throughout the desci crate. Contract
//! rule violations are grouped separately from infrastructure failures so the API
//! layer can map them onto HTTP status codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::units::{Address, Wei};

/// The main error type for desci operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt record in {table}: {message}")]
    CorruptRecord {
        /// Table the row came from.
        table: &'static str,
        /// Description of the bad value.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Contract Errors ===
    /// No experiment with this id.
    #[error("experiment {0} not found")]
    ExperimentNotFound(u64),

    /// No dataset with this id.
    #[error("dataset {0} not found")]
    DatasetNotFound(u64),

    /// No token with this id has been minted.
    #[error("token {0} does not exist")]
    TokenNotFound(u64),

    /// The experiment no longer accepts funding.
    ///
    /// Reserved for a deactivation call; experiments are created active and
    /// nothing clears the flag today.
    #[error("experiment {0} is not active")]
    ExperimentInactive(u64),

    /// The funding period of the experiment has ended.
    #[error("funding period of experiment {id} ended at {deadline}")]
    FundingClosed {
        /// Experiment id.
        id: u64,
        /// When the funding period ended.
        deadline: chrono::DateTime<chrono::Utc>,
    },

    /// A value was attached to a method that does not accept payment.
    #[error("{method} does not accept payment")]
    NotPayable {
        /// The contract method that was called.
        method: &'static str,
    },

    /// A funding call carried no value.
    #[error("contribution must be greater than zero")]
    ZeroContribution,

    /// A call argument failed validation.
    #[error("invalid {field}: {message}")]
    InvalidInput {
        /// Name of the offending argument.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The caller is not the researcher of the experiment.
    #[error("{caller} is not the researcher of experiment {experiment_id}")]
    NotResearcher {
        /// Experiment id.
        experiment_id: u64,
        /// Address that made the call.
        caller: Address,
    },

    /// The caller does not own the dataset.
    #[error("{caller} does not own dataset {dataset_id}")]
    NotDatasetOwner {
        /// Dataset id.
        dataset_id: u64,
        /// Address that made the call.
        caller: Address,
    },

    /// The dataset has already been minted as an NFT.
    #[error("dataset {0} is already NFTized")]
    AlreadyNftized(u64),

    /// Open access datasets cannot be purchased.
    #[error("dataset {0} is open access")]
    OpenAccess(u64),

    /// The account can already read the dataset.
    #[error("{account} already has access to dataset {dataset_id}")]
    AlreadyHasAccess {
        /// Dataset id.
        dataset_id: u64,
        /// The account holding access.
        account: Address,
    },

    /// The attached value does not cover the access price.
    #[error("insufficient payment: required {required} wei, sent {sent} wei")]
    InsufficientPayment {
        /// Access price of the dataset.
        required: Wei,
        /// Value attached to the call.
        sent: Wei,
    },

    /// A dataset cannot cite itself.
    #[error("dataset {0} cannot cite itself")]
    SelfCitation(u64),

    /// The citation has already been recorded.
    #[error("dataset {citing} already cites dataset {cited}")]
    DuplicateCitation {
        /// The citing dataset.
        citing: u64,
        /// The cited dataset.
        cited: u64,
    },

    /// An amount overflowed.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    // === Unit Errors ===
    /// An account address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An ether amount could not be parsed.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    // === Chain Errors ===
    /// The chain provider is not reachable.
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for desci operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new chain unavailable error.
    #[must_use]
    pub fn chain_unavailable(message: impl Into<String>) -> Self {
        Self::ChainUnavailable(message.into())
    }

    /// Create an input validation error.
    #[must_use]
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Create a corrupt record error.
    #[must_use]
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            table,
            message: message.into(),
        }
    }

    /// Check if this error means the referenced record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExperimentNotFound(_) | Self::DatasetNotFound(_) | Self::TokenNotFound(_)
        )
    }

    /// Check if the caller lacked the right to perform the call.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            Self::NotResearcher { .. } | Self::NotDatasetOwner { .. }
        )
    }

    /// Check if the call conflicts with state that already exists.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyNftized(_) | Self::AlreadyHasAccess { .. } | Self::DuplicateCitation { .. }
        )
    }

    /// Check if the call was rejected by a contract rule or bad argument.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::ExperimentInactive(_)
                | Self::FundingClosed { .. }
                | Self::NotPayable { .. }
                | Self::ZeroContribution
                | Self::InvalidInput { .. }
                | Self::OpenAccess(_)
                | Self::InsufficientPayment { .. }
                | Self::SelfCitation(_)
                | Self::Overflow(_)
                | Self::InvalidAddress(_)
                | Self::InvalidAmount(_)
        )
    }

    /// Check if the caller is at fault: unknown record, missing right,
    /// conflicting state or a rejected argument.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.is_not_found() || self.is_permission_error() || self.is_conflict() || self.is_rejected()
    }

    /// Check if this error indicates the chain could not be reached.
    #[must_use]
    pub fn is_chain_unavailable(&self) -> bool {
        matches!(self, Self::ChainUnavailable(_))
    }
}
