//! Storage layer for the ledger.
//!
//! This module provides `SQLite`-based persistent storage for experiments,
//! datasets, contributions, access grants, citations, NFT tokens and the event
//! log. It stores and retrieves rows; the contract rules live in
//! [`crate::ledger`].

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Params, Transaction};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Dataset, EventKind, Experiment, LedgerEvent, NewDataset, NewExperiment};
use crate::units::{Address, TxHash, Wei};

use migrations::BLOCK_NUMBER_KEY;

const EXPERIMENT_COLUMNS: &str = "id, title, description, researcher, funding_goal, \
     funding_raised, deadline, is_active, funding_complete, created_at";

const DATASET_COLUMNS: &str = "id, experiment_id, title, description, owner, data_uri, \
     access_price, is_open_access, is_nftized, token_uri, citation_count, created_at";

const EVENT_COLUMNS: &str = "id, block_number, tx_hash, kind, payload, timestamp";

fn text_conversion<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: std::str::FromStr<Err = Error>,
{
    value
        .as_str()?
        .parse()
        .map_err(|e: Error| FromSqlError::Other(e.to_string().into()))
}

impl ToSql for Address {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Address {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_conversion(value)
    }
}

impl ToSql for Wei {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Wei {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_conversion(value)
    }
}

impl ToSql for TxHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for TxHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_conversion(value)
    }
}

impl ToSql for EventKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for EventKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_conversion(value)
    }
}

/// Read an RFC 3339 timestamp column.
fn timestamp_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Bind a domain id as an `SQLite` integer.
fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::invalid_input("id", format!("{id} is out of range")))
}

/// Read a non-negative integer column as a domain id.
fn id_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// Storage engine for the ledger.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a transaction on the storage connection.
    ///
    /// Every storage call made before the returned transaction is committed
    /// becomes part of it; dropping it without committing rolls them back.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    fn last_id(&self) -> Result<u64> {
        u64::try_from(self.conn.last_insert_rowid())
            .map_err(|_| Error::internal("negative row id"))
    }

    fn ids<P: Params>(&self, sql: &str, params: P) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(params, |row| id_at(row, 0))?
            .collect::<std::result::Result<Vec<u64>, _>>()?;
        Ok(ids)
    }

    fn count(&self, table: &'static str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| Error::corrupt(table, format!("negative count {count}")))
    }

    fn amounts<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Wei>> {
        let mut stmt = self.conn.prepare(sql)?;
        let amounts = stmt
            .query_map(params, |row| row.get(0))?
            .collect::<std::result::Result<Vec<Wei>, _>>()?;
        Ok(amounts)
    }

    // === Chain height ===

    /// Current block number (0 before the first call).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored value is corrupt.
    pub fn block_number(&self) -> Result<u64> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [BLOCK_NUMBER_KEY],
                |row| row.get(0),
            )
            .optional()?;

        value.map_or(Ok(0), |v| {
            v.parse()
                .map_err(|_| Error::corrupt("metadata", format!("bad block number: {v}")))
        })
    }

    /// Store the block number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_block_number(&self, block_number: u64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (BLOCK_NUMBER_KEY, block_number.to_string()),
        )?;
        Ok(())
    }

    // === Experiments ===

    /// Insert a new experiment and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_experiment(
        &self,
        args: &NewExperiment,
        researcher: &Address,
        created_at: DateTime<Utc>,
    ) -> Result<u64> {
        let deadline = args
            .deadline_from(created_at)
            .ok_or_else(|| Error::invalid_input("duration_days", "deadline out of range"))?;
        self.conn.execute(
            r"
            INSERT INTO experiments
                (title, description, researcher, funding_goal, funding_raised,
                 deadline, is_active, funding_complete, created_at)
            VALUES (?1, ?2, ?3, ?4, '0', ?5, 1, 0, ?6)
            ",
            params![
                args.title,
                args.description,
                researcher,
                args.funding_goal,
                deadline.to_rfc3339(),
                created_at.to_rfc3339(),
            ],
        )?;

        let id = self.last_id()?;
        debug!("Inserted experiment with id {}", id);
        Ok(id)
    }

    /// Get an experiment by id, including its contributors.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_experiment(&self, id: u64) -> Result<Option<Experiment>> {
        let experiment = self
            .conn
            .query_row(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE id = ?1"),
                [sql_id(id)?],
                Self::row_to_experiment,
            )
            .optional()?;

        match experiment {
            Some(mut experiment) => {
                experiment.contributors = self.contributors(id)?;
                Ok(Some(experiment))
            }
            None => Ok(None),
        }
    }

    /// List all experiments in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_experiments(&self) -> Result<Vec<Experiment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments ORDER BY id"))?;

        let mut experiments = stmt
            .query_map([], Self::row_to_experiment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for experiment in &mut experiments {
            experiment.contributors = self.contributors(experiment.id)?;
        }
        Ok(experiments)
    }

    /// Count experiments.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_experiments(&self) -> Result<u64> {
        self.count("experiments")
    }

    /// Ids of the experiments created by a researcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn experiment_ids_by_researcher(&self, researcher: &Address) -> Result<Vec<u64>> {
        self.ids(
            "SELECT id FROM experiments WHERE researcher = ?1 ORDER BY id",
            [researcher],
        )
    }

    /// Overwrite the funding state of an experiment.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_experiment_funding(
        &self,
        id: u64,
        funding_raised: Wei,
        funding_complete: bool,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE experiments SET funding_raised = ?1, funding_complete = ?2 WHERE id = ?3",
            params![funding_raised, funding_complete, sql_id(id)?],
        )?;
        Ok(())
    }

    fn row_to_experiment(row: &rusqlite::Row) -> rusqlite::Result<Experiment> {
        Ok(Experiment {
            id: id_at(row, 0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            researcher: row.get(3)?,
            funding_goal: row.get(4)?,
            funding_raised: row.get(5)?,
            deadline: timestamp_at(row, 6)?,
            is_active: row.get(7)?,
            funding_complete: row.get(8)?,
            contributors: Vec::new(),
            created_at: timestamp_at(row, 9)?,
        })
    }

    // === Contributions ===

    /// Total contributed by an account to an experiment, if anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn contribution(&self, experiment_id: u64, contributor: &Address) -> Result<Option<Wei>> {
        let amount = self
            .conn
            .query_row(
                "SELECT amount FROM contributions WHERE experiment_id = ?1 AND contributor = ?2",
                params![sql_id(experiment_id)?, contributor],
                |row| row.get(0),
            )
            .optional()?;
        Ok(amount)
    }

    /// Record the running contribution total of an account.
    ///
    /// The first call for an (experiment, contributor) pair fixes the
    /// contributor's position in the contributor list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_contribution(
        &self,
        experiment_id: u64,
        contributor: &Address,
        total: Wei,
    ) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO contributions (experiment_id, contributor, amount)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (experiment_id, contributor) DO UPDATE SET amount = excluded.amount
            ",
            params![sql_id(experiment_id)?, contributor, total],
        )?;
        Ok(())
    }

    /// Contributors of an experiment in order of first contribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn contributors(&self, experiment_id: u64) -> Result<Vec<Address>> {
        let mut stmt = self.conn.prepare(
            "SELECT contributor FROM contributions WHERE experiment_id = ?1 ORDER BY id",
        )?;
        let contributors = stmt
            .query_map([sql_id(experiment_id)?], |row| row.get(0))?
            .collect::<std::result::Result<Vec<Address>, _>>()?;
        Ok(contributors)
    }

    /// Experiments an account contributed to, with the amount contributed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn contributions_by(&self, contributor: &Address) -> Result<Vec<(u64, Wei)>> {
        let mut stmt = self.conn.prepare(
            "SELECT experiment_id, amount FROM contributions WHERE contributor = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([contributor], |row| Ok((id_at(row, 0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // === Datasets ===

    /// Insert a new dataset and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_dataset(
        &self,
        args: &NewDataset,
        owner: &Address,
        created_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.conn.execute(
            r"
            INSERT INTO datasets
                (experiment_id, title, description, owner, data_uri, access_price,
                 is_open_access, is_nftized, citation_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8)
            ",
            params![
                sql_id(args.experiment_id)?,
                args.title,
                args.description,
                owner,
                args.data_uri,
                args.access_price,
                args.is_open_access,
                created_at.to_rfc3339(),
            ],
        )?;

        let id = self.last_id()?;
        debug!("Inserted dataset with id {}", id);
        Ok(id)
    }

    /// Get a dataset by id, including the ids citing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_dataset(&self, id: u64) -> Result<Option<Dataset>> {
        let dataset = self
            .conn
            .query_row(
                &format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id = ?1"),
                [sql_id(id)?],
                Self::row_to_dataset,
            )
            .optional()?;

        match dataset {
            Some(mut dataset) => {
                dataset.citations = self.citations_of(id)?;
                Ok(Some(dataset))
            }
            None => Ok(None),
        }
    }

    /// List all datasets in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DATASET_COLUMNS} FROM datasets ORDER BY id"))?;

        let mut datasets = stmt
            .query_map([], Self::row_to_dataset)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for dataset in &mut datasets {
            dataset.citations = self.citations_of(dataset.id)?;
        }
        Ok(datasets)
    }

    /// Count datasets.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_datasets(&self) -> Result<u64> {
        self.count("datasets")
    }

    /// Ids of the datasets owned by an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dataset_ids_by_owner(&self, owner: &Address) -> Result<Vec<u64>> {
        self.ids("SELECT id FROM datasets WHERE owner = ?1 ORDER BY id", [owner])
    }

    /// Ids of the datasets uploaded to an experiment.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dataset_ids_by_experiment(&self, experiment_id: u64) -> Result<Vec<u64>> {
        self.ids(
            "SELECT id FROM datasets WHERE experiment_id = ?1 ORDER BY id",
            [sql_id(experiment_id)?],
        )
    }

    /// Flag a dataset as minted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_nftized(&self, id: u64, token_uri: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE datasets SET is_nftized = 1, token_uri = ?1 WHERE id = ?2",
            params![token_uri, sql_id(id)?],
        )?;
        Ok(())
    }

    fn row_to_dataset(row: &rusqlite::Row) -> rusqlite::Result<Dataset> {
        Ok(Dataset {
            id: id_at(row, 0)?,
            experiment_id: id_at(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            owner: row.get(4)?,
            data_uri: row.get(5)?,
            access_price: row.get(6)?,
            is_open_access: row.get(7)?,
            is_nftized: row.get(8)?,
            token_uri: row.get(9)?,
            citation_count: id_at(row, 10)?,
            citations: Vec::new(),
            created_at: timestamp_at(row, 11)?,
        })
    }

    // === Citations ===

    /// Record that `citing_id` cites `cited_id` and bump the cited dataset's counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including when the
    /// citation already exists.
    pub fn insert_citation(&self, cited_id: u64, citing_id: u64, block_number: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO citations (cited_id, citing_id, block_number) VALUES (?1, ?2, ?3)",
            params![sql_id(cited_id)?, sql_id(citing_id)?, sql_id(block_number)?],
        )?;
        self.conn.execute(
            "UPDATE datasets SET citation_count = citation_count + 1 WHERE id = ?1",
            [sql_id(cited_id)?],
        )?;
        Ok(())
    }

    /// Check whether a citation has been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn citation_exists(&self, cited_id: u64, citing_id: u64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM citations WHERE cited_id = ?1 AND citing_id = ?2",
            params![sql_id(cited_id)?, sql_id(citing_id)?],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ids of the datasets citing `cited_id`, in citation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn citations_of(&self, cited_id: u64) -> Result<Vec<u64>> {
        self.ids(
            "SELECT citing_id FROM citations WHERE cited_id = ?1 ORDER BY id",
            [sql_id(cited_id)?],
        )
    }

    // === Access grants ===

    /// Record a paid access grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_access_grant(
        &self,
        dataset_id: u64,
        account: &Address,
        paid: Wei,
        granted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO access_grants (dataset_id, account, paid, granted_at) VALUES (?1, ?2, ?3, ?4)",
            params![sql_id(dataset_id)?, account, paid, granted_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Check whether an account bought access to a dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn access_grant_exists(&self, dataset_id: u64, account: &Address) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM access_grants WHERE dataset_id = ?1 AND account = ?2",
            params![sql_id(dataset_id)?, account],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ids of the datasets an account bought access to.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn granted_dataset_ids(&self, account: &Address) -> Result<Vec<u64>> {
        self.ids(
            "SELECT dataset_id FROM access_grants WHERE account = ?1 ORDER BY dataset_id",
            [account],
        )
    }

    /// Total access fees paid for the datasets an account owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn earnings_of(&self, owner: &Address) -> Result<Wei> {
        let amounts = self.amounts(
            r"
            SELECT g.paid FROM access_grants g
            JOIN datasets d ON d.id = g.dataset_id
            WHERE d.owner = ?1
            ",
            [owner],
        )?;
        Ok(amounts.into_iter().sum())
    }

    // === Tokens ===

    /// Mint a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including when the
    /// token id is taken.
    pub fn insert_token(
        &self,
        token_id: u64,
        owner: &Address,
        token_uri: &str,
        minted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tokens (token_id, owner, token_uri, minted_at) VALUES (?1, ?2, ?3, ?4)",
            params![sql_id(token_id)?, owner, token_uri, minted_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Owner of a token, if minted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn token_owner(&self, token_id: u64) -> Result<Option<Address>> {
        let owner = self
            .conn
            .query_row(
                "SELECT owner FROM tokens WHERE token_id = ?1",
                [sql_id(token_id)?],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Metadata URI of a token, if minted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn token_uri(&self, token_id: u64) -> Result<Option<String>> {
        let uri = self
            .conn
            .query_row(
                "SELECT token_uri FROM tokens WHERE token_id = ?1",
                [sql_id(token_id)?],
                |row| row.get(0),
            )
            .optional()?;
        Ok(uri)
    }

    /// Token ids held by an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn tokens_of(&self, owner: &Address) -> Result<Vec<u64>> {
        self.ids(
            "SELECT token_id FROM tokens WHERE owner = ?1 ORDER BY token_id",
            [owner],
        )
    }

    // === Events ===

    /// Append an event to the log and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_event(
        &self,
        block_number: u64,
        tx_hash: &TxHash,
        kind: EventKind,
        payload: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO events (block_number, tx_hash, kind, payload, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                sql_id(block_number)?,
                tx_hash,
                kind,
                serde_json::to_string(payload)?,
                timestamp.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recent events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<LedgerEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY id DESC LIMIT ?1"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let events = stmt
            .query_map([limit_i64], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Count logged events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_events(&self) -> Result<u64> {
        self.count("events")
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<LedgerEvent> {
        let payload_text: String = row.get(4)?;
        let payload = serde_json::from_str(&payload_text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(LedgerEvent {
            id: row.get(0)?,
            block_number: id_at(row, 1)?,
            tx_hash: row.get(2)?,
            kind: row.get(3)?,
            payload,
            timestamp: timestamp_at(row, 5)?,
        })
    }

    // === Statistics ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let tokens = self.count("tokens")?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            experiments: self.count_experiments()?,
            datasets: self.count_datasets()?,
            tokens,
            events: self.count_events()?,
            block_number: self.block_number()?,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Number of experiments.
    pub experiments: u64,
    /// Number of datasets.
    pub datasets: u64,
    /// Number of minted tokens.
    pub tokens: u64,
    /// Number of logged events.
    pub events: u64,
    /// Current block number.
    pub block_number: u64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
