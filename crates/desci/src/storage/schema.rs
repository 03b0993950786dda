//! `SQLite` schema definitions for the ledger.
//!
//! Amounts are stored as decimal TEXT (they exceed `i64`), addresses and hashes
//! as `0x`-prefixed lowercase hex, timestamps as RFC 3339.

/// SQL statement to create the experiments table.
pub const CREATE_EXPERIMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS experiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    researcher TEXT NOT NULL,
    funding_goal TEXT NOT NULL,
    funding_raised TEXT NOT NULL DEFAULT '0',
    deadline TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    funding_complete INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create an index on researcher for portfolio queries.
pub const CREATE_RESEARCHER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_experiments_researcher ON experiments(researcher)
";

/// SQL statement to create the contributions table.
///
/// One row per (experiment, contributor); `id` preserves the order of first
/// contribution.
pub const CREATE_CONTRIBUTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS contributions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER NOT NULL REFERENCES experiments(id),
    contributor TEXT NOT NULL,
    amount TEXT NOT NULL,
    UNIQUE (experiment_id, contributor)
)
";

/// SQL statement to create an index on contributor for portfolio queries.
pub const CREATE_CONTRIBUTOR_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_contributions_contributor ON contributions(contributor)
";

/// SQL statement to create the datasets table.
pub const CREATE_DATASETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS datasets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER NOT NULL REFERENCES experiments(id),
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    owner TEXT NOT NULL,
    data_uri TEXT NOT NULL,
    access_price TEXT NOT NULL,
    is_open_access INTEGER NOT NULL,
    is_nftized INTEGER NOT NULL DEFAULT 0,
    token_uri TEXT,
    citation_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create an index on owner for portfolio queries.
pub const CREATE_OWNER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_datasets_owner ON datasets(owner)
";

/// SQL statement to create an index on `experiment_id` for dataset listings.
pub const CREATE_DATASET_EXPERIMENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_datasets_experiment ON datasets(experiment_id)
";

/// SQL statement to create the access grants table.
pub const CREATE_ACCESS_GRANTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS access_grants (
    dataset_id INTEGER NOT NULL REFERENCES datasets(id),
    account TEXT NOT NULL,
    paid TEXT NOT NULL,
    granted_at TEXT NOT NULL,
    PRIMARY KEY (dataset_id, account)
)
";

/// SQL statement to create the citations table.
pub const CREATE_CITATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS citations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cited_id INTEGER NOT NULL REFERENCES datasets(id),
    citing_id INTEGER NOT NULL REFERENCES datasets(id),
    block_number INTEGER NOT NULL,
    UNIQUE (cited_id, citing_id)
)
";

/// SQL statement to create the NFT tokens table.
pub const CREATE_TOKENS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tokens (
    token_id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    token_uri TEXT NOT NULL,
    minted_at TEXT NOT NULL
)
";

/// SQL statement to create the event log table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_number INTEGER NOT NULL,
    tx_hash TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
";

/// SQL statement to create an index on `block_number` for event queries.
pub const CREATE_EVENTS_BLOCK_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_block ON events(block_number DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_EXPERIMENTS_TABLE,
    CREATE_RESEARCHER_INDEX,
    CREATE_CONTRIBUTIONS_TABLE,
    CREATE_CONTRIBUTOR_INDEX,
    CREATE_DATASETS_TABLE,
    CREATE_OWNER_INDEX,
    CREATE_DATASET_EXPERIMENT_INDEX,
    CREATE_ACCESS_GRANTS_TABLE,
    CREATE_CITATIONS_TABLE,
    CREATE_TOKENS_TABLE,
    CREATE_EVENTS_TABLE,
    CREATE_EVENTS_BLOCK_INDEX,
    CREATE_METADATA_TABLE,
];
