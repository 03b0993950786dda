//! Schema versioning for the ledger database.
//!
//! The schema version lives in SQLite's `user_version` pragma. Each entry of
//! [`MIGRATIONS`] moves the database one version forward inside its own
//! transaction, so a failed step leaves the previous version intact.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Metadata key holding the chain height.
pub const BLOCK_NUMBER_KEY: &str = "block_number";

struct Migration {
    version: u32,
    description: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create ledger tables",
        apply: create_tables,
    },
    Migration {
        version: 2,
        description: "seed the chain height counter",
        apply: seed_block_number,
    },
];

/// Bring the database schema up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if a migration fails or the database was written by a
/// newer build.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > version) {
        debug!(
            "Applying migration {}: {}",
            migration.version, migration.description
        );
        let tx = conn.unchecked_transaction()?;
        (migration.apply)(&tx)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
    }

    if version < CURRENT_VERSION {
        info!(
            "Ledger schema migrated from version {} to {}",
            version, CURRENT_VERSION
        );
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn create_tables(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

// Ledgers written before the counter existed continue from their last
// logged block.
fn seed_block_number(conn: &Connection) -> Result<()> {
    let last_block: i64 = conn.query_row(
        "SELECT COALESCE(MAX(block_number), 0) FROM events",
        [],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES (?1, ?2)",
        (BLOCK_NUMBER_KEY, last_block.to_string()),
    )?;
    Ok(())
}
