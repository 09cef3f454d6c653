//! SQLite bootstrap for the record store.
//!
//! # Responsibility
//! - Hand out connections whose record tables are ready for
//!   `SqliteRecordStore`.
//! - Own the versioned schema (see `migrations`).
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - No record is read or written before migrations succeed.

use crate::model::SObjectType;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Tables the record store writes to, one per object type.
pub const RECORD_OBJECTS: [SObjectType; 5] = [
    SObjectType::Account,
    SObjectType::Contact,
    SObjectType::Opportunity,
    SObjectType::Lead,
    SObjectType::Case,
];

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A registered migration failed; nothing from the run was kept.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Connection opened but a record table is absent.
    SchemaNotReady(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "migration {version} ({name}) failed: {source}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "record database is at schema {db_version}, this build knows up to {latest_supported}"
            ),
            Self::SchemaNotReady(table) => {
                write!(f, "record table `{table}` is missing; run migrations first")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::SchemaNotReady(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Fails with `SchemaNotReady` naming the first record table that is absent.
pub fn ensure_record_tables(conn: &Connection) -> DbResult<()> {
    let mut stmt = conn.prepare(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
    )?;
    for object in RECORD_OBJECTS {
        let table = object.table_name();
        if !stmt.query_row([table], |row| row.get::<_, bool>(0))? {
            return Err(DbError::SchemaNotReady(table));
        }
    }
    Ok(())
}
