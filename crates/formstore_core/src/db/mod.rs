//! Store access layer: SQLite bootstrap and the SQL execution contract.
//!
//! # Responsibility
//! - Open and configure SQLite connections and apply schema migrations.
//! - Define `SqlDataApi`, the narrow executor/transaction contract that
//!   repositories run their query templates through.
//! - Provide the retry wrapper for transient store failures.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Query templates use positional dialect tokens (`{0}`..`{3}`), never
//!   hard-coded quoting or parameter markers.
//! - Dropping a transaction scope without completing it rolls back.

use crate::model::form_entry::Timestamp;
use rusqlite::types::{Null, ToSqlOutput};
use rusqlite::{ErrorCode, ToSql};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod dialect;
pub mod migrations;
mod open;
pub mod retry;
mod sqlite_api;

pub use dialect::SqlDialect;
pub use open::{open_db, open_db_in_memory};
pub use retry::{RetryPolicy, Retryer, TransientError};
pub use sqlite_api::SqliteDataApi;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Required table is missing from the connected schema.
    MissingRequiredTable(&'static str),
    /// Required column is missing from an expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// A stored value cannot be mapped into its record type.
    InvalidData(String),
}

impl DbError {
    /// Returns whether the failure is worth replaying (busy/locked store).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Returns whether the store rejected a write on a constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "form store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "form store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Parameter value bound to a named marker in a query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Uuid(Uuid),
    Text(String),
    Timestamp(Timestamp),
    Null,
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Timestamp> for SqlValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            // UUIDs are persisted in hyphenated text form.
            Self::Uuid(value) => ToSqlOutput::from(value.to_string()),
            Self::Text(value) => ToSqlOutput::from(value.as_str()),
            Self::Timestamp(value) => ToSqlOutput::from(*value),
            Self::Null => ToSqlOutput::from(Null),
        })
    }
}

/// Named parameter passed alongside a query template.
///
/// `name` is the bare parameter name; the dialect supplies marker syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlParam<'a> {
    pub name: &'a str,
    pub value: SqlValue,
}

/// Builds a named parameter.
pub fn param(name: &str, value: impl Into<SqlValue>) -> SqlParam<'_> {
    SqlParam {
        name,
        value: value.into(),
    }
}

/// Positional read access to the current result row.
pub trait DataReader {
    fn get_uuid(&self, index: usize) -> DbResult<Uuid>;
    fn get_string(&self, index: usize) -> DbResult<String>;
    fn get_timestamp(&self, index: usize) -> DbResult<Timestamp>;
}

/// Caller-supplied row-to-record conversion.
pub type RowMapper<T> = fn(&dyn DataReader) -> DbResult<T>;

/// Open transaction. Dropping it without `complete` rolls back.
pub trait TransactionScope {
    /// Commits every statement executed since the scope was opened.
    fn complete(self: Box<Self>) -> DbResult<()>;
}

/// Parameterized SQL executor and transaction provider.
///
/// Templates carry four positional tokens: `{0}`/`{1}` open and close a
/// quoted identifier, `{2}`/`{3}` wrap a named parameter marker.
pub trait SqlDataApi {
    /// Opens a transactional scope on the underlying store.
    fn create_transaction(&self) -> DbResult<Box<dyn TransactionScope + '_>>;

    /// Runs a non-query statement and returns the affected row count.
    ///
    /// Parameters not referenced by the template are ignored.
    fn execute(&self, sql: &str, params: &[SqlParam<'_>]) -> DbResult<usize>;

    /// Runs a query and maps every row through `mapper`.
    fn query_objects<T>(
        &self,
        sql: &str,
        params: &[SqlParam<'_>],
        mapper: RowMapper<T>,
    ) -> DbResult<Vec<T>>;
}

#[cfg(test)]
mod tests {
    use super::{param, DbError, SqlValue};
    use rusqlite::ffi;
    use uuid::Uuid;

    fn sqlite_failure(code: i32) -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn busy_and_locked_failures_are_transient() {
        assert!(sqlite_failure(ffi::SQLITE_BUSY).is_transient());
        assert!(sqlite_failure(ffi::SQLITE_LOCKED).is_transient());
        assert!(!sqlite_failure(ffi::SQLITE_CONSTRAINT).is_transient());
        assert!(!DbError::InvalidData("x".to_string()).is_transient());
    }

    #[test]
    fn constraint_failures_are_classified() {
        assert!(sqlite_failure(ffi::SQLITE_CONSTRAINT).is_constraint_violation());
        assert!(!sqlite_failure(ffi::SQLITE_BUSY).is_constraint_violation());
    }

    #[test]
    fn param_converts_values() {
        let id = Uuid::new_v4();
        assert_eq!(param("id", id).value, SqlValue::Uuid(id));
        assert_eq!(param("created", 5_i64).value, SqlValue::Timestamp(5));
        assert_eq!(
            param("name", "Email").value,
            SqlValue::Text("Email".to_string())
        );
    }
}
