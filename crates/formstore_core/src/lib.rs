//! Persistence core for submitted form data.
//! Stores form entries and their field values in a relational store and
//! reads them back per form and creation window.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{ConfigError, StoreConfig};
pub use db::{
    open_db, open_db_in_memory, DbError, RetryPolicy, Retryer, SqlDataApi, SqlDialect,
    SqliteDataApi,
};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::form_entry::{
    FieldData, FieldDataId, FieldItemId, FormEntry, FormEntryId, FormEntryValidationError,
    FormItemId, Timestamp,
};
pub use repo::form_entry_repo::{FormDataProvider, RepoError, RepoResult, SqlFormDataProvider};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
