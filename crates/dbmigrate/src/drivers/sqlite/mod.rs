//! SQLite database driver.
//!
//! - [`SqliteReader`]: source reader over `PRAGMA` table-valued functions
//! - [`SqliteWriter`]: destination writer using multi-row INSERT
//!
//! Both sides open exactly one connection to an existing database file. The
//! file is never created: the destination schema must already be in place.

mod reader;
mod writer;

pub use reader::SqliteReader;
pub use writer::SqliteWriter;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tokio::sync::MutexGuard;

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};

/// SQLite's default limit on bound parameters per statement.
pub(crate) const SQLITE_MAX_VARIABLES: usize = 32766;

/// Open the single connection a reader or writer holds for the run.
pub(crate) async fn connect(config: &DatabaseConfig, role: &str) -> Result<SqliteConnection> {
    let path = config
        .path
        .as_deref()
        .ok_or_else(|| MigrateError::Config(format!("{}.path is required", role)))?;

    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .connect()
        .await
        .map_err(|e| MigrateError::connection(e, format!("opening SQLite {} {}", role, path)))
}

/// Quote a SQLite identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Borrow the live connection, failing once it has been closed.
pub(crate) fn live<'a>(
    guard: &'a mut MutexGuard<'_, Option<SqliteConnection>>,
) -> Result<&'a mut SqliteConnection> {
    guard
        .as_mut()
        .ok_or_else(|| MigrateError::connection("connection already closed", "sqlite"))
}
