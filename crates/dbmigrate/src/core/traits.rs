//! Core traits for database-agnostic data migration.
//!
//! - [`SourceReader`]: introspects the source catalog and reads rows
//! - [`TargetWriter`]: empties destination tables and inserts chunks of records
//!
//! Each implementation owns a single session for the whole run. Settings that
//! are scoped to a session (MySQL `FOREIGN_KEY_CHECKS`, SQLite
//! `PRAGMA foreign_keys`) therefore apply to every statement that follows.

use async_trait::async_trait;

use crate::error::Result;
use crate::transcode::RecordMap;

use super::schema::{ForeignKey, TableDescriptor};
use super::value::Row;

/// Read schema and data from a source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// All user tables, ordered by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describe one table from the live catalog.
    ///
    /// Fails with [`MigrateError::Schema`](crate::MigrateError::Schema) when
    /// the table does not exist or its metadata cannot be read.
    async fn describe(&self, table: &str) -> Result<TableDescriptor>;

    /// Foreign keys whose referencing table is one of `tables`.
    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKey>>;

    /// Read every row of a table, columns in descriptor order.
    async fn read_rows(&self, table: &TableDescriptor) -> Result<Vec<Row>>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "sqlite", "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// Write data to a destination database whose schema already exists.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Turn foreign-key enforcement on or off for this session.
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()>;

    /// Remove every row from a table.
    async fn clear_table(&self, table: &str) -> Result<()>;

    /// Insert one chunk of records as a single statement.
    ///
    /// All records share the key order of the first record. Returns the
    /// number of rows written.
    async fn insert_chunk(&self, table: &str, records: &[RecordMap]) -> Result<u64>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "sqlite", "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}
