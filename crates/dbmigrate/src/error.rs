//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be opened or used, with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Source introspection failed (missing table, unreadable catalog)
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// The foreign-key graph has no valid total order
    #[error("Cyclic foreign-key dependency between tables: {}", .tables.join(", "))]
    CyclicDependency { tables: Vec<String> },

    /// A row did not line up with its table description
    #[error("Schema mismatch for table {table}: expected {expected} columns, row has {actual}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// The destination rejected a chunk insert
    #[error("Load failed for table {table} at chunk {chunk_index} ({rows_committed} rows committed): {message}")]
    Load {
        table: String,
        chunk_index: usize,
        rows_committed: u64,
        message: String,
    },

    /// Emptying the destination failed
    #[error("Clearing destination failed at {step}: {message}")]
    Clear { step: String, message: String },

    /// Driver error from sqlx
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Driver error from mysql_async
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for introspection and planning errors.
pub const EXIT_SCHEMA_ERROR: u8 = 2;
/// Exit code for destination clearing errors.
pub const EXIT_CLEAR_ERROR: u8 = 3;
/// Exit code for per-table transfer errors.
pub const EXIT_TRANSFER_ERROR: u8 = 4;
/// Exit code for connection and driver errors.
pub const EXIT_CONNECTION_ERROR: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Clear error for the named step
    pub fn clear(step: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Clear {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error is confined to a single table's transfer.
    pub fn is_table_scoped(&self) -> bool {
        matches!(
            self,
            MigrateError::SchemaMismatch { .. } | MigrateError::Load { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Schema { .. } | MigrateError::CyclicDependency { .. } => {
                EXIT_SCHEMA_ERROR
            }
            MigrateError::Clear { .. } => EXIT_CLEAR_ERROR,
            MigrateError::SchemaMismatch { .. } | MigrateError::Load { .. } => {
                EXIT_TRANSFER_ERROR
            }
            MigrateError::Connection { .. } | MigrateError::Sqlx(_) | MigrateError::Mysql(_) => {
                EXIT_CONNECTION_ERROR
            }
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
