//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default rows per INSERT chunk.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default MySQL port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database rows are read from.
    pub source: DatabaseConfig,

    /// Database rows are written to. Its tables must already exist.
    pub target: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Sqlite => f.write_str("sqlite"),
            DatabaseType::Mysql => f.write_str("mysql"),
        }
    }
}

/// Connection descriptor for one side of the migration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database engine.
    pub r#type: DatabaseType,

    /// Database file (SQLite only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Database host (MySQL).
    #[serde(default)]
    pub host: String,

    /// Database port (default: 3306 for MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name (MySQL).
    #[serde(default)]
    pub database: String,

    /// Username (MySQL).
    #[serde(default)]
    pub user: String,

    /// Password (MySQL).
    #[serde(default)]
    pub password: String,

    /// TLS mode for MySQL: disable, prefer, require, verify-ca, verify-full.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per INSERT chunk (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tables to migrate. Empty means every table the source catalog lists.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Fixed migration order. When absent the order is computed from foreign keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_order: Option<Vec<String>>,

    /// Empty destination tables before loading (default: true).
    #[serde(default = "default_true")]
    pub clear_target: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            tables: Vec::new(),
            table_order: None,
            clear_target: true,
        }
    }
}

impl MigrationConfig {
    /// Tables named by configuration, if any. An explicit order doubles as the set.
    pub fn configured_tables(&self) -> Option<Vec<String>> {
        if !self.tables.is_empty() {
            Some(self.tables.clone())
        } else {
            self.table_order.clone()
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_true() -> bool {
    true
}
