//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`sqlite`]: SQLite driver
//! - [`mysql`]: MySQL/MariaDB driver
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `SourceReader` and `TargetWriter`
//! 3. Add a `DatabaseType` variant and wire it into [`connect_source`] and
//!    [`connect_target`]

pub mod mysql;
pub mod sqlite;

pub use mysql::{MysqlReader, MysqlWriter, SslMode};
pub use sqlite::{SqliteReader, SqliteWriter};

use crate::config::{DatabaseConfig, DatabaseType};
use crate::core::{SourceReader, TargetWriter};
use crate::error::Result;

/// Open the source side described by `config`.
pub async fn connect_source(config: &DatabaseConfig) -> Result<Box<dyn SourceReader>> {
    match config.r#type {
        DatabaseType::Sqlite => Ok(Box::new(SqliteReader::connect(config).await?)),
        DatabaseType::Mysql => Ok(Box::new(MysqlReader::connect(config).await?)),
    }
}

/// Open the destination side described by `config`.
pub async fn connect_target(config: &DatabaseConfig) -> Result<Box<dyn TargetWriter>> {
    match config.r#type {
        DatabaseType::Sqlite => Ok(Box::new(SqliteWriter::connect(config).await?)),
        DatabaseType::Mysql => Ok(Box::new(MysqlWriter::connect(config).await?)),
    }
}
