//! Configuration validation.

use std::collections::HashSet;

use super::{Config, DatabaseConfig, DatabaseType};
use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    if config.source.same_database(&config.target) {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }

    let tables = unique_names("migration.tables", &migration.tables)?;
    if let Some(order) = &migration.table_order {
        let ordered = unique_names("migration.table_order", order)?;
        if !tables.is_empty() && tables != ordered {
            return Err(MigrateError::Config(
                "migration.tables and migration.table_order must name the same tables".into(),
            ));
        }
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    match db.r#type {
        DatabaseType::Sqlite => {
            if db.path.as_deref().map_or(true, str::is_empty) {
                return Err(MigrateError::Config(format!("{}.path is required", side)));
            }
        }
        DatabaseType::Mysql => {
            if db.host.is_empty() {
                return Err(MigrateError::Config(format!("{}.host is required", side)));
            }
            if db.database.is_empty() {
                return Err(MigrateError::Config(format!(
                    "{}.database is required",
                    side
                )));
            }
            if db.user.is_empty() {
                return Err(MigrateError::Config(format!("{}.user is required", side)));
            }
            SslMode::parse(&db.ssl_mode)?;
        }
    }
    Ok(())
}

fn unique_names<'a>(field: &str, names: &'a [String]) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "{} contains an empty table name",
                field
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(MigrateError::Config(format!(
                "{} lists table '{}' more than once",
                field, name
            )));
        }
    }
    Ok(seen)
}
