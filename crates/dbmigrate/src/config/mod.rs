//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatabaseConfig {
    /// Short human-readable description of the endpoint, without credentials.
    pub fn describe(&self) -> String {
        match self.r#type {
            DatabaseType::Sqlite => format!("sqlite:{}", self.path.as_deref().unwrap_or("?")),
            DatabaseType::Mysql => format!(
                "mysql://{}:{}/{}",
                self.host,
                self.port.unwrap_or(DEFAULT_MYSQL_PORT),
                self.database
            ),
        }
    }

    /// Whether two descriptors point at the same database.
    pub fn same_database(&self, other: &DatabaseConfig) -> bool {
        if self.r#type != other.r#type {
            return false;
        }
        match self.r#type {
            DatabaseType::Sqlite => match (&self.path, &other.path) {
                (Some(a), Some(b)) => same_file(a, b),
                _ => false,
            },
            DatabaseType::Mysql => {
                self.host == other.host
                    && self.port.unwrap_or(DEFAULT_MYSQL_PORT)
                        == other.port.unwrap_or(DEFAULT_MYSQL_PORT)
                    && self.database == other.database
            }
        }
    }
}

/// Paths that both resolve are compared canonically, others as written.
fn same_file(a: &str, b: &str) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
