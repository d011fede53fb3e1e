//! # dbmigrate
//!
//! Dependency-ordered, batched copying of every row of a relational database
//! into another one whose schema already exists.
//!
//! - **Foreign-key aware**: tables are loaded parents first and emptied
//!   children first
//! - **Batched inserts**: one multi-row INSERT per chunk of records
//! - **Fail fast**: the first failing table stops the run and is reported
//!   with the rows it had committed
//! - **Drivers** for SQLite and MySQL/MariaDB on either side
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbmigrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> dbmigrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let report = orchestrator.run().await.into_result()?;
//!     println!("Migrated {} rows", report.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod transcode;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, DatabaseType, MigrationConfig};
pub use crate::core::{
    ColumnDescriptor, ColumnKind, ForeignKey, Row, SourceReader, SqlNullType, SqlValue,
    TableDescriptor, TargetWriter,
};
pub use error::{MigrateError, Result};
pub use loader::BatchLoader;
pub use orchestrator::{
    HealthCheckResult, MigrationResult, Orchestrator, PlanReport, RunPhase, RunReport, RunStatus,
    TableOutcome, TableValidation,
};
pub use planner::{plan, MigrationPlan, PlanSource};
pub use report::{
    ChannelSink, CollectingSink, FanoutSink, JsonLinesSink, MigrationEvent, ReportSink,
    TracingSink,
};
pub use transcode::{transcode, RecordMap};
