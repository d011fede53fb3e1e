//! Migration orchestrator - main workflow coordinator.
//!
//! A run moves through `Initializing -> ClearingDestination -> MigratingTables
//! -> Reporting -> Done`, or stops in `Aborted` from any of the first three.
//! Tables are migrated one at a time in plan order and the first failure ends
//! the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, MigrationConfig};
use crate::core::{SourceReader, TableDescriptor, TargetWriter};
use crate::drivers;
use crate::error::{MigrateError, Result};
use crate::loader::BatchLoader;
use crate::planner::{self, MigrationPlan};
use crate::report::{MigrationEvent, ReportSink, TracingSink};
use crate::transcode;

/// Run state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    ClearingDestination,
    MigratingTables,
    Reporting,
    Done,
    Aborted,
}

/// Outcome of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TableOutcome {
    Success,
    Failure { reason: String },
}

/// Result of migrating one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationResult {
    /// Table name.
    pub table: String,

    /// Rows written. On failure, rows committed before the failing chunk.
    pub rows_migrated: u64,

    #[serde(flatten)]
    pub outcome: TableOutcome,

    /// Wall time spent on the table.
    pub duration_seconds: f64,
}

impl MigrationResult {
    pub fn is_success(&self) -> bool {
        self.outcome == TableOutcome::Success
    }
}

/// Final status of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted {
        phase: RunPhase,
        table: Option<String>,
        cause: String,
    },
}

/// Report of a migration run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// Plan the run followed, if planning got that far.
    pub plan: Option<MigrationPlan>,

    /// One entry per attempted table, in plan order.
    pub results: Vec<MigrationResult>,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    #[serde(skip)]
    error: Option<MigrateError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The error that aborted the run.
    pub fn error(&self) -> Option<&MigrateError> {
        self.error.as_ref()
    }

    /// Process exit code: 0 on success, else the aborting error's code.
    pub fn exit_code(&self) -> u8 {
        self.error.as_ref().map_or(0, MigrateError::exit_code)
    }

    /// Turn an aborted run into its error.
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Tables resolved and ordered for a run, without touching data.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub plan: MigrationPlan,

    /// Descriptors in plan order.
    pub tables: Vec<TableDescriptor>,
}

/// Row counts of one table on both sides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableValidation {
    pub table: String,
    pub source_count: i64,
    /// `None` when the destination count could not be read.
    pub target_count: Option<i64>,
    pub matches: bool,
}

/// Result of pinging both databases.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Why a run stopped.
struct Abort {
    phase: RunPhase,
    table: Option<String>,
    error: MigrateError,
}

impl Abort {
    fn new(phase: RunPhase, error: MigrateError) -> Self {
        Self {
            phase,
            table: None,
            error,
        }
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    migration: MigrationConfig,
    source: Box<dyn SourceReader>,
    target: Box<dyn TargetWriter>,
    source_label: String,
    target_label: String,
    sink: Arc<dyn ReportSink>,
}

impl Orchestrator {
    /// Connect to both databases described by `config`.
    pub async fn new(config: Config) -> Result<Self> {
        info!("Connecting to source {}", config.source.describe());
        let source = drivers::connect_source(&config.source).await?;

        info!("Connecting to target {}", config.target.describe());
        let target = match drivers::connect_target(&config.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::with_connections(source, target, config.migration)
            .with_labels(config.source.describe(), config.target.describe()))
    }

    /// Build an orchestrator around already-open connections.
    pub fn with_connections(
        source: Box<dyn SourceReader>,
        target: Box<dyn TargetWriter>,
        migration: MigrationConfig,
    ) -> Self {
        let source_label = source.db_type().to_string();
        let target_label = target.db_type().to_string();
        Self {
            migration,
            source,
            target,
            source_label,
            target_label,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the event sink (default: [`TracingSink`]).
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    fn with_labels(mut self, source: String, target: String) -> Self {
        self.source_label = source;
        self.target_label = target;
        self
    }

    fn emit(&self, event: MigrationEvent) {
        self.sink.emit(&event);
    }

    fn enter(&self, phase: RunPhase) {
        debug!("Run phase: {:?}", phase);
    }

    /// Run the migration and close both connections.
    ///
    /// Never returns early with an error: aborts are described by the report.
    pub async fn run(self) -> RunReport {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        self.emit(MigrationEvent::RunStarted {
            run_id: run_id.clone(),
            source: self.source_label.clone(),
            target: self.target_label.clone(),
        });

        let mut plan = None;
        let mut results = Vec::new();
        let outcome = self.execute(&mut plan, &mut results).await;

        self.enter(RunPhase::Reporting);
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred: u64 = results.iter().map(|r| r.rows_migrated).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as i64
        } else {
            0
        };

        let (status, error) = match outcome {
            Ok(()) => {
                self.emit(MigrationEvent::RunCompleted {
                    tables: results.len(),
                    rows: rows_transferred,
                    duration_seconds: duration,
                });
                self.enter(RunPhase::Done);
                (RunStatus::Completed, None)
            }
            Err(abort) => {
                let cause = abort.error.to_string();
                self.emit(MigrationEvent::RunAborted {
                    phase: abort.phase,
                    table: abort.table.clone(),
                    cause: cause.clone(),
                });
                self.enter(RunPhase::Aborted);
                (
                    RunStatus::Aborted {
                        phase: abort.phase,
                        table: abort.table,
                        cause,
                    },
                    Some(abort.error),
                )
            }
        };

        self.close().await;

        RunReport {
            run_id,
            status,
            plan,
            results,
            started_at,
            completed_at,
            duration_seconds: duration,
            rows_transferred,
            rows_per_second,
            error,
        }
    }

    async fn execute(
        &self,
        plan_out: &mut Option<MigrationPlan>,
        results: &mut Vec<MigrationResult>,
    ) -> std::result::Result<(), Abort> {
        self.enter(RunPhase::Initializing);
        let loader = BatchLoader::new(self.migration.batch_size)
            .map_err(|e| Abort::new(RunPhase::Initializing, e))?;
        let prepared = self
            .prepare()
            .await
            .map_err(|e| Abort::new(RunPhase::Initializing, e))?;

        self.emit(MigrationEvent::PlanReady {
            tables: prepared.plan.tables.clone(),
            source: prepared.plan.source,
        });
        *plan_out = Some(prepared.plan.clone());

        if self.migration.clear_target {
            self.enter(RunPhase::ClearingDestination);
            self.clear_destination(&prepared.plan)
                .await
                .map_err(|e| Abort::new(RunPhase::ClearingDestination, e))?;
        } else {
            info!("Skipping destination clearing");
        }

        self.enter(RunPhase::MigratingTables);
        let total = prepared.tables.len();
        for (index, table) in prepared.tables.iter().enumerate() {
            self.emit(MigrationEvent::TableStarted {
                table: table.name.clone(),
                index,
                total,
            });

            let started = Instant::now();
            match self.migrate_table(table, &loader).await {
                Ok(rows) => {
                    let duration_seconds = started.elapsed().as_secs_f64();
                    results.push(MigrationResult {
                        table: table.name.clone(),
                        rows_migrated: rows,
                        outcome: TableOutcome::Success,
                        duration_seconds,
                    });
                    self.emit(MigrationEvent::TableSucceeded {
                        table: table.name.clone(),
                        rows,
                        duration_seconds,
                    });
                }
                Err(e) => {
                    let rows_committed = match &e {
                        MigrateError::Load { rows_committed, .. } => *rows_committed,
                        _ => 0,
                    };
                    let reason = e.to_string();
                    results.push(MigrationResult {
                        table: table.name.clone(),
                        rows_migrated: rows_committed,
                        outcome: TableOutcome::Failure {
                            reason: reason.clone(),
                        },
                        duration_seconds: started.elapsed().as_secs_f64(),
                    });
                    self.emit(MigrationEvent::TableFailed {
                        table: table.name.clone(),
                        rows_committed,
                        reason,
                    });
                    return Err(Abort {
                        phase: RunPhase::MigratingTables,
                        table: Some(table.name.clone()),
                        error: e,
                    });
                }
            }
        }

        Ok(())
    }

    /// Tables named by configuration, else everything the source lists.
    async fn resolve_tables(&self) -> Result<Vec<String>> {
        match self.migration.configured_tables() {
            Some(tables) => Ok(tables),
            None => {
                let tables = self.source.list_tables().await?;
                info!("Found {} tables in source", tables.len());
                Ok(tables)
            }
        }
    }

    /// Resolve, describe and order the migration set.
    async fn prepare(&self) -> Result<PlanReport> {
        let names = self.resolve_tables().await?;

        let mut described: HashMap<String, TableDescriptor> = HashMap::with_capacity(names.len());
        for name in &names {
            let table = self.source.describe(name).await?;
            debug!("{}: {} columns", name, table.arity());
            described.insert(name.clone(), table);
        }

        let plan = match &self.migration.table_order {
            Some(order) => MigrationPlan::explicit(order.clone()),
            None => {
                let foreign_keys = self.source.foreign_keys(&names).await?;
                debug!("Found {} foreign keys", foreign_keys.len());
                planner::plan(&names, &foreign_keys)?
            }
        };

        let mut tables = Vec::with_capacity(plan.len());
        for name in &plan.tables {
            let table = match described.remove(name) {
                Some(table) => table,
                None => self.source.describe(name).await?,
            };
            tables.push(table);
        }

        Ok(PlanReport { plan, tables })
    }

    /// Empty every planned table in reverse order with FK enforcement off.
    ///
    /// Enforcement is switched back on even when clearing fails; a failure of
    /// that last step only surfaces if nothing failed before it.
    async fn clear_destination(&self, plan: &MigrationPlan) -> Result<()> {
        self.emit(MigrationEvent::ClearingStarted { tables: plan.len() });

        self.target
            .set_foreign_key_checks(false)
            .await
            .map_err(|e| MigrateError::clear("disable foreign key checks", e))?;

        let mut outcome = Ok(());
        for table in plan.clear_order() {
            if let Err(e) = self.target.clear_table(table).await {
                outcome = Err(MigrateError::clear(format!("clear {}", table), e));
                break;
            }
            self.emit(MigrationEvent::TableCleared {
                table: table.to_string(),
            });
        }

        if let Err(e) = self.target.set_foreign_key_checks(true).await {
            if outcome.is_ok() {
                outcome = Err(MigrateError::clear("re-enable foreign key checks", e));
            } else {
                warn!("Failed to re-enable foreign key checks: {}", e);
            }
        }

        if outcome.is_ok() {
            self.emit(MigrationEvent::ClearingFinished);
        }
        outcome
    }

    async fn migrate_table(&self, table: &TableDescriptor, loader: &BatchLoader) -> Result<u64> {
        let rows = self.source.read_rows(table).await?;
        debug!("{}: read {} rows", table.name, rows.len());
        let records = transcode::transcode_all(rows, table)?;
        loader.load(self.target.as_ref(), &table.name, &records).await
    }

    /// Dry run: resolve and order the tables without touching the destination.
    pub async fn plan(&self) -> Result<PlanReport> {
        let report = self.prepare().await?;
        self.emit(MigrationEvent::PlanReady {
            tables: report.plan.tables.clone(),
            source: report.plan.source,
        });
        Ok(report)
    }

    /// Validate row counts between source and target.
    pub async fn validate(&self) -> Result<Vec<TableValidation>> {
        let tables = self.resolve_tables().await?;
        let mut results = Vec::with_capacity(tables.len());

        for table in tables {
            let source_count = self.source.row_count(&table).await?;
            let target_count = match self.target.row_count(&table).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!("{}: cannot count destination rows: {}", table, e);
                    None
                }
            };

            let matches = target_count == Some(source_count);
            if matches {
                info!("{}: {} rows (match)", table, source_count);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table,
                    source_count,
                    target_count.map_or_else(|| "?".to_string(), |c| c.to_string())
                );
            }

            results.push(TableValidation {
                table,
                source_count,
                target_count,
                matches,
            });
        }

        Ok(results)
    }

    /// Ping both databases and time the round trips.
    pub async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            target_connected: target.is_ok(),
            target_latency_ms,
            healthy: source.is_ok() && target.is_ok(),
            source_error: source.err().map(|e| e.to_string()),
            target_error: target.err().map(|e| e.to_string()),
        }
    }

    /// Close both connections.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
