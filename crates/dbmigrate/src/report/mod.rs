//! Run events and the sinks that receive them.
//!
//! The orchestrator emits one [`MigrationEvent`] per observable step. Sinks
//! decide what to do with them: log through `tracing`, print JSON lines for a
//! supervising process, forward over a channel, or keep them for inspection.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::orchestrator::RunPhase;
use crate::planner::PlanSource;

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    RunStarted {
        run_id: String,
        source: String,
        target: String,
    },
    PlanReady {
        tables: Vec<String>,
        source: PlanSource,
    },
    ClearingStarted {
        tables: usize,
    },
    TableCleared {
        table: String,
    },
    ClearingFinished,
    TableStarted {
        table: String,
        index: usize,
        total: usize,
    },
    TableSucceeded {
        table: String,
        rows: u64,
        duration_seconds: f64,
    },
    TableFailed {
        table: String,
        rows_committed: u64,
        reason: String,
    },
    RunAborted {
        phase: RunPhase,
        table: Option<String>,
        cause: String,
    },
    RunCompleted {
        tables: usize,
        rows: u64,
        duration_seconds: f64,
    },
}

/// Receiver of run events.
///
/// Emission is fire-and-forget: a sink that cannot deliver an event must not
/// fail the run.
pub trait ReportSink: Send + Sync {
    fn emit(&self, event: &MigrationEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, event: &MigrationEvent) {
        match event {
            MigrationEvent::RunStarted {
                run_id,
                source,
                target,
            } => info!("Starting migration run {}: {} -> {}", run_id, source, target),
            MigrationEvent::PlanReady { tables, source } => info!(
                "Migration order ({:?}, {} tables): {}",
                source,
                tables.len(),
                tables.join(", ")
            ),
            MigrationEvent::ClearingStarted { tables } => {
                info!("Clearing {} destination tables", tables)
            }
            MigrationEvent::TableCleared { table } => info!("{}: cleared", table),
            MigrationEvent::ClearingFinished => info!("Destination cleared"),
            MigrationEvent::TableStarted {
                table,
                index,
                total,
            } => info!("[{}/{}] Migrating {}", index + 1, total, table),
            MigrationEvent::TableSucceeded {
                table,
                rows,
                duration_seconds,
            } => info!(
                "\u{2713} {}: {} rows in {:.2}s",
                table, rows, duration_seconds
            ),
            MigrationEvent::TableFailed {
                table,
                rows_committed,
                reason,
            } => error!(
                "\u{00d7} {}: failed after {} rows: {}",
                table, rows_committed, reason
            ),
            MigrationEvent::RunAborted {
                phase,
                table,
                cause,
            } => match table {
                Some(table) => error!("Migration aborted in {:?} at {}: {}", phase, table, cause),
                None => error!("Migration aborted in {:?}: {}", phase, cause),
            },
            MigrationEvent::RunCompleted {
                tables,
                rows,
                duration_seconds,
            } => info!(
                "Migration completed: {} tables, {} rows in {:.1}s",
                tables, rows, duration_seconds
            ),
        }
    }
}

/// Writes each event as one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesSink<std::io::Stderr> {
    /// Progress lines on stderr, keeping stdout free for the final report.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn emit(&self, event: &MigrationEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize progress event: {}", e);
                return;
            }
        };
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Failed to write progress event: {}", e);
        }
    }
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MigrationEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<MigrationEvent>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MigrationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReportSink for ChannelSink {
    fn emit(&self, event: &MigrationEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<MigrationEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<MigrationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReportSink for CollectingSink {
    fn emit(&self, event: &MigrationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Delivers every event to each of several sinks, in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ReportSink for FanoutSink {
    fn emit(&self, event: &MigrationEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
