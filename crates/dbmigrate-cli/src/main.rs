//! dbmigrate CLI - dependency-ordered database copy.

use clap::{Parser, Subcommand};
use dbmigrate::{
    Config, FanoutSink, JsonLinesSink, MigrateError, Orchestrator, RunStatus, TracingSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Exit code when `validate` finds differing row counts.
const EXIT_VALIDATION_MISMATCH: u8 = 4;

#[derive(Parser)]
#[command(name = "dbmigrate")]
#[command(about = "Copy every row of one database into another, parents first")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print migration events as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the destination and copy every table
    Run {
        /// Override rows per INSERT chunk
        #[arg(long)]
        batch_size: Option<usize>,

        /// Keep existing destination rows
        #[arg(long)]
        no_clear: bool,
    },

    /// Show the table order without touching data
    Plan,

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            batch_size,
            no_clear,
        } => {
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if no_clear {
                config.migration.clear_target = false;
            }
            config.validate()?;

            let mut orchestrator = Orchestrator::new(config).await?;
            if cli.progress {
                let sink = FanoutSink::new()
                    .with(Arc::new(TracingSink))
                    .with(Arc::new(JsonLinesSink::stderr()));
                orchestrator = orchestrator.with_sink(Arc::new(sink));
            }

            let report = orchestrator.run().await;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let succeeded = report.results.iter().filter(|r| r.is_success()).count();
                let planned = report.plan.as_ref().map_or(0, |p| p.len());
                match &report.status {
                    RunStatus::Completed => println!("\nMigration completed!"),
                    RunStatus::Aborted { phase, table, .. } => {
                        println!("\nMigration aborted during {:?}", phase);
                        if let Some(table) = table {
                            println!("  Failed table: {}", table);
                        }
                    }
                }
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Tables: {}/{}", succeeded, planned);
                println!("  Rows: {}", report.rows_transferred);
                println!("  Throughput: {} rows/sec", report.rows_per_second);
            }

            if let Some(e) = report.error() {
                eprintln!("{}", e.format_detailed());
            }
            Ok(ExitCode::from(report.exit_code()))
        }

        Commands::Plan => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.plan().await;
            orchestrator.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Migration plan ({:?}):", report.plan.source);
                for (i, table) in report.tables.iter().enumerate() {
                    println!("  {:>3}. {} ({} columns)", i + 1, table.name, table.arity());
                }
                let clear: Vec<&str> = report.plan.clear_order().collect();
                println!("\nClear order: {}", clear.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.validate().await;
            orchestrator.close().await;
            let results = result?;

            let mismatched = results.iter().filter(|r| !r.matches).count();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Row counts:");
                for r in &results {
                    println!(
                        "  {} {}: source={} target={}",
                        if r.matches { "✓" } else { "✗" },
                        r.table,
                        r.source_count,
                        r.target_count
                            .map_or_else(|| "?".to_string(), |c| c.to_string())
                    );
                }
                println!("\n  {}/{} tables match", results.len() - mismatched, results.len());
            }

            if mismatched > 0 {
                return Ok(ExitCode::from(EXIT_VALIDATION_MISMATCH));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::HealthCheck => {
            let source_type = config.source.r#type;
            let target_type = config.target.r#type;
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({:?}): {} ({}ms)",
                    source_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({:?}): {} ({}ms)",
                    target_type,
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check failed",
                    "pinging source and target",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
