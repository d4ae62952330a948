//! env-migrate CLI - one-shot environment migration driver.
//!
//! Invokes the migration coordinator and nothing else: configuration comes
//! from environment variables, progress goes to stdout, and the process
//! exits non-zero only on fatal errors. Per-table and per-asset failures are
//! reported in the summary with exit code 0.

use clap::Parser;
use env_migrate::{Config, MigrateError, Orchestrator};
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "env-migrate")]
#[command(about = "Clone a site environment: schema, rows and media assets")]
#[command(version)]
struct Cli {
    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Output the run report as JSON to stdout
    #[arg(long)]
    output_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    // A local .env is a convenience for operators; real deployments set the
    // variables directly.
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!("Configuration loaded from environment");

    let orchestrator = Orchestrator::new(config).await?;
    let report = orchestrator.run().await?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("\nMigration completed!");
        println!("  Run ID: {}", report.run_id);
        println!("  Duration: {:.2}s", report.duration_seconds);
        println!(
            "  Tables: {}/{} copied ({} skipped, {} failed)",
            report.tables_copied, report.tables_total, report.tables_skipped, report.tables_failed
        );
        println!("  Rows: {}", report.rows_written);
        println!(
            "  Assets: {} migrated, {} failed",
            report.assets_migrated, report.assets_failed
        );
        if !report.failed_tables().is_empty() {
            println!("  Failed tables: {:?}", report.failed_tables());
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
