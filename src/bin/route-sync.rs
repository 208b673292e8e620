//! route-sync - fetch new running routes into a GeoJSON file
//!
//! Usage:
//!   route-sync [--output <file>] [--token-dir <dir>] [--page-size <n>] [--activity-type <type>]
//!
//! With no arguments, syncs into `routes.geojson` in the current directory
//! using the session saved in `.garmin_tokens/` (or `GARMIN_TOKEN`).
//! Exits with status 1 if authentication fails.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::error;
use routesync::{ConnectClient, SyncConfig, SyncOrchestrator, SyncReport, load_auth_header};

#[derive(Parser)]
#[command(name = "route-sync")]
#[command(about = "Sync running routes from Garmin Connect into GeoJSON", long_about = None)]
struct Cli {
    /// GeoJSON file to update
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory holding the saved session token
    #[arg(long)]
    token_dir: Option<PathBuf>,

    /// Activities requested per listing page
    #[arg(long)]
    page_size: Option<usize>,

    /// Remote activity type filter (e.g., "running", "trail_running")
    #[arg(long)]
    activity_type: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();
    println!("=== Garmin Running Routes Sync ===\n");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_auth() => {
            error!("{}", e);
            println!("Authentication failed. Log in again or set GARMIN_TOKEN.");
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> routesync::Result<()> {
    let mut config = SyncConfig::from_env()?;
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(token_dir) = cli.token_dir {
        config.token_dir = token_dir;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    if let Some(activity_type) = cli.activity_type {
        config.activity_type = activity_type;
    }
    config.validate()?;

    let auth = load_auth_header(&config, |key| std::env::var(key).ok())?;
    let client = ConnectClient::new(&config, auth)?;

    let mut orchestrator = SyncOrchestrator::from_config(client, &config).with_progress(Arc::new(
        |index: usize, total: usize, name: &str| println!("  [{}/{}] {}", index, total, name),
    ));
    let report = orchestrator.run()?;
    print_summary(&report, &config);
    Ok(())
}

fn print_summary(report: &SyncReport, config: &SyncConfig) {
    if report.total_remote == 0 {
        println!("No {} activities found.", config.activity_type);
    } else if report.is_up_to_date() {
        println!("No new activities to download. Already up to date.");
    } else {
        println!(
            "\nDone! Added {} new routes ({} skipped). Total: {} routes in {}",
            report.added,
            report.skipped_count(),
            report.total_features,
            config.output_path.display()
        );
    }
    for skipped in &report.skipped {
        println!(
            "  Skipped {} ({}): {}",
            skipped.activity_id, skipped.name, skipped.reason
        );
    }
}
