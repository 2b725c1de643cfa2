//! Linecheck daemon - one-shot line diagnostic, optionally on a schedule.
//!
//! Loads a configuration snapshot, runs one diagnosis (PLC telemetry,
//! blank-image anomaly check, artifact freshness), writes the report and
//! uploads it. With `--interval-secs` the cycle repeats, reloading the
//! configuration before each run.

use anyhow::Result;
use clap::Parser;
use linecheckd::{config, diagnosis};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "linecheckd")]
#[command(about = "Sorting line health-check report generator", long_about = None)]
#[command(version)]
struct Cli {
    /// Remote configuration endpoint serving the JSON settings document
    #[arg(long)]
    config_url: Option<String>,

    /// Root directory scanned for blank reference images
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory the report file is written into
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Watched artifact file (repeatable; replaces the default watch list)
    #[arg(long = "watch", value_name = "FILE")]
    watched_files: Vec<PathBuf>,

    /// Re-run the diagnosis every N seconds instead of exiting
    #[arg(long, value_name = "SECONDS")]
    interval_secs: Option<u64>,

    /// Render and write the report without uploading it
    #[arg(long)]
    no_upload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    info!("linecheckd v{} starting", env!("CARGO_PKG_VERSION"));

    let overrides = config::Overrides {
        data_dir: cli.data_dir.clone(),
        output_dir: cli.output_dir.clone(),
        watched_files: cli.watched_files.clone(),
    };

    loop {
        // Fresh snapshot per cycle: refresh is replace, never mutate.
        let settings = config::load(cli.config_url.as_deref(), &overrides).await;

        match diagnosis::run(&settings, !cli.no_upload).await {
            Ok(outcome) => {
                println!("{}", outcome.report_name);
                if let diagnosis::UploadStatus::Failed { error } = &outcome.upload {
                    info!("report kept locally; upload failed: {}", error);
                }
            }
            Err(e) => match cli.interval_secs {
                // On a schedule, a failed cycle is logged and the next
                // one still runs.
                Some(_) => error!("diagnostic run failed: {:#}", e),
                None => return Err(e),
            },
        }

        match cli.interval_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => break,
        }
    }

    Ok(())
}
