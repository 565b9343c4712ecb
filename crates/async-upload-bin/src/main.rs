//! async-upload - submit a staged batch to an asynchronous destination.

mod logging;

use std::path::{Path, PathBuf};

use async_destination_manager::{
    generate_failed_payload, AsyncDestinationManager, JobRecord, ManagerConfig, StagedBatch,
    UploadError, UploadResult,
};
use clap::{Parser, Subcommand};
use logging::{init_logging, LogFormat};
use serde_json::{Map, Value};
use tracing::error;

/// Async destination upload command-line interface.
#[derive(Parser)]
#[command(name = "async-upload")]
#[command(about = "Upload staged jobs to an asynchronous destination and classify the result")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    log_format: LogFormat,

    /// Manager configuration file (JSON). Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a staged JSONL file and print the outcome
    Upload {
        /// Destination upload endpoint
        #[arg(long)]
        url: String,
        /// Staged JSONL file, one {"message", "metadata"} object per line
        #[arg(long)]
        staged_file: PathBuf,
        /// Destination type
        #[arg(long)]
        dest_type: String,
        /// Destination configuration (JSON object file)
        #[arg(long)]
        dest_config: Option<PathBuf>,
        /// Jobs already failed before this upload
        #[arg(long, value_delimiter = ',')]
        failed_job_ids: Vec<i64>,
        /// Jobs staged in the file
        #[arg(long, value_delimiter = ',')]
        importing_job_ids: Vec<i64>,
        /// Destination ID reported in the outcome
        #[arg(long, default_value = "")]
        destination_id: String,
    },
    /// Build the failed-payload report for a set of jobs
    FailedPayload {
        /// JSONL file of {"job_id", "event_payload"} records
        #[arg(long)]
        jobs_file: PathBuf,
        /// Destination type
        #[arg(long)]
        dest_type: String,
        /// Destination import ID
        #[arg(long)]
        import_id: String,
        /// CSV header schema of the import
        #[arg(long, default_value = "")]
        csv_header: String,
        /// Destination configuration (JSON object file)
        #[arg(long)]
        dest_config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    if let Err(e) = run(cli).await {
        error!(error = %e, "async-upload failed");
        return Err(e.into());
    }

    Ok(())
}

async fn run(cli: Cli) -> UploadResult<()> {
    let config = match cli.config {
        Some(path) => ManagerConfig::load_from_file(&path)?,
        None => ManagerConfig::new(),
    };

    match cli.command {
        Commands::Upload {
            url,
            staged_file,
            dest_type,
            dest_config,
            failed_job_ids,
            importing_job_ids,
            destination_id,
        } => {
            let dest_config = load_dest_config(dest_config.as_deref())?;
            let manager = AsyncDestinationManager::with_http(config)?;

            let mut batch = StagedBatch::new(&destination_id, &url, staged_file);
            batch.failed_job_ids = failed_job_ids;
            batch.importing_job_ids = importing_job_ids;
            batch.count = batch.importing_job_ids.len();

            let outcome = manager.upload(&batch, &dest_config, &dest_type).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::FailedPayload {
            jobs_file,
            dest_type,
            import_id,
            csv_header,
            dest_config,
        } => {
            let dest_config = load_dest_config(dest_config.as_deref())?;
            let jobs = load_job_records(&jobs_file)?;
            let payload =
                generate_failed_payload(&dest_config, &jobs, &import_id, &dest_type, &csv_header)?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
    }

    Ok(())
}

fn load_dest_config(path: Option<&Path>) -> UploadResult<Map<String, Value>> {
    let Some(path) = path else {
        return Ok(Map::new());
    };
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn load_job_records(path: &Path) -> UploadResult<Vec<JobRecord>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| UploadError::MalformedJob {
                line: index + 1,
                source,
            })
        })
        .collect()
}
