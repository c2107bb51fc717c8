//! s3tap - CSV-over-S3 extraction tap
//!
//! Thin orchestration over the library: argument parsing, logging setup,
//! and line-delimited JSON framing of the catalog and record stream on
//! stdout. Logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use s3tap::config::TapConfig;
use s3tap::discover::{discover, Catalog};
use s3tap::state::FileStateStore;
use s3tap::storage::{config::StorageConfig, Storage};
use s3tap::sync::{sync_all, RecordSink};
use s3tap_common::logging::{init_logging, LogConfig, LogLevel};
use s3tap_common::TapError;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "s3tap")]
#[command(author, version, about = "CSV-over-S3 extraction tap")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Infer schemas for all configured tables and print the catalog
    Discover {
        /// Tap configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Extract selected streams incrementally
    Sync {
        /// Tap configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Catalog produced by a previous discover run
        #[arg(long)]
        catalog: PathBuf,

        /// Bookmark state file, created if absent
        #[arg(long, default_value = "state.json")]
        state: PathBuf,
    },
}

/// Singer-style line-delimited JSON messages on stdout.
struct MessageWriter;

impl MessageWriter {
    fn write_line(&self, message: &Value) -> s3tap_common::Result<()> {
        let mut stdout = std::io::stdout().lock();
        let line = serde_json::to_string(message)?;
        writeln!(stdout, "{}", line)?;
        Ok(())
    }
}

impl RecordSink for MessageWriter {
    fn schema(
        &self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
    ) -> s3tap_common::Result<()> {
        self.write_line(&json!({
            "type": "SCHEMA",
            "stream": stream,
            "schema": schema,
            "key_properties": key_properties,
        }))
    }

    fn record(&self, stream: &str, values: &Map<String, Value>) -> s3tap_common::Result<()> {
        self.write_line(&json!({
            "type": "RECORD",
            "stream": stream,
            "record": values,
        }))
    }

    fn state(&self, state: &Value) -> s3tap_common::Result<()> {
        self.write_line(&json!({
            "type": "STATE",
            "value": state,
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Environment configuration first, then the verbose flag on top
    let mut log_config = LogConfig::from_env().unwrap_or_else(|_| {
        LogConfig::builder()
            .log_file_prefix("s3tap".to_string())
            .build()
    });
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    init_logging(&log_config)?;

    match cli.command {
        Command::Discover { config } => {
            info!("Starting discover");
            let config = TapConfig::from_file(config)?;
            let storage = Storage::new(StorageConfig::from_env()?, &config.bucket).await?;

            let catalog = discover(&storage, &config).await.map_err(fatal)?;
            println!("{}", serde_json::to_string_pretty(&catalog)?);
            info!("Finished discover");
        },
        Command::Sync {
            config,
            catalog,
            state,
        } => {
            info!("Starting sync");
            let config = TapConfig::from_file(config)?;
            let catalog = Catalog::from_file(catalog)?;
            let store = FileStateStore::load(&state)?;
            let storage = Storage::new(StorageConfig::from_env()?, &config.bucket).await?;
            let sink = MessageWriter;

            let results = sync_all(&storage, &config, &catalog, &store, &sink)
                .await
                .map_err(fatal)?;

            for (table, report) in &results {
                info!(
                    table = %table,
                    records = report.records,
                    skipped_rows = report.skipped_rows,
                    coercion_fallbacks = report.coercion_fallbacks,
                    "stream summary"
                );
            }
            info!("Done syncing");
        },
    }

    Ok(())
}

/// Name the failing table and condition before the process exits non-zero.
fn fatal(err: TapError) -> anyhow::Error {
    tracing::error!("{}", err);
    anyhow::Error::new(err)
}
