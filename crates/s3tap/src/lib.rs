//! s3tap Library
//!
//! An extraction connector that turns CSV files in an S3 bucket into a
//! schema-tagged, incrementally replicable record stream.
//!
//! # Subsystems
//!
//! - **Discovery**: samples matching objects per table and infers a
//!   JSON-schema-shaped column type mapping (see [`discover`])
//! - **Sync**: replays objects past a persisted per-table bookmark,
//!   coercing rows to the discovered schema (see [`sync`])
//!
//! # Example
//!
//! ```no_run
//! use s3tap::config::TapConfig;
//! use s3tap::storage::{config::StorageConfig, Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TapConfig::from_file("tap.json")?;
//!     let storage = Storage::new(StorageConfig::from_env()?, &config.bucket).await?;
//!     let catalog = s3tap::discover::discover(&storage, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&catalog)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discover;
pub mod listing;
pub mod reader;
pub mod state;
pub mod storage;
pub mod sync;
pub mod typing;
