//! s3tap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the s3tap workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all s3tap workspace members:
//!
//! - **Error Handling**: The `TapError` taxonomy and `Result` alias
//! - **Logging**: Tracing initialization with console and file output
//!
//! # Example
//!
//! ```no_run
//! use s3tap_common::{Result, TapError};
//!
//! fn lookup_table(tables: &[String], name: &str) -> Result<usize> {
//!     tables
//!         .iter()
//!         .position(|t| t == name)
//!         .ok_or_else(|| TapError::Config(format!("unknown table '{}'", name)))
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, TapError};
