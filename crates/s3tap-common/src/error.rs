//! Error types for s3tap

use thiserror::Error;

/// Result type alias for tap operations
pub type Result<T> = std::result::Result<T, TapError>;

/// Main error type for s3tap
///
/// Structural problems (listing, discovery, schema shape, configuration)
/// are fatal and abort the run. `MalformedRow` is constructed for
/// logging and counting only; row-level problems never propagate.
#[derive(Error, Debug)]
pub enum TapError {
    #[error("no objects match table '{table}' under prefix '{prefix}'")]
    Listing { table: String, prefix: String },

    #[error("discovery failed for table '{table}': {source}")]
    Discovery {
        table: String,
        #[source]
        source: Box<TapError>,
    },

    #[error("schema error in table '{table}': {message}")]
    Schema { table: String, message: String },

    #[error("malformed row in '{key}' line {line}: header has {expected} fields, row has {actual}")]
    MalformedRow {
        key: String,
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("state error: {0}")]
    State(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TapError {
    /// Whether this error aborts the run.
    ///
    /// Everything except a malformed row is fatal; a bad row is skipped
    /// and surfaced as a warning by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TapError::MalformedRow { .. })
    }
}
