//! Tap configuration and table specifications

use chrono::{DateTime, Utc};
use regex::Regex;
use s3tap_common::{Result, TapError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// Sampling and Concurrency Defaults
// ============================================================================

/// Default number of objects sampled per table during discovery.
pub const DEFAULT_MAX_SAMPLE_FILES: usize = 5;

/// Default number of rows sampled per object during discovery.
pub const DEFAULT_MAX_SAMPLE_ROWS: usize = 1000;

/// Default number of tables synced concurrently.
pub const DEFAULT_MAX_CONCURRENT_TABLES: usize = 4;

/// Default CSV field delimiter.
pub const DEFAULT_DELIMITER: char = ',';

/// Top-level tap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Bucket all tables are read from
    pub bucket: String,

    /// Objects modified before this instant are ignored when no bookmark
    /// exists yet
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// Tables to discover and sync, in input order
    pub tables: Vec<TableSpec>,

    /// Discovery samples at most this many objects per table
    #[serde(default = "default_max_sample_files")]
    pub max_sample_files: usize,

    /// Discovery samples at most this many rows per object
    #[serde(default = "default_max_sample_rows")]
    pub max_sample_rows: usize,

    /// Upper bound on tables synced in parallel
    #[serde(default = "default_max_concurrent_tables")]
    pub max_concurrent_tables: usize,
}

/// One table's extraction specification
///
/// Immutable once loaded; looked up by `table_name` during both
/// discovery and sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Unique stream identifier
    pub table_name: String,

    /// Key prefix the listing is scoped to
    #[serde(default)]
    pub search_prefix: String,

    /// Wildcard pattern matched against the key with the prefix stripped.
    /// `*` matches any run of characters, `?` a single character; the
    /// match is case-sensitive and anchored to the whole remainder.
    pub search_pattern: String,

    /// Primary-key columns, in order. Accepted as a list or as a
    /// comma-joined string.
    #[serde(default, deserialize_with = "comma_separated")]
    pub key_properties: Vec<String>,

    /// Columns forced to date-time regardless of sampled values
    #[serde(default, deserialize_with = "comma_separated")]
    pub date_overrides: Vec<String>,

    /// CSV field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl TableSpec {
    /// Compile the search pattern into an anchored regex.
    pub fn compiled_pattern(&self) -> Result<Regex> {
        let mut pattern = String::from("^");
        for ch in self.search_pattern.chars() {
            match ch {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        Regex::new(&pattern).map_err(|e| {
            TapError::Config(format!(
                "table '{}' has invalid search_pattern '{}': {}",
                self.table_name, self.search_pattern, e
            ))
        })
    }
}

impl TapConfig {
    /// Load and validate a configuration file (JSON)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: TapConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a table spec by stream identifier
    pub fn table(&self, table_name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(TapError::Config("bucket cannot be empty".to_string()));
        }

        if self.tables.is_empty() {
            return Err(TapError::Config(
                "at least one table must be configured".to_string(),
            ));
        }

        if self.max_sample_files == 0 || self.max_sample_rows == 0 {
            return Err(TapError::Config(
                "sample limits must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_tables == 0 {
            return Err(TapError::Config(
                "max_concurrent_tables must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if table.table_name.is_empty() {
                return Err(TapError::Config("table_name cannot be empty".to_string()));
            }

            if !seen.insert(table.table_name.as_str()) {
                return Err(TapError::Config(format!(
                    "duplicate table_name '{}'",
                    table.table_name
                )));
            }

            if !table.delimiter.is_ascii() {
                return Err(TapError::Config(format!(
                    "table '{}' has non-ASCII delimiter '{}'",
                    table.table_name, table.delimiter
                )));
            }

            table.compiled_pattern()?;
        }

        Ok(())
    }
}

fn default_max_sample_files() -> usize {
    DEFAULT_MAX_SAMPLE_FILES
}

fn default_max_sample_rows() -> usize {
    DEFAULT_MAX_SAMPLE_ROWS
}

fn default_max_concurrent_tables() -> usize {
    DEFAULT_MAX_CONCURRENT_TABLES
}

fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}

/// Accept either a JSON list of strings or a single comma-joined string.
///
/// The comma-joined form mirrors how upstream extraction configs commonly
/// ship `key_properties` and `date_overrides`.
fn comma_separated<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Joined(joined) => Ok(joined
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect()),
        Raw::List(list) => Ok(list),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pattern: &str) -> TableSpec {
        TableSpec {
            table_name: "sales".to_string(),
            search_prefix: "exports/".to_string(),
            search_pattern: pattern.to_string(),
            key_properties: vec![],
            date_overrides: vec![],
            delimiter: ',',
        }
    }

    #[test]
    fn test_pattern_wildcards() {
        let re = spec("sales_*.csv").compiled_pattern().unwrap();
        assert!(re.is_match("sales_2023.csv"));
        assert!(re.is_match("sales_.csv"));
        assert!(!re.is_match("sales_2023.csv.bak"));
        assert!(!re.is_match("other_2023.csv"));
    }

    #[test]
    fn test_pattern_is_case_sensitive_and_anchored() {
        let re = spec("sales_????.csv").compiled_pattern().unwrap();
        assert!(re.is_match("sales_2023.csv"));
        assert!(!re.is_match("SALES_2023.csv"));
        assert!(!re.is_match("old_sales_2023.csv"));
    }

    #[test]
    fn test_pattern_escapes_regex_metachars() {
        let re = spec("report+v1.csv").compiled_pattern().unwrap();
        assert!(re.is_match("report+v1.csv"));
        assert!(!re.is_match("reportt+v1.csv"));
    }

    #[test]
    fn test_comma_separated_key_properties() {
        let raw = r#"{
            "table_name": "sales",
            "search_pattern": "*.csv",
            "key_properties": "id, region",
            "date_overrides": ""
        }"#;
        let spec: TableSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.key_properties, vec!["id", "region"]);
        assert!(spec.date_overrides.is_empty());
        assert_eq!(spec.delimiter, ',');
    }

    #[test]
    fn test_list_form_still_accepted() {
        let raw = r#"{
            "table_name": "sales",
            "search_pattern": "*.csv",
            "key_properties": ["id"]
        }"#;
        let spec: TableSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.key_properties, vec!["id"]);
    }

    #[test]
    fn test_validate_rejects_duplicate_tables() {
        let config = TapConfig {
            bucket: "bucket".to_string(),
            start_date: None,
            tables: vec![spec("*.csv"), spec("*.csv")],
            max_sample_files: DEFAULT_MAX_SAMPLE_FILES,
            max_sample_rows: DEFAULT_MAX_SAMPLE_ROWS,
            max_concurrent_tables: DEFAULT_MAX_CONCURRENT_TABLES,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_tables() {
        let config = TapConfig {
            bucket: "bucket".to_string(),
            start_date: None,
            tables: vec![],
            max_sample_files: DEFAULT_MAX_SAMPLE_FILES,
            max_sample_rows: DEFAULT_MAX_SAMPLE_ROWS,
            max_concurrent_tables: DEFAULT_MAX_CONCURRENT_TABLES,
        };
        assert!(config.validate().is_err());
    }
}
