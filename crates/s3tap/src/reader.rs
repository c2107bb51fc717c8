//! Streaming CSV row source
//!
//! Reads one object's CSV content as a lazy sequence of rows. The first
//! record is the header; rows shorter than the header are padded with empty
//! strings, rows longer than the header are skipped with a warning. Nothing
//! is buffered beyond the current record, so memory stays bounded
//! regardless of object size.

use csv_async::{AsyncReaderBuilder, StringRecord};
use s3tap_common::{Result, TapError};
use std::collections::HashSet;
use tokio::io::AsyncRead;
use tracing::warn;

use crate::config::TableSpec;

/// Lazy row reader over one object
pub struct CsvRowSource<R> {
    reader: csv_async::AsyncReader<R>,
    headers: Vec<String>,
    key: String,
    skipped_rows: u64,
}

impl<R: AsyncRead + Unpin + Send> CsvRowSource<R> {
    /// Open a row source, reading and validating the header record.
    ///
    /// Duplicate header names are a configuration-shape problem and fail
    /// the table outright.
    pub async fn open(reader: R, spec: &TableSpec, key: &str) -> Result<Self> {
        let mut reader = AsyncReaderBuilder::new()
            .delimiter(spec.delimiter as u8)
            .flexible(true)
            .create_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .await
            .map_err(|e| TapError::Csv(format!("failed to read header of '{}': {}", key, e)))?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();

        let mut seen = HashSet::new();
        for name in &headers {
            if !seen.insert(name.as_str()) {
                return Err(TapError::Schema {
                    table: spec.table_name.clone(),
                    message: format!("duplicate column '{}' in header of '{}'", name, key),
                });
            }
        }

        Ok(Self {
            reader,
            headers,
            key: key.to_string(),
            skipped_rows: 0,
        })
    }

    /// Column names from the header, in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows skipped so far because they carried more fields than the header
    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows
    }

    /// Next row's raw values, padded to header width.
    ///
    /// Returns `Ok(None)` at end of object. Over-long rows are counted,
    /// warned about with key and line number, and skipped; the rest of the
    /// object keeps streaming.
    pub async fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let mut record = StringRecord::new();
        loop {
            let more = self
                .reader
                .read_record(&mut record)
                .await
                .map_err(|e| TapError::Csv(format!("failed to read '{}': {}", self.key, e)))?;
            if !more {
                return Ok(None);
            }

            if record.len() > self.headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                let err = TapError::MalformedRow {
                    key: self.key.clone(),
                    line,
                    expected: self.headers.len(),
                    actual: record.len(),
                };
                warn!(key = %self.key, line, "{}, skipping row", err);
                self.skipped_rows += 1;
                continue;
            }

            let mut values: Vec<String> = record.iter().map(|v| v.to_string()).collect();
            values.resize(self.headers.len(), String::new());
            return Ok(Some(values));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(delimiter: char) -> TableSpec {
        TableSpec {
            table_name: "sales".to_string(),
            search_prefix: String::new(),
            search_pattern: "*.csv".to_string(),
            key_properties: vec![],
            date_overrides: vec![],
            delimiter,
        }
    }

    async fn read_all(data: &'static str, delimiter: char) -> (Vec<String>, Vec<Vec<String>>, u64) {
        let mut source = CsvRowSource::open(data.as_bytes(), &spec(delimiter), "test.csv")
            .await
            .unwrap();
        let mut rows = Vec::new();
        while let Some(row) = source.next_row().await.unwrap() {
            rows.push(row);
        }
        (source.headers().to_vec(), rows, source.skipped_rows())
    }

    #[tokio::test]
    async fn test_header_order_preserved() {
        let (headers, rows, _) = read_all("id,amount,date\n1,10.5,2023-01-01\n", ',').await;
        assert_eq!(headers, vec!["id", "amount", "date"]);
        assert_eq!(rows, vec![vec!["1", "10.5", "2023-01-01"]]);
    }

    #[tokio::test]
    async fn test_short_rows_padded_with_empty_strings() {
        let (_, rows, skipped) = read_all("a,b,c\n1,2\n", ',').await;
        assert_eq!(rows, vec![vec!["1", "2", ""]]);
        assert_eq!(skipped, 0);
    }

    #[tokio::test]
    async fn test_long_rows_skipped_without_aborting() {
        let (_, rows, skipped) = read_all("a,b\n1,2,3\n4,5\n", ',').await;
        assert_eq!(rows, vec![vec!["4", "5"]]);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn test_quoted_fields_keep_embedded_delimiters() {
        let (_, rows, _) = read_all("name,notes\nwidget,\"a,b\nc\"\n", ',').await;
        assert_eq!(rows, vec![vec!["widget", "a,b\nc"]]);
    }

    #[tokio::test]
    async fn test_custom_delimiter() {
        let (headers, rows, _) = read_all("a|b\n1|2\n", '|').await;
        assert_eq!(headers, vec!["a", "b"]);
        assert_eq!(rows, vec![vec!["1", "2"]]);
    }

    #[tokio::test]
    async fn test_duplicate_headers_are_schema_error() {
        let result = CsvRowSource::open("id,id\n1,2\n".as_bytes(), &spec(','), "test.csv").await;
        assert!(matches!(result, Err(TapError::Schema { .. })));
    }

    #[tokio::test]
    async fn test_empty_object_yields_no_rows() {
        let (headers, rows, skipped) = read_all("", ',').await;
        assert!(headers.is_empty());
        assert!(rows.is_empty());
        assert_eq!(skipped, 0);
    }
}
