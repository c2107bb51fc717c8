//! Schema discovery
//!
//! Composes the object lister, the CSV row source, and the type inferrer
//! per table to build the catalog. Discovery is fail-fast: a table whose
//! pattern matches nothing aborts the whole invocation rather than
//! producing a partial catalog.

use s3tap_common::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::config::{TableSpec, TapConfig};
use crate::listing::list_objects;
use crate::reader::CsvRowSource;
use crate::storage::{ObjectSource, StoredObject};
use crate::typing::{infer_schema, InferredSchema, Sample};

/// Selection and key metadata for one stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub table_name: String,
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Only selected streams are synced
    #[serde(default)]
    pub selected: bool,
}

/// One discovered stream: identifier, JSON schema, metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub tap_stream_id: String,
    pub schema: serde_json::Value,
    pub metadata: StreamMetadata,
}

impl CatalogEntry {
    /// Rebuild the typed schema this entry was rendered from.
    pub fn inferred_schema(&self) -> Result<InferredSchema> {
        InferredSchema::from_json_schema(&self.schema, &self.metadata.key_properties)
    }
}

/// The discovered streams, in table input order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn stream(&self, tap_stream_id: &str) -> Option<&CatalogEntry> {
        self.streams
            .iter()
            .find(|entry| entry.tap_stream_id == tap_stream_id)
    }
}

/// Discover every configured table, in input order.
///
/// Each failure is wrapped with the table it belongs to; the first one
/// aborts discovery for the whole invocation.
pub async fn discover<S: ObjectSource>(source: &S, config: &TapConfig) -> Result<Catalog> {
    let mut streams = Vec::with_capacity(config.tables.len());

    for spec in &config.tables {
        info!(table = %spec.table_name, "discovering schema");
        let entry = discover_table(source, config, spec).await.map_err(|e| {
            TapError::Discovery {
                table: spec.table_name.clone(),
                source: Box::new(e),
            }
        })?;
        streams.push(entry);
    }

    Ok(Catalog { streams })
}

async fn discover_table<S: ObjectSource>(
    source: &S,
    config: &TapConfig,
    spec: &TableSpec,
) -> Result<CatalogEntry> {
    let objects = list_objects(source, spec, None, config.start_date).await?;
    if objects.is_empty() {
        return Err(TapError::Listing {
            table: spec.table_name.clone(),
            prefix: spec.search_prefix.clone(),
        });
    }

    let samples = collect_samples(source, spec, &objects, config).await?;
    let schema = infer_schema(spec, &samples);

    info!(
        table = %spec.table_name,
        columns = schema.columns().len(),
        sampled_objects = samples.len(),
        "inferred schema"
    );

    Ok(CatalogEntry {
        tap_stream_id: spec.table_name.clone(),
        schema: schema.to_json_schema(),
        metadata: StreamMetadata {
            table_name: spec.table_name.clone(),
            key_properties: spec.key_properties.clone(),
            selected: false,
        },
    })
}

/// Pull a bounded, deterministic sample: the first `max_sample_files`
/// objects in listing order, the first `max_sample_rows` rows of each.
///
/// The truncation is part of the discovery contract; widening it to full
/// scans would change both catalogs and performance.
async fn collect_samples<S: ObjectSource>(
    source: &S,
    spec: &TableSpec,
    objects: &[StoredObject],
    config: &TapConfig,
) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();

    for object in objects.iter().take(config.max_sample_files) {
        let reader = source.fetch(&object.key).await?;
        let mut rows = CsvRowSource::open(reader, spec, &object.key).await?;

        let mut sampled = Vec::new();
        while sampled.len() < config.max_sample_rows {
            match rows.next_row().await? {
                Some(row) => sampled.push(row),
                None => break,
            }
        }

        samples.push(Sample {
            columns: rows.headers().to_vec(),
            rows: sampled,
        });
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_MAX_CONCURRENT_TABLES, DEFAULT_MAX_SAMPLE_FILES, DEFAULT_MAX_SAMPLE_ROWS,
    };
    use crate::storage::memory::MemoryObjectSource;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn config(tables: Vec<TableSpec>) -> TapConfig {
        TapConfig {
            bucket: "bucket".to_string(),
            start_date: None,
            tables,
            max_sample_files: DEFAULT_MAX_SAMPLE_FILES,
            max_sample_rows: DEFAULT_MAX_SAMPLE_ROWS,
            max_concurrent_tables: DEFAULT_MAX_CONCURRENT_TABLES,
        }
    }

    fn sales_spec() -> TableSpec {
        TableSpec {
            table_name: "sales".to_string(),
            search_prefix: "exports/".to_string(),
            search_pattern: "sales_*.csv".to_string(),
            key_properties: vec!["id".to_string()],
            date_overrides: vec![],
            delimiter: ',',
        }
    }

    #[tokio::test]
    async fn test_discover_infers_across_objects() {
        let mut source = MemoryObjectSource::new();
        source.insert(
            "exports/sales_2023.csv",
            ts(100),
            "id,amount,date\n1,10.5,2023-01-01\n",
        );
        source.insert(
            "exports/sales_2024.csv",
            ts(200),
            "id,amount,date\n2,20,2024-01-01\n",
        );

        let catalog = discover(&source, &config(vec![sales_spec()])).await.unwrap();
        assert_eq!(catalog.streams.len(), 1);

        let entry = catalog.stream("sales").unwrap();
        assert_eq!(entry.metadata.key_properties, vec!["id"]);
        assert_eq!(
            entry.schema["properties"]["id"]["type"],
            json!(["null", "integer"])
        );
        assert_eq!(
            entry.schema["properties"]["amount"]["type"],
            json!(["null", "number"])
        );
        assert_eq!(entry.schema["properties"]["date"]["format"], json!("date-time"));
    }

    #[tokio::test]
    async fn test_zero_matches_aborts_discovery() {
        let mut source = MemoryObjectSource::new();
        source.insert("exports/notes.txt", ts(100), "not a csv");

        let result = discover(&source, &config(vec![sales_spec()])).await;
        match result {
            Err(TapError::Discovery { table, source }) => {
                assert_eq!(table, "sales");
                assert!(matches!(*source, TapError::Listing { .. }));
            },
            other => panic!("expected discovery error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_no_partial_catalog_on_failure() {
        let mut source = MemoryObjectSource::new();
        source.insert(
            "exports/sales_2023.csv",
            ts(100),
            "id,amount\n1,2\n",
        );

        let mut empty = sales_spec();
        empty.table_name = "orders".to_string();
        empty.search_pattern = "orders_*.csv".to_string();

        // The second table matches nothing, so the whole invocation fails.
        let result = discover(&source, &config(vec![sales_spec(), empty])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sampling_caps_are_honored() {
        let mut source = MemoryObjectSource::new();
        // Newest object would widen "v" to string, but sampling stops at
        // the first object in listing order.
        source.insert("exports/sales_1.csv", ts(100), "v\n1\n2\n");
        source.insert("exports/sales_2.csv", ts(200), "v\noops\n");

        let mut cfg = config(vec![{
            let mut s = sales_spec();
            s.key_properties = vec![];
            s
        }]);
        cfg.max_sample_files = 1;

        let catalog = discover(&source, &cfg).await.unwrap();
        let entry = catalog.stream("sales").unwrap();
        assert_eq!(
            entry.schema["properties"]["v"]["type"],
            json!(["null", "integer"])
        );
    }

    #[tokio::test]
    async fn test_duplicate_header_fails_table_discovery() {
        let mut source = MemoryObjectSource::new();
        source.insert("exports/sales_1.csv", ts(100), "id,id\n1,2\n");

        let result = discover(&source, &config(vec![sales_spec()])).await;
        assert!(matches!(result, Err(TapError::Discovery { .. })));
    }
}
