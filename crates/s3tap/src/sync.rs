//! Incremental sync engine
//!
//! Replays every object past a table's bookmark, in `(last_modified, key)`
//! order, coercing rows to the discovered schema and emitting them through
//! a [`RecordSink`]. The bookmark advances only after an object's last row
//! has been emitted, so a crash mid-object re-processes at most that one
//! object on restart and never leaves a gap.

use futures::stream::{self, StreamExt};
use s3tap_common::{Result, TapError};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{TableSpec, TapConfig};
use crate::discover::Catalog;
use crate::listing::list_objects;
use crate::reader::CsvRowSource;
use crate::state::{Bookmark, StateStore};
use crate::storage::ObjectSource;
use crate::typing::{coerce, InferredSchema};

/// Coercion warnings per object before the log goes quiet
const MAX_COERCION_WARNINGS_PER_OBJECT: u64 = 5;

/// Where coerced records go.
///
/// Message framing (line-delimited JSON, envelopes) lives behind this
/// trait; the engine only knows about schemas, records, and state
/// snapshots. All methods take `&self` so one sink can serve concurrently
/// syncing tables.
pub trait RecordSink: Send + Sync {
    /// Announce a stream's schema before its records.
    fn schema(&self, stream: &str, schema: &Value, key_properties: &[String]) -> Result<()> {
        let _ = (stream, schema, key_properties);
        Ok(())
    }

    /// Emit one coerced record.
    fn record(&self, stream: &str, values: &Map<String, Value>) -> Result<()>;

    /// Emit a checkpoint snapshot after an object completes.
    fn state(&self, state: &Value) -> Result<()> {
        let _ = state;
        Ok(())
    }
}

/// Outcome counters for one table's sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records emitted
    pub records: u64,
    /// Objects fully processed
    pub objects: u64,
    /// Rows dropped for having more fields than the header
    pub skipped_rows: u64,
    /// Cells emitted as raw strings because they missed the inferred type
    pub coercion_fallbacks: u64,
}

/// Sync one table: list past the bookmark, stream, coerce, emit, advance.
///
/// Objects are processed strictly sequentially to keep the bookmark
/// monotone.
pub async fn sync_table<S, St, K>(
    source: &S,
    spec: &TableSpec,
    schema: &InferredSchema,
    store: &St,
    sink: &K,
    config: &TapConfig,
) -> Result<SyncReport>
where
    S: ObjectSource,
    St: StateStore + ?Sized,
    K: RecordSink + ?Sized,
{
    sink.schema(
        &spec.table_name,
        &schema.to_json_schema(),
        &spec.key_properties,
    )?;

    let bookmark = store.get(&spec.table_name)?;
    let objects = list_objects(source, spec, bookmark.as_ref(), config.start_date).await?;

    info!(
        table = %spec.table_name,
        objects = objects.len(),
        resuming = bookmark.is_some(),
        "starting sync"
    );

    let mut report = SyncReport::default();

    for object in objects {
        debug!(table = %spec.table_name, key = %object.key, "processing object");

        let reader = source.fetch(&object.key).await?;
        let mut rows = CsvRowSource::open(reader, spec, &object.key).await?;

        // Column positions for this object's header, resolved once
        let positions: Vec<Option<usize>> = schema
            .columns()
            .iter()
            .map(|column| rows.headers().iter().position(|h| *h == column.name))
            .collect();
        let extra_columns: Vec<(usize, String)> = rows
            .headers()
            .iter()
            .enumerate()
            .filter(|(_, header)| schema.column(header).is_none())
            .map(|(index, header)| (index, header.clone()))
            .collect();

        let mut object_warnings = 0u64;

        while let Some(values) = rows.next_row().await? {
            let mut record = Map::new();

            for (column, position) in schema.columns().iter().zip(&positions) {
                let raw = position.map(|i| values[i].as_str()).unwrap_or("");
                let (value, fell_back) = coerce(raw, column.datatype);
                if fell_back {
                    report.coercion_fallbacks += 1;
                    object_warnings += 1;
                    if object_warnings <= MAX_COERCION_WARNINGS_PER_OBJECT {
                        warn!(
                            table = %spec.table_name,
                            key = %object.key,
                            column = %column.name,
                            value = %raw,
                            "value does not fit inferred type, passing raw string through"
                        );
                    }
                }
                record.insert(column.name.clone(), value);
            }

            // Columns this object has that discovery never saw ride along
            // as raw strings, after the schema columns.
            for (index, header) in &extra_columns {
                let raw = values[*index].as_str();
                let value = if raw.is_empty() {
                    Value::Null
                } else {
                    Value::String(raw.to_string())
                };
                record.insert(header.clone(), value);
            }

            sink.record(&spec.table_name, &record)?;
            report.records += 1;
        }

        report.skipped_rows += rows.skipped_rows();
        report.objects += 1;

        // Only a fully-drained object moves the high-water-mark
        store.set(&spec.table_name, Bookmark::from_object(&object))?;
        store.flush()?;
        sink.state(&store.snapshot()?)?;
    }

    info!(
        table = %spec.table_name,
        records = report.records,
        objects = report.objects,
        skipped_rows = report.skipped_rows,
        coercion_fallbacks = report.coercion_fallbacks,
        "completed sync"
    );

    Ok(report)
}

/// Sync every selected stream in the catalog.
///
/// Tables run with bounded parallelism; each owns its bookmark and listing
/// cursor, so nothing mutable is shared across them. The first fatal error
/// aborts the run.
pub async fn sync_all<S, St, K>(
    source: &S,
    config: &TapConfig,
    catalog: &Catalog,
    store: &St,
    sink: &K,
) -> Result<Vec<(String, SyncReport)>>
where
    S: ObjectSource,
    St: StateStore + ?Sized,
    K: RecordSink + ?Sized,
{
    let mut tasks = Vec::new();

    for entry in &catalog.streams {
        if !entry.metadata.selected {
            info!(table = %entry.tap_stream_id, "skipping - not selected");
            continue;
        }

        let spec = config.table(&entry.tap_stream_id).ok_or_else(|| {
            TapError::Config(format!(
                "catalog stream '{}' has no table spec",
                entry.tap_stream_id
            ))
        })?;
        let schema = entry.inferred_schema()?;

        tasks.push(async move {
            let report = sync_table(source, spec, &schema, store, sink, config).await?;
            Ok::<(String, SyncReport), TapError>((spec.table_name.clone(), report))
        });
    }

    let mut results = Vec::with_capacity(tasks.len());
    let mut running = stream::iter(tasks).buffer_unordered(config.max_concurrent_tables);
    while let Some(result) = running.next().await {
        results.push(result?);
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}
