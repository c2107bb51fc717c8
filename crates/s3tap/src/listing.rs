//! Object listing and incremental filtering
//!
//! Enumerates the objects a table's pattern matches and orders them by
//! `(last_modified, key)` ascending. With a bookmark, only objects strictly
//! past it survive; without one, an optional `start_date` floor applies.

use chrono::{DateTime, Utc};
use s3tap_common::Result;
use tracing::debug;

use crate::config::TableSpec;
use crate::state::Bookmark;
use crate::storage::{ObjectSource, StoredObject};

/// List the objects a sync or discovery pass should visit, in order.
///
/// Non-matching keys under the prefix are skipped silently. An empty result
/// is normal at sync time; discovery turns it into a fatal error.
pub async fn list_objects<S: ObjectSource>(
    source: &S,
    spec: &TableSpec,
    since: Option<&Bookmark>,
    start_date: Option<DateTime<Utc>>,
) -> Result<Vec<StoredObject>> {
    let pattern = spec.compiled_pattern()?;

    let mut objects: Vec<StoredObject> = source
        .list(&spec.search_prefix)
        .await?
        .into_iter()
        .filter(|object| {
            let Some(remainder) = object.key.strip_prefix(&spec.search_prefix) else {
                return false;
            };
            pattern.is_match(remainder)
        })
        .filter(|object| match since {
            Some(bookmark) => !bookmark.covers(object),
            None => start_date.is_none_or(|floor| object.last_modified >= floor),
        })
        .collect();

    objects.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));

    debug!(
        table = %spec.table_name,
        prefix = %spec.search_prefix,
        count = objects.len(),
        "listed matching objects"
    );

    Ok(objects)
}
