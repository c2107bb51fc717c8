//! Object store access
//!
//! The tap only ever lists and reads objects; there are no writes. The
//! [`ObjectSource`] trait is the seam between the extraction logic and the
//! concrete store: [`Storage`] backs it with S3, and
//! [`memory::MemoryObjectSource`] backs it with an in-process map for tests
//! and local runs.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use s3tap_common::{Result, TapError};
use std::future::Future;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

pub mod config;
pub mod memory;

/// Streaming handle to one object's bytes
pub type ObjectReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// One object in the store
///
/// Never mutated after listing; `(last_modified, key)` is the ordering key
/// for incremental progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: i64,
}

impl StoredObject {
    /// Ordering key: last-modified ascending, key as tie-break.
    pub fn ordering_key(&self) -> (DateTime<Utc>, &str) {
        (self.last_modified, self.key.as_str())
    }
}

/// Read-only object store operations used by discovery and sync
pub trait ObjectSource: Send + Sync {
    /// List every object under a key prefix.
    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<StoredObject>>> + Send;

    /// Open a streaming reader over one object's bytes.
    fn fetch(&self, key: &str) -> impl Future<Output = Result<ObjectReader>> + Send;
}

/// S3-backed object source
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    /// Build an S3 client for the given bucket.
    ///
    /// Credentials come from the ambient AWS environment unless static
    /// keys are set in the storage config; the client is immutable once
    /// built and shared read-only across tables.
    pub async fn new(config: config::StorageConfig, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        debug!("Initializing storage with config: {:?}", config);

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "s3tap-storage",
            ));
        }

        let client = Client::from_conf(builder.build());

        info!("Storage client initialized for bucket: {}", bucket);

        Ok(Self { client, bucket })
    }

    /// Bucket this client reads from
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectSource for Storage {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        debug!("Listing objects in s3://{}/{}", self.bucket, prefix);

        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                TapError::Storage(format!(
                    "failed to list s3://{}/{}: {}",
                    self.bucket, prefix, e
                ))
            })?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let Some(modified) = object.last_modified() else {
                    continue;
                };
                let Some(last_modified) =
                    DateTime::from_timestamp(modified.secs(), modified.subsec_nanos())
                else {
                    return Err(TapError::Storage(format!(
                        "object '{}' has unrepresentable last-modified timestamp",
                        key
                    )));
                };

                objects.push(StoredObject {
                    key: key.to_string(),
                    last_modified,
                    size: object.size().unwrap_or(0),
                });
            }
        }

        debug!(
            "Listed {} objects under s3://{}/{}",
            objects.len(),
            self.bucket,
            prefix
        );

        Ok(objects)
    }

    async fn fetch(&self, key: &str) -> Result<ObjectReader> {
        debug!("Getting stream from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                TapError::Storage(format!(
                    "failed to get s3://{}/{}: {}",
                    self.bucket, key, e
                ))
            })?;

        // Adapt the SDK body into a tokio reader without buffering the object
        let chunks = futures::stream::unfold(response.body, |mut body| async move {
            body.next()
                .await
                .map(|chunk| (chunk.map_err(std::io::Error::other), body))
        });

        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }
}
