//! Blob storage abstraction for cdx-export.
//!
//! Provides a trait-based interface over `s3://bucket/key` object storage so
//! the allow-list upload and export inspection can run against S3 or an
//! in-memory store interchangeably.

mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

use crate::error::{CdxError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Location {
    /// Bucket name.
    pub bucket: String,

    /// Object key or key prefix (no leading slash, may be empty).
    pub key: String,
}

impl S3Location {
    /// Parses an `s3://bucket/key` URI.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| CdxError::config(format!("Invalid storage location '{uri}': {e}")))?;

        if url.scheme() != "s3" {
            return Err(CdxError::config(format!(
                "Invalid scheme '{}' in '{uri}'. Expected 's3'",
                url.scheme()
            )));
        }

        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CdxError::config(format!("Missing bucket in '{uri}'")))?
            .to_string();

        // Keys are taken verbatim; the URL path would percent-encode them.
        let key = uri
            .strip_prefix("s3://")
            .and_then(|rest| rest.split_once('/'))
            .map(|(_, key)| key.to_string())
            .unwrap_or_default();

        Ok(Self { bucket, key })
    }

    /// Returns this location with a trailing slash, for use as a prefix.
    pub fn as_prefix(&self) -> Self {
        let key = if self.key.is_empty() || self.key.ends_with('/') {
            self.key.clone()
        } else {
            format!("{}/", self.key)
        };
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }

    /// Joins a relative name onto this location, treating it as a prefix.
    pub fn join(&self, name: &str) -> Self {
        let prefix = self.as_prefix();
        Self {
            bucket: prefix.bucket,
            key: format!("{}{}", prefix.key, name.trim_start_matches('/')),
        }
    }

    /// Returns the last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    /// Object location.
    pub location: S3Location,

    /// Object size in bytes.
    pub size: u64,

    /// Last modification time, if the store reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Trait defining the interface for blob stores.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes an object, replacing any existing object at the location.
    async fn put_object(&self, location: &S3Location, body: Vec<u8>) -> Result<()>;

    /// Reads a whole object.
    async fn get_object(&self, location: &S3Location) -> Result<Vec<u8>>;

    /// Lists every object under a prefix, following pagination to the end.
    async fn list_objects(&self, prefix: &S3Location) -> Result<Vec<ObjectInfo>>;
}

/// Formats a byte count for humans (`1.50 KB`, `3.00 GB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}
