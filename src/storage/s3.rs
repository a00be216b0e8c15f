//! S3 blob store implementation.
//!
//! Provides the `S3BlobStore` struct that implements the `BlobStore` trait
//! using the AWS SDK.

use super::{BlobStore, ObjectInfo, S3Location};
use crate::error::{CdxError, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

/// S3-backed blob store.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    /// Creates a store from a loaded AWS SDK configuration.
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_object(&self, location: &S3Location, body: Vec<u8>) -> Result<()> {
        debug!("PUT {} ({} bytes)", location, body.len());
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                CdxError::storage(format!(
                    "Failed to write {location}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn get_object(&self, location: &S3Location) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                CdxError::storage(format!(
                    "Failed to read {location}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| CdxError::storage(format!("Failed to read body of {location}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn list_objects(&self, prefix: &S3Location) -> Result<Vec<ObjectInfo>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&prefix.bucket)
            .prefix(&prefix.key)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                CdxError::storage(format!(
                    "Failed to list {prefix}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectInfo {
                    location: S3Location {
                        bucket: prefix.bucket.clone(),
                        key: key.to_string(),
                    },
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }
        }

        debug!("Listed {} objects under {}", objects.len(), prefix);
        Ok(objects)
    }
}
