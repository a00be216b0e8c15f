//! In-memory blob store for tests and mock runs.

use super::{BlobStore, ObjectInfo, S3Location};
use crate::error::{CdxError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A blob store backed by an ordered map, keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<(String, String), (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), (Vec<u8>, DateTime<Utc>)>> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, location: &S3Location, body: Vec<u8>) -> Result<()> {
        self.lock().insert(
            (location.bucket.clone(), location.key.clone()),
            (body, Utc::now()),
        );
        Ok(())
    }

    async fn get_object(&self, location: &S3Location) -> Result<Vec<u8>> {
        self.lock()
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|(body, _)| body.clone())
            .ok_or_else(|| CdxError::storage(format!("No such object: {location}")))
    }

    async fn list_objects(&self, prefix: &S3Location) -> Result<Vec<ObjectInfo>> {
        let objects = self.lock();
        Ok(objects
            .iter()
            .filter(|((bucket, key), _)| *bucket == prefix.bucket && key.starts_with(&prefix.key))
            .map(|((bucket, key), (body, modified))| ObjectInfo {
                location: S3Location {
                    bucket: bucket.clone(),
                    key: key.clone(),
                },
                size: body.len() as u64,
                last_modified: Some(*modified),
            })
            .collect())
    }
}
