use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use super::types::{GatewayError, ObjectKey};

/// Backing blob store the gateway delegates to. Deployments plug in an
/// S3-compatible vendor here; tests and demos use the in-memory store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Produce a time-limited PUT URL for one object.
    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: &str,
        content_length: u64,
        expiry: Duration,
    ) -> Result<String, GatewayError>;

    /// Remove a stored object.
    async fn delete(&self, key: &ObjectKey) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
struct PendingObject {
    content_type: String,
    content_length: u64,
}

/// In-memory stand-in for an S3-compatible bucket. Presigning registers the
/// object so later deletes have something to act on.
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, PendingObject>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.lock().contains_key(key.as_str())
    }

    /// Content type and length recorded at presign time, if the key exists.
    pub fn object_meta(&self, key: &ObjectKey) -> Option<(String, u64)> {
        self.objects
            .lock()
            .get(key.as_str())
            .map(|obj| (obj.content_type.clone(), obj.content_length))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: &str,
        content_length: u64,
        expiry: Duration,
    ) -> Result<String, GatewayError> {
        let expires = Utc::now() + chrono::Duration::from_std(expiry)
            .map_err(|err| GatewayError::Internal(err.to_string()))?;

        self.objects.lock().insert(
            key.as_str().to_string(),
            PendingObject {
                content_type: content_type.to_string(),
                content_length,
            },
        );

        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            key,
            expires.timestamp()
        ))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), GatewayError> {
        // Deleting an absent key succeeds, matching S3 semantics.
        self.objects.lock().remove(key.as_str());
        Ok(())
    }
}
