//! In-memory blob store for tests and single-process dev deployments.

use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::Mutex;

use super::BlobStore;

/// In-memory blob storage guarded by a single coarse lock.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Value>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let blobs = self.blobs.lock().await;
        Ok(blobs.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut blobs = self.blobs.lock().await;
        blobs.insert(key.to_string(), value);
        Ok(())
    }
}
