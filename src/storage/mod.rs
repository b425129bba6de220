mod json_file;
mod memory;
pub mod stores;

pub use json_file::JsonFileBlobStore;
pub use memory::MemoryBlobStore;

use anyhow::Result;
use serde_json::Value;

/// Key/value blob storage for JSON documents.
///
/// Keys are hierarchical, slash-separated strings such as
/// `users/{username}/costs/weekly`. A missing key reads back as `None`;
/// malformed stored JSON is an error.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: Value) -> Result<()>;
}

/// Typed read over [`BlobStore::get`].
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => {
            let parsed = serde_json::from_value(value)
                .map_err(|err| anyhow::anyhow!("Malformed blob at {key}: {err}"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Typed write over [`BlobStore::put`].
pub async fn put_json<T: serde::Serialize>(
    store: &dyn BlobStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)
        .map_err(|err| anyhow::anyhow!("Failed to serialize blob for {key}: {err}"))?;
    store.put(key, value).await
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid key segment {value:?}: segments must be non-empty, must not be \".\" or \"..\", and may not contain '/', '\\' or NUL")]
pub struct KeySegmentError {
    value: String,
}

/// Returns true if the string is safe to use as a single key segment.
///
/// File-backed stores map segments onto path components, so anything that
/// could escape the data directory is rejected.
pub fn is_safe_segment(value: &str) -> bool {
    if value.is_empty() || value == "." || value == ".." {
        return false;
    }
    !value.chars().any(|c| c == '/' || c == '\\' || c == '\0')
}

/// Join validated segments into a blob key.
pub fn blob_key(segments: &[&str]) -> Result<String, KeySegmentError> {
    for segment in segments {
        if !is_safe_segment(segment) {
            return Err(KeySegmentError {
                value: segment.to_string(),
            });
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_key_joins_segments() {
        assert_eq!(
            blob_key(&["users", "alice", "costs", "weekly"]).unwrap(),
            "users/alice/costs/weekly"
        );
    }

    #[test]
    fn blob_key_allows_interior_dots() {
        assert_eq!(
            blob_key(&["users", "alice", "sync", "item.v2"]).unwrap(),
            "users/alice/sync/item.v2"
        );
        let err = blob_key(&["users", "."]).expect_err("bare dot segment");
        assert!(err.to_string().contains("must not be \".\" or \"..\""));
    }

    #[test]
    fn blob_key_rejects_traversal() {
        assert!(blob_key(&["users", "..", "costs"]).is_err());
        assert!(blob_key(&["users", "a/b"]).is_err());
        assert!(blob_key(&["users", ""]).is_err());
        assert!(blob_key(&["users", "a\\b"]).is_err());
    }
}
