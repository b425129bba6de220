use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;

use super::{is_safe_segment, BlobStore};

/// JSON file-backed blob store.
///
/// Each blob key maps to one file under the data directory:
/// `users/alice/costs/weekly` becomes
/// `<data_dir>/users/alice/costs/weekly.json`.
pub struct JsonFileBlobStore {
    base_path: PathBuf,
}

impl JsonFileBlobStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.base_path.clone();
        let mut segments = key.split('/').peekable();
        while let Some(segment) = segments.next() {
            if !is_safe_segment(segment) {
                anyhow::bail!("Unsafe blob key segment in {key:?}");
            }
            if segments.peek().is_none() {
                // Appended rather than set_extension, which would clobber
                // anything after a dot in the final segment.
                path.push(format!("{segment}.json"));
            } else {
                path.push(segment);
            }
        }
        Ok(path)
    }

    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create directory")?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for JsonFileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.blob_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON from {:?}", path))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read blob file"),
        }
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let path = self.blob_path(key)?;
        Self::ensure_dir(&path).await?;
        let content = serde_json::to_string_pretty(&value).context("Failed to serialize JSON")?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write blob file {:?}", path))?;
        Ok(())
    }
}
