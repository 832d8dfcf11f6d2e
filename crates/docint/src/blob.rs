use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use procura_core::domain::FileRef;

/// File storage for receipts and rendered orders. The engine only ever
/// writes whole files and keeps the returned reference; reading documents
/// back is a concern of whatever serves them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<FileRef>;
}

/// Local-filesystem store. Keys may contain `/` separators; parent
/// directories are created as needed.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<FileRef> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating blob directory for `{key}`"))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing blob `{key}`"))?;
        Ok(FileRef(path.to_string_lossy().into_owned()))
    }
}

/// Test double that keeps blobs in a map.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.blobs.lock() {
            Ok(blobs) => blobs.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    pub fn len(&self) -> usize {
        match self.blobs.lock() {
            Ok(blobs) => blobs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<FileRef> {
        match self.blobs.lock() {
            Ok(mut blobs) => {
                blobs.insert(key.to_string(), bytes.to_vec());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key.to_string(), bytes.to_vec());
            }
        }
        Ok(FileRef(format!("mem://{key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobStore, FsBlobStore, InMemoryBlobStore};

    #[tokio::test]
    async fn fs_store_writes_nested_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());

        let file_ref =
            store.put("receipts/PR-1/receipt.txt", b"hello").await.expect("put");

        let stored = tokio::fs::read(&file_ref.0).await.expect("read back");
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = InMemoryBlobStore::new();
        let file_ref = store.put("orders/PR-1.txt", b"doc").await.expect("put");

        assert_eq!(file_ref.0, "mem://orders/PR-1.txt");
        assert_eq!(store.get("orders/PR-1.txt"), Some(b"doc".to_vec()));
    }
}
