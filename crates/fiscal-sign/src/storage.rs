//! # Object Store
//!
//! Boundary to wherever certificate containers are read from and signed
//! documents are written to.
//!
//! ```text
//! CertificateResolver ──get_object(key)──────────────► ObjectStore
//! InvoiceIssuer ──────put_object(key, bytes, type)──► ObjectStore ──► url
//! ```
//!
//! Two implementations ship with the crate: [`InMemoryStore`] for tests and
//! single-process setups, and [`LocalDirectoryStore`] for a directory on disk.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Content type of signed documents.
pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Content type of PKCS#12 containers.
pub const PKCS12_CONTENT_TYPE: &str = "application/x-pkcs12";

/// Key/value blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the object stored under `key`.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Writes `bytes` under `key`, replacing any previous object, and returns
    /// the URL it can be fetched from.
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> StorageResult<String>;
}

fn check_key(key: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.trim().is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(invalid("key must be relative"));
    }
    if Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid("key must not contain '.', '..' or a prefix"));
    }
    Ok(())
}

// =============================================================================
// In-Memory Store
// =============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Objects held in a map behind a Tokio `RwLock`.
///
/// URLs have the form `memory://<key>`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for `key`.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        check_key(key)?;
        debug!(key = %key, size = bytes.len(), content_type = %content_type, "Storing object in memory");

        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{}", key))
    }
}

// =============================================================================
// Local Directory Store
// =============================================================================

/// Objects stored as files under a root directory.
///
/// URLs are `file://` URLs of the written files.
#[derive(Debug, Clone)]
pub struct LocalDirectoryStore {
    root: PathBuf,
}

impl LocalDirectoryStore {
    /// Relative roots are resolved against the current directory.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(LocalDirectoryStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalDirectoryStore {
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(?path, size = bytes.len(), content_type = %content_type, "Writing object to disk");
        tokio::fs::write(&path, bytes).await?;

        url::Url::from_file_path(&path)
            .map(String::from)
            .map_err(|_| StorageError::InvalidKey {
                key: key.to_string(),
                reason: "path cannot be expressed as a file URL".to_string(),
            })
    }
}
