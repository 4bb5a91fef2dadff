use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use invoicer_core::{DomainError, DomainResult};

/// Blob storage for business logos, keyed by relative path
/// (`uploads/logos/business-{id}-{ts}.{ext}`).
#[async_trait]
pub trait LogoStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> DomainResult<()>;

    /// Removing a path that does not exist is not an error.
    async fn delete(&self, path: &str) -> DomainResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryLogoStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryLogoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().map(|f| f.contains_key(path)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogoStore for InMemoryLogoStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> DomainResult<()> {
        self.files
            .lock()
            .map_err(|_| DomainError::external("logo store unavailable"))?
            .insert(path.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> DomainResult<()> {
        self.files
            .lock()
            .map_err(|_| DomainError::external("logo store unavailable"))?
            .remove(path);
        Ok(())
    }
}

/// Logos written below a root directory.
#[derive(Debug, Clone)]
pub struct FsLogoStore {
    root: PathBuf,
}

impl FsLogoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> DomainResult<PathBuf> {
        if path.split(['/', '\\']).any(|part| part == "..") || path.starts_with('/') {
            return Err(DomainError::validation("logo", "Invalid logo path"));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl LogoStore for FsLogoStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> DomainResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::external(format!("could not create logo directory: {e}")))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| DomainError::external(format!("could not store logo: {e}")))
    }

    async fn delete(&self, path: &str) -> DomainResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::external(format!("could not delete logo: {e}"))),
        }
    }
}
