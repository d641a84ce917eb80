//! Evidence/media port.
//!
//! The engine stores only opaque references. Access control happens in the
//! arbiter before a store is asked for bytes.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Evidence retrieval errors
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("Evidence not found: {0}")]
    NotFound(String),

    #[error("Invalid evidence reference: {0}")]
    InvalidReference(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Media storage for result proofs and report evidence
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, EvidenceError>;
}

/// Evidence stored as files under one root directory
#[derive(Debug, Clone)]
pub struct FsEvidenceStore {
    root: PathBuf,
}

impl FsEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a reference to a path inside the root; references that
    /// would escape it are rejected
    fn resolve(&self, reference: &str) -> Result<PathBuf, EvidenceError> {
        let relative = Path::new(reference);
        let confined = !reference.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(EvidenceError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl EvidenceStore for FsEvidenceStore {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, EvidenceError> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EvidenceError::NotFound(reference.to_string()))
            }
            Err(e) => Err(EvidenceError::Storage(e)),
        }
    }
}
