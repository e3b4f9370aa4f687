//! Storage trait definitions for Scriptgate
//!
//! - `ContentDigest`: SHA-256 identity for persisted documents
//! - `ReadOutcome`: safe-read result that keeps "absent" and "corrupt" distinct
//! - `ProjectStore`: per-root document persistence (script, quality, versions, audit)
//!
//! All traits are async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::OwnedMutexGuard;

use crate::error::StorageError;
use crate::schema::{AuditEntry, ProjectRoot, VersionsFile};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of the canonical JSON encoding of `value`.
    pub fn from_json(value: &serde_json::Value) -> StorageResult<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ReadOutcome
// ---------------------------------------------------------------------------

/// Result of a safe document read.
///
/// Callers usually treat `Absent` and `Corrupt` the same way (fall back to
/// defaults or recompute) but the distinction stays observable.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    Present(T),
    Absent,
    Corrupt(String),
}

impl<T> ReadOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent | Self::Corrupt(_) => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}

// ---------------------------------------------------------------------------
// Per-root locks
// ---------------------------------------------------------------------------

/// Guard held for the duration of a read-modify-write on one root.
pub type RootGuard = OwnedMutexGuard<()>;

/// In-process async mutex keyed by project root.
#[derive(Debug, Default)]
pub struct RootLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RootLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, root: &ProjectRoot) -> RootGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(root.key())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// ProjectStore
// ---------------------------------------------------------------------------

/// Document persistence for project roots.
///
/// Guarantees:
/// - Writes replace the whole document.
/// - Audit entries are append-only and returned in append order.
/// - `lock_root` serializes read-modify-write cycles on one root within the process.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Acquire the per-root lock. Hold the guard across read-modify-write.
    async fn lock_root(&self, root: &ProjectRoot) -> RootGuard;

    async fn read_script(&self, root: &ProjectRoot)
        -> StorageResult<ReadOutcome<serde_json::Value>>;

    async fn write_script(&self, root: &ProjectRoot, script: &serde_json::Value)
        -> StorageResult<()>;

    async fn read_quality(
        &self,
        root: &ProjectRoot,
    ) -> StorageResult<ReadOutcome<serde_json::Value>>;

    async fn write_quality(
        &self,
        root: &ProjectRoot,
        quality: &serde_json::Value,
    ) -> StorageResult<()>;

    async fn read_versions(&self, root: &ProjectRoot) -> StorageResult<ReadOutcome<VersionsFile>>;

    async fn write_versions(&self, file: &VersionsFile) -> StorageResult<()>;

    async fn append_audit(&self, root: &ProjectRoot, entry: &AuditEntry) -> StorageResult<()>;

    async fn read_audit(&self, root: &ProjectRoot) -> StorageResult<Vec<AuditEntry>>;

    /// Every root that has a version-metadata document.
    async fn list_roots(&self) -> StorageResult<Vec<ProjectRoot>>;

    /// Read `versions.json`, falling back to an empty document when absent or corrupt.
    async fn load_versions(&self, root: &ProjectRoot) -> StorageResult<VersionsFile> {
        Ok(self
            .read_versions(root)
            .await?
            .into_option()
            .unwrap_or_else(|| VersionsFile::new(root.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_validated() {
        let a = ContentDigest::from_bytes(b"script");
        let b = ContentDigest::from_bytes(b"script");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(ContentDigest::try_from("xyz".to_string()).is_err());
        assert!(ContentDigest::try_from(a.as_str().to_uppercase()).is_ok());
    }

    #[test]
    fn read_outcome_collapses_absent_and_corrupt() {
        let absent: ReadOutcome<u8> = ReadOutcome::Absent;
        let corrupt: ReadOutcome<u8> = ReadOutcome::Corrupt("eof".into());
        assert!(absent.clone().into_option().is_none());
        assert!(corrupt.is_corrupt());
        assert!(corrupt.into_option().is_none());
        assert_eq!(ReadOutcome::Present(3u8).into_option(), Some(3));
    }

    #[tokio::test]
    async fn root_lock_serializes_same_root() {
        let locks = Arc::new(RootLocks::new());
        let root = ProjectRoot::new("https://a.io", "o").unwrap();
        let guard = locks.lock(&root).await;

        let locks2 = locks.clone();
        let root2 = root.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock(&root2).await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }
}
