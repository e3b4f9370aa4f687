//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryProjectStore`, which satisfies the `ProjectStore` contract
//! without touching the filesystem.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::schema::{AuditEntry, ProjectRoot, VersionsFile};
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct ProjectDocs {
    script: Option<serde_json::Value>,
    quality: Option<serde_json::Value>,
    versions: Option<VersionsFile>,
    audit: Vec<AuditEntry>,
}

/// In-memory project store backed by a `HashMap<root-key, docs>`.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: Mutex<HashMap<String, ProjectDocs>>,
    locks: RootLocks,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn lock_root(&self, root: &ProjectRoot) -> RootGuard {
        self.locks.lock(root).await
    }

    async fn read_script(
        &self,
        root: &ProjectRoot,
    ) -> StorageResult<ReadOutcome<serde_json::Value>> {
        let projects = self.projects.lock().unwrap();
        Ok(match projects.get(&root.key()).and_then(|p| p.script.clone()) {
            Some(v) => ReadOutcome::Present(v),
            None => ReadOutcome::Absent,
        })
    }

    async fn write_script(
        &self,
        root: &ProjectRoot,
        script: &serde_json::Value,
    ) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects.entry(root.key()).or_default().script = Some(script.clone());
        Ok(())
    }

    async fn read_quality(
        &self,
        root: &ProjectRoot,
    ) -> StorageResult<ReadOutcome<serde_json::Value>> {
        let projects = self.projects.lock().unwrap();
        Ok(match projects.get(&root.key()).and_then(|p| p.quality.clone()) {
            Some(v) => ReadOutcome::Present(v),
            None => ReadOutcome::Absent,
        })
    }

    async fn write_quality(
        &self,
        root: &ProjectRoot,
        quality: &serde_json::Value,
    ) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects.entry(root.key()).or_default().quality = Some(quality.clone());
        Ok(())
    }

    async fn read_versions(&self, root: &ProjectRoot) -> StorageResult<ReadOutcome<VersionsFile>> {
        let projects = self.projects.lock().unwrap();
        Ok(
            match projects.get(&root.key()).and_then(|p| p.versions.clone()) {
                Some(v) => ReadOutcome::Present(v),
                None => ReadOutcome::Absent,
            },
        )
    }

    async fn write_versions(&self, file: &VersionsFile) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects.entry(file.root.key()).or_default().versions = Some(file.clone());
        Ok(())
    }

    async fn append_audit(&self, root: &ProjectRoot, entry: &AuditEntry) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects
            .entry(root.key())
            .or_default()
            .audit
            .push(entry.clone());
        Ok(())
    }

    async fn read_audit(&self, root: &ProjectRoot) -> StorageResult<Vec<AuditEntry>> {
        let projects = self.projects.lock().unwrap();
        Ok(projects
            .get(&root.key())
            .map(|p| p.audit.clone())
            .unwrap_or_default())
    }

    async fn list_roots(&self) -> StorageResult<Vec<ProjectRoot>> {
        let projects = self.projects.lock().unwrap();
        let mut roots: Vec<ProjectRoot> = projects
            .values()
            .filter_map(|p| p.versions.as_ref().map(|v| v.root.clone()))
            .collect();
        roots.sort_by_key(|r| r.key());
        Ok(roots)
    }
}
