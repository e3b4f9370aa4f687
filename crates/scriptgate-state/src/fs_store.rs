use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::schema::{AuditEntry, ProjectRoot, VersionsFile};
use crate::storage_traits::{ProjectStore, ReadOutcome, RootGuard, RootLocks, StorageResult};

const SCRIPT_FILE: &str = "script.json";
const QUALITY_FILE: &str = "quality.json";
const VERSIONS_FILE: &str = "versions.json";
const AUDIT_FILE: &str = "audit.jsonl";

/// Filesystem-backed project store.
///
/// Layout: `<root>/projects/<root-key>/{script.json, quality.json, versions.json, audit.jsonl}`
pub struct FsProjectStore {
    projects_dir: PathBuf,
    locks: RootLocks,
}

impl FsProjectStore {
    /// Create a new `FsProjectStore` rooted at `root`. Creates `root/projects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let projects_dir = root.as_ref().join("projects");
        fs::create_dir_all(&projects_dir)?;
        Ok(Self {
            projects_dir,
            locks: RootLocks::new(),
        })
    }

    fn project_dir(&self, root: &ProjectRoot) -> PathBuf {
        self.projects_dir.join(root.key())
    }

    fn write_atomic(&self, root: &ProjectRoot, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let dir = self.project_dir(root);
        fs::create_dir_all(&dir)?;

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_json<T: Serialize>(&self, root: &ProjectRoot, name: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_atomic(root, name, &json)
    }
}

/// Read a JSON document, mapping a missing file to `Absent` and unparsable
/// content to `Corrupt`.
fn safe_read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<ReadOutcome<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "document absent");
            return Ok(ReadOutcome::Absent);
        }
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Ok(ReadOutcome::Present(v)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt document treated as absent");
            Ok(ReadOutcome::Corrupt(e.to_string()))
        }
    }
}

#[async_trait]
impl ProjectStore for FsProjectStore {
    async fn lock_root(&self, root: &ProjectRoot) -> RootGuard {
        self.locks.lock(root).await
    }

    async fn read_script(
        &self,
        root: &ProjectRoot,
    ) -> StorageResult<ReadOutcome<serde_json::Value>> {
        safe_read_json(&self.project_dir(root).join(SCRIPT_FILE))
    }

    async fn write_script(
        &self,
        root: &ProjectRoot,
        script: &serde_json::Value,
    ) -> StorageResult<()> {
        self.write_json(root, SCRIPT_FILE, script)
    }

    async fn read_quality(
        &self,
        root: &ProjectRoot,
    ) -> StorageResult<ReadOutcome<serde_json::Value>> {
        safe_read_json(&self.project_dir(root).join(QUALITY_FILE))
    }

    async fn write_quality(
        &self,
        root: &ProjectRoot,
        quality: &serde_json::Value,
    ) -> StorageResult<()> {
        self.write_json(root, QUALITY_FILE, quality)
    }

    async fn read_versions(&self, root: &ProjectRoot) -> StorageResult<ReadOutcome<VersionsFile>> {
        safe_read_json(&self.project_dir(root).join(VERSIONS_FILE))
    }

    async fn write_versions(&self, file: &VersionsFile) -> StorageResult<()> {
        self.write_json(&file.root, VERSIONS_FILE, file)
    }

    async fn append_audit(&self, root: &ProjectRoot, entry: &AuditEntry) -> StorageResult<()> {
        let dir = self.project_dir(root);
        fs::create_dir_all(&dir)?;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(AUDIT_FILE))?;
        file.write_all(&line)?;
        Ok(())
    }

    async fn read_audit(&self, root: &ProjectRoot) -> StorageResult<Vec<AuditEntry>> {
        let path = self.project_dir(root).join(AUDIT_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping corrupt audit line")
                }
            }
        }
        Ok(entries)
    }

    async fn list_roots(&self) -> StorageResult<Vec<ProjectRoot>> {
        let mut roots = Vec::new();
        let entries = match fs::read_dir(&self.projects_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(roots),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path().join(VERSIONS_FILE);
            if let ReadOutcome::Present(file) = safe_read_json::<VersionsFile>(&path)? {
                roots.push(file.root);
            }
        }
        roots.sort_by_key(|r| r.key());
        Ok(roots)
    }
}
