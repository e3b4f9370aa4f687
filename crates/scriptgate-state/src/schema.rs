//! Persisted record shapes for a project root.
//!
//! A project root is one source URL rendered for one owner. Everything the
//! promotion engine needs about a root lives in a single `versions.json`
//! document ([`VersionsFile`]): every render attempt, its metadata, and the
//! per-project auto-promote policy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{ContentDigest, StorageResult};

// ---------------------------------------------------------------------------
// Project root
// ---------------------------------------------------------------------------

/// Identity of a project: its source URL plus the owning account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRoot {
    pub source_url: String,
    pub owner: String,
}

impl ProjectRoot {
    pub fn new(source_url: impl Into<String>, owner: impl Into<String>) -> StorageResult<Self> {
        let source_url = source_url.into().trim().to_string();
        let owner = owner.into().trim().to_string();
        if source_url.is_empty() {
            return Err(StorageError::InvalidRoot("source_url is empty".to_string()));
        }
        if owner.is_empty() {
            return Err(StorageError::InvalidRoot("owner is empty".to_string()));
        }
        Ok(Self { source_url, owner })
    }

    /// Stable storage key, independent of URL casing and trailing slashes.
    pub fn key(&self) -> String {
        let url = self
            .source_url
            .trim()
            .trim_end_matches('/')
            .to_ascii_lowercase();
        let owner = self.owner.trim().to_ascii_lowercase();
        let digest = ContentDigest::from_bytes(format!("{url}\n{owner}").as_bytes());
        digest.short().to_string()
    }
}

impl fmt::Display for ProjectRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source_url, self.owner)
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// Lifecycle status of one render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl VersionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How the version was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Generate,
    Rerender,
}

/// Operator (or auto-promotion) verdict on a shipped version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Rejected,
}

impl FromStr for Outcome {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(StorageError::Serialization(format!(
                "unknown outcome '{other}'"
            ))),
        }
    }
}

/// Quality signals captured when the version's script was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualitySnapshot {
    pub score: f64,
    pub passed: bool,
    pub blocker_count: u32,
    pub warning_count: u32,
    #[serde(default)]
    pub domain_pack_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Paths produced by the external render step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionArtifacts {
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub script_path: Option<String>,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
}

impl VersionArtifacts {
    /// Whether a playable video exists for this version.
    pub fn has_video(&self) -> bool {
        self.video_path
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Operator-editable metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VersionMeta {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub promoted_at: Option<DateTime<Utc>>,
}

/// One rendering attempt of a project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVersion {
    /// Job id that produced this version.
    pub id: String,
    /// Monotonic per root, starting at 1.
    pub version: u32,
    pub status: VersionStatus,
    pub mode: GenerationMode,
    #[serde(default)]
    pub quality: Option<QualitySnapshot>,
    #[serde(default)]
    pub artifacts: VersionArtifacts,
    #[serde(default)]
    pub meta: VersionMeta,
    #[serde(default)]
    pub auto_promote_if_winner: bool,
    /// Set once auto-promotion has been evaluated for this job.
    #[serde(default)]
    pub auto_promote_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProjectVersion {
    pub fn queued(id: impl Into<String>, version: u32, mode: GenerationMode) -> Self {
        Self {
            id: id.into(),
            version,
            status: VersionStatus::Queued,
            mode,
            quality: None,
            artifacts: VersionArtifacts::default(),
            meta: VersionMeta::default(),
            auto_promote_if_winner: false,
            auto_promote_evaluated_at: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Completed with a playable video.
    pub fn is_renderable(&self) -> bool {
        self.status == VersionStatus::Completed && self.artifacts.has_video()
    }
}

// ---------------------------------------------------------------------------
// Auto-promote policy
// ---------------------------------------------------------------------------

/// Audience segment a domain pack belongs to for promotion thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PromotionSegment {
    #[serde(rename = "core-icp")]
    CoreIcp,
    #[serde(rename = "broad")]
    Broad,
}

impl PromotionSegment {
    pub const ALL: [PromotionSegment; 2] = [PromotionSegment::CoreIcp, PromotionSegment::Broad];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoreIcp => "core-icp",
            Self::Broad => "broad",
        }
    }
}

impl fmt::Display for PromotionSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromotionSegment {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core-icp" => Ok(Self::CoreIcp),
            "broad" => Ok(Self::Broad),
            other => Err(StorageError::Serialization(format!(
                "unknown promotion segment '{other}'"
            ))),
        }
    }
}

/// Per-segment confidence overrides; `None` falls back to the policy default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SegmentThresholds {
    #[serde(rename = "core-icp", default)]
    pub core_icp: Option<f64>,
    #[serde(default)]
    pub broad: Option<f64>,
}

impl SegmentThresholds {
    pub fn get(&self, segment: PromotionSegment) -> Option<f64> {
        match segment {
            PromotionSegment::CoreIcp => self.core_icp,
            PromotionSegment::Broad => self.broad,
        }
    }

    pub fn set(&mut self, segment: PromotionSegment, value: f64) {
        match segment {
            PromotionSegment::CoreIcp => self.core_icp = Some(value),
            PromotionSegment::Broad => self.broad = Some(value),
        }
    }
}

/// One segment's calibration result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCalibration {
    pub segment: PromotionSegment,
    pub accepted: u32,
    pub rejected: u32,
    pub acceptance_rate: f64,
    pub evidence_weight: f64,
    pub current: f64,
    pub recommended: f64,
}

/// Record of the last applied calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub applied_at: DateTime<Utc>,
    pub segments: Vec<SegmentCalibration>,
}

/// Per-project auto-promotion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoPromotePolicy {
    pub min_confidence: f64,
    #[serde(default)]
    pub segment_thresholds: SegmentThresholds,
    #[serde(default)]
    pub last_calibration: Option<CalibrationRecord>,
}

impl Default for AutoPromotePolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.75,
            segment_thresholds: SegmentThresholds::default(),
            last_calibration: None,
        }
    }
}

// ---------------------------------------------------------------------------
// versions.json
// ---------------------------------------------------------------------------

/// The version-metadata document persisted per project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionsFile {
    pub root: ProjectRoot,
    #[serde(default)]
    pub versions: Vec<ProjectVersion>,
    #[serde(default)]
    pub policy: Option<AutoPromotePolicy>,
}

impl VersionsFile {
    pub fn new(root: ProjectRoot) -> Self {
        Self {
            root,
            versions: Vec::new(),
            policy: None,
        }
    }

    /// Next monotonic version number (1 for an empty root).
    pub fn next_version(&self) -> u32 {
        self.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1
    }

    pub fn find(&self, id: &str) -> Option<&ProjectVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut ProjectVersion> {
        self.versions.iter_mut().find(|v| v.id == id)
    }

    pub fn pinned(&self) -> Option<&ProjectVersion> {
        self.versions
            .iter()
            .find(|v| v.meta.pinned && !v.meta.archived)
    }

    /// Pin `id` and unpin every other version. Returns `false` if `id` is unknown.
    pub fn pin_exclusive(&mut self, id: &str) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        for v in &mut self.versions {
            v.meta.pinned = v.id == id;
        }
        true
    }

    /// Policy, created with defaults on first read.
    pub fn policy_or_default(&mut self) -> &mut AutoPromotePolicy {
        self.policy.get_or_insert_with(AutoPromotePolicy::default)
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Kinds of entries in the append-only project audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditKind {
    RerenderQueued,
    AutopromotePromoted,
    AutopromoteSkipped,
    AutopromoteFailed,
    PolicyUpdated,
    VersionPromoted,
    OutcomeRecorded,
    MetaUpdated,
}

/// One audit log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl AuditEntry {
    pub fn new(kind: AuditKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
            job_id: None,
            reason: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> ProjectRoot {
        ProjectRoot::new("https://op.gg/", "acct-1").unwrap()
    }

    #[test]
    fn root_key_ignores_case_and_trailing_slash() {
        let a = ProjectRoot::new("https://OP.gg/", "Acct-1").unwrap();
        let b = ProjectRoot::new("https://op.gg", "acct-1").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().len(), 12);
    }

    #[test]
    fn root_rejects_empty_fields() {
        assert!(ProjectRoot::new(" ", "x").is_err());
        assert!(ProjectRoot::new("https://a.io", "").is_err());
    }

    #[test]
    fn pin_exclusive_leaves_one_pinned() {
        let mut file = VersionsFile::new(root());
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut v = ProjectVersion::queued(*id, i as u32 + 1, GenerationMode::Generate);
            v.meta.pinned = true;
            file.versions.push(v);
        }
        assert!(file.pin_exclusive("b"));
        let pinned: Vec<_> = file.versions.iter().filter(|v| v.meta.pinned).collect();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].id, "b");
        assert!(!file.pin_exclusive("zzz"));
    }

    #[test]
    fn next_version_is_monotonic() {
        let mut file = VersionsFile::new(root());
        assert_eq!(file.next_version(), 1);
        file.versions
            .push(ProjectVersion::queued("a", 4, GenerationMode::Generate));
        assert_eq!(file.next_version(), 5);
    }

    #[test]
    fn segment_serializes_as_kebab_names() {
        let json = serde_json::to_string(&PromotionSegment::CoreIcp).unwrap();
        assert_eq!(json, "\"core-icp\"");
        assert_eq!(
            "broad".parse::<PromotionSegment>().unwrap(),
            PromotionSegment::Broad
        );
        assert!("Broad".parse::<PromotionSegment>().is_err());
    }

    #[test]
    fn policy_defaults_on_first_read() {
        let mut file = VersionsFile::new(root());
        assert!(file.policy.is_none());
        let policy = file.policy_or_default();
        assert!((policy.min_confidence - 0.75).abs() < f64::EPSILON);
        assert!(file.policy.is_some());
    }
}
