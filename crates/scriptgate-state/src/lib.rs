//! Scriptgate-State: file-backed persistence for project roots
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: whole-document overwrite semantics, append-only audit, and
//! per-root serialization of read-modify-write cycles.
//!
//! ## Key Components
//!
//! - `ProjectStore`: async trait over script/quality/versions/audit documents
//! - `FsProjectStore`: filesystem backend with atomic writes
//! - `VersionsFile`: per-root version metadata plus auto-promote policy

mod error;
pub mod fakes;
mod fs_store;
pub mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::FsProjectStore;
pub use schema::{
    AuditEntry, AuditKind, AutoPromotePolicy, CalibrationRecord, GenerationMode, Outcome,
    ProjectRoot, ProjectVersion, PromotionSegment, QualitySnapshot, SegmentCalibration,
    SegmentThresholds, VersionArtifacts, VersionMeta, VersionStatus, VersionsFile,
};
pub use storage_traits::{
    ContentDigest, ProjectStore, ReadOutcome, RootGuard, RootLocks, StorageResult,
};
