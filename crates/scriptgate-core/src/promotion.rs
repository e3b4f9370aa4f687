//! Promotion decisions over a project root's versions.
//!
//! - `evaluate_auto_promote`: once-per-job promotion of a winning rerender
//! - `promote_version`: operator promotion with the same safety rules
//! - `record_outcome` / `update_version_meta`: operator verdicts and labels
//! - `calibrate_thresholds`: per-segment confidence thresholds from history
//!
//! Every read-modify-write of `versions.json` holds the store's per-root lock.
//! Refusals are values with a machine-readable reason, never errors.

use std::fmt;

use chrono::{DateTime, Utc};
use scriptgate_state::{
    AuditEntry, AuditKind, AutoPromotePolicy, CalibrationRecord, GenerationMode, Outcome,
    ProjectRoot, ProjectStore, ProjectVersion, PromotionSegment, SegmentCalibration,
    VersionStatus, VersionsFile,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Result, ScriptGateError};
use crate::learning::{laplace_rate, read_versions_or_default, OutcomeLearning};
use crate::metrics::METRICS;
use crate::obs;
use crate::packs::segment_for_pack;
use crate::ranking::recommend_project_version;

const CALIBRATION_FLOOR: f64 = 0.55;
const CALIBRATION_CEILING: f64 = 0.9;
const CALIBRATION_FULL_EVIDENCE: f64 = 12.0;

/// Promotion thresholds and watchdog cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub default_min_confidence: f64,
    pub core_icp_default: f64,
    pub broad_default: f64,
    pub watchdog_interval_secs: u64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            default_min_confidence: 0.75,
            core_icp_default: 0.8,
            broad_default: 0.72,
            watchdog_interval_secs: 60,
        }
    }
}

impl PromotionConfig {
    pub fn segment_default(&self, segment: PromotionSegment) -> f64 {
        match segment {
            PromotionSegment::CoreIcp => self.core_icp_default,
            PromotionSegment::Broad => self.broad_default,
        }
    }

    /// Threshold a winner in `segment` must clear.
    ///
    /// Order: explicit segment threshold, then a project-customized
    /// `min_confidence`, then the segment's default bucket.
    pub fn effective_threshold(&self, policy: &AutoPromotePolicy, segment: PromotionSegment) -> f64 {
        if let Some(value) = policy.segment_thresholds.get(segment) {
            return value;
        }
        if (policy.min_confidence - self.default_min_confidence).abs() > f64::EPSILON {
            return policy.min_confidence;
        }
        self.segment_default(segment)
    }
}

/// Why a promotion happened or was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionReason {
    Promoted,
    AlreadyEvaluated,
    NotRerender,
    NotFlagged,
    NotCompleted,
    MissingVideo,
    NotRecommendedWinner,
    BelowThreshold,
    VersionNotFound,
}

impl PromotionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Promoted => "promoted",
            Self::AlreadyEvaluated => "already-evaluated",
            Self::NotRerender => "not-rerender",
            Self::NotFlagged => "not-flagged",
            Self::NotCompleted => "not-completed",
            Self::MissingVideo => "missing-video",
            Self::NotRecommendedWinner => "not-recommended-winner",
            Self::BelowThreshold => "below-threshold",
            Self::VersionNotFound => "version-not-found",
        }
    }
}

impl fmt::Display for PromotionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context recorded with every promotion decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionMetadata {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<PromotionSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionResult {
    pub promoted: bool,
    pub reason: PromotionReason,
    pub metadata: PromotionMetadata,
}

impl PromotionResult {
    fn refused(reason: PromotionReason, metadata: PromotionMetadata) -> Self {
        Self {
            promoted: false,
            reason,
            metadata,
        }
    }
}

/// Pin `job_id`, unpin the rest and stamp the promotion time.
fn apply_promotion(file: &mut VersionsFile, job_id: &str, now: DateTime<Utc>) {
    file.pin_exclusive(job_id);
    if let Some(v) = file.find_mut(job_id) {
        v.meta.promoted_at = Some(now);
    }
}

/// Safety precondition shared by automatic and manual promotion.
fn render_refusal(version: &ProjectVersion) -> Option<PromotionReason> {
    if version.status != VersionStatus::Completed {
        Some(PromotionReason::NotCompleted)
    } else if !version.artifacts.has_video() {
        Some(PromotionReason::MissingVideo)
    } else {
        None
    }
}

fn version_segment(version: &ProjectVersion) -> PromotionSegment {
    segment_for_pack(
        version
            .quality
            .as_ref()
            .and_then(|q| q.domain_pack_id.as_deref()),
    )
}

/// Evaluate auto-promotion for a finished rerender job.
///
/// Runs at most once per job: every decisive outcome stamps
/// `auto_promote_evaluated_at`. Jobs that have not reached a terminal status
/// are refused without the stamp so a later sweep can retry them.
pub async fn evaluate_auto_promote(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    job_id: &str,
    learning: &OutcomeLearning,
    config: &PromotionConfig,
) -> Result<PromotionResult> {
    match evaluate_locked(store, root, job_id, learning, config).await {
        Ok(result) => {
            obs::emit_promotion_evaluated(
                job_id,
                result.promoted,
                result.reason.as_str(),
                result.metadata.confidence,
            );
            Ok(result)
        }
        Err(err) => {
            obs::emit_promotion_error(job_id, &err);
            let entry = AuditEntry::new(AuditKind::AutopromoteFailed)
                .with_job(job_id)
                .with_reason(err.to_string());
            if let Err(audit_err) = store.append_audit(root, &entry).await {
                warn!(job_id = %job_id, error = %audit_err, "failed to audit promotion failure");
            }
            Err(err)
        }
    }
}

async fn evaluate_locked(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    job_id: &str,
    learning: &OutcomeLearning,
    config: &PromotionConfig,
) -> Result<PromotionResult> {
    let _guard = store.lock_root(root).await;
    let mut file = read_versions_or_default(store, root).await?;
    let mut metadata = PromotionMetadata {
        job_id: job_id.to_string(),
        ..PromotionMetadata::default()
    };

    let Some(version) = file.find(job_id).cloned() else {
        let result = PromotionResult::refused(PromotionReason::VersionNotFound, metadata);
        audit_decision(store, root, &result).await?;
        return Ok(result);
    };

    if version.auto_promote_evaluated_at.is_some() {
        metadata.evaluated_at = version.auto_promote_evaluated_at;
        // no audit line: the original decision is already on record
        return Ok(PromotionResult::refused(
            PromotionReason::AlreadyEvaluated,
            metadata,
        ));
    }
    if !version.status.is_terminal() {
        return Ok(PromotionResult::refused(
            PromotionReason::NotCompleted,
            metadata,
        ));
    }

    let now = Utc::now();
    metadata.evaluated_at = Some(now);
    let policy = file.policy_or_default().clone();
    let segment = version_segment(&version);
    metadata.segment = Some(segment);

    let reason = if version.mode != GenerationMode::Rerender {
        Some(PromotionReason::NotRerender)
    } else if !version.auto_promote_if_winner {
        Some(PromotionReason::NotFlagged)
    } else {
        render_refusal(&version)
    };

    let result = match reason {
        Some(reason) => PromotionResult::refused(reason, metadata),
        None => {
            let recommendation = recommend_project_version(&file.versions, learning);
            let threshold = config.effective_threshold(&policy, segment);
            metadata.recommended = recommendation.recommended.clone();
            metadata.confidence = Some(recommendation.confidence);
            metadata.threshold = Some(threshold);

            if !recommendation.is_recommended(job_id) {
                PromotionResult::refused(PromotionReason::NotRecommendedWinner, metadata)
            } else if recommendation.confidence < threshold {
                PromotionResult::refused(PromotionReason::BelowThreshold, metadata)
            } else {
                apply_promotion(&mut file, job_id, now);
                if let Some(v) = file.find_mut(job_id) {
                    v.meta.outcome.get_or_insert(Outcome::Accepted);
                }
                METRICS.inc_promotions();
                PromotionResult {
                    promoted: true,
                    reason: PromotionReason::Promoted,
                    metadata,
                }
            }
        }
    };

    if let Some(v) = file.find_mut(job_id) {
        v.auto_promote_evaluated_at = Some(now);
    }
    store.write_versions(&file).await?;
    audit_decision(store, root, &result).await?;
    Ok(result)
}

async fn audit_decision(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    result: &PromotionResult,
) -> Result<()> {
    let kind = if result.promoted {
        AuditKind::AutopromotePromoted
    } else {
        AuditKind::AutopromoteSkipped
    };
    let entry = AuditEntry::new(kind)
        .with_job(result.metadata.job_id.clone())
        .with_reason(result.reason.as_str())
        .with_detail(serde_json::to_value(&result.metadata)?);
    store.append_audit(root, &entry).await?;
    Ok(())
}

/// Operator promotion: completed with a video, then pinned exclusively.
pub async fn promote_version(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    job_id: &str,
) -> Result<PromotionResult> {
    let _guard = store.lock_root(root).await;
    let mut file = read_versions_or_default(store, root).await?;
    let metadata = PromotionMetadata {
        job_id: job_id.to_string(),
        ..PromotionMetadata::default()
    };

    let Some(version) = file.find(job_id) else {
        return Ok(PromotionResult::refused(
            PromotionReason::VersionNotFound,
            metadata,
        ));
    };
    if let Some(reason) = render_refusal(version) {
        warn!(job_id = %job_id, reason = %reason, "manual promotion refused");
        return Ok(PromotionResult::refused(reason, metadata));
    }

    apply_promotion(&mut file, job_id, Utc::now());
    store.write_versions(&file).await?;
    store
        .append_audit(root, &AuditEntry::new(AuditKind::VersionPromoted).with_job(job_id))
        .await?;
    METRICS.inc_promotions();
    info!(job_id = %job_id, root = %root.key(), "version promoted");

    Ok(PromotionResult {
        promoted: true,
        reason: PromotionReason::Promoted,
        metadata,
    })
}

fn version_not_found(root: &ProjectRoot, job_id: &str) -> ScriptGateError {
    ScriptGateError::VersionNotFound {
        root: root.to_string(),
        job_id: job_id.to_string(),
    }
}

/// Set or clear the operator verdict on a version.
pub async fn record_outcome(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    job_id: &str,
    outcome: Option<Outcome>,
) -> Result<ProjectVersion> {
    let _guard = store.lock_root(root).await;
    let mut file = read_versions_or_default(store, root).await?;
    let version = file
        .find_mut(job_id)
        .ok_or_else(|| version_not_found(root, job_id))?;
    version.meta.outcome = outcome;
    let updated = version.clone();

    store.write_versions(&file).await?;
    let entry = AuditEntry::new(AuditKind::OutcomeRecorded)
        .with_job(job_id)
        .with_detail(serde_json::json!({ "outcome": outcome }));
    store.append_audit(root, &entry).await?;
    Ok(updated)
}

/// Partial update of operator-editable metadata.
///
/// `label: Some(None)` clears the label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionMetaUpdate {
    pub label: Option<Option<String>>,
    pub archived: Option<bool>,
}

pub async fn update_version_meta(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    job_id: &str,
    update: VersionMetaUpdate,
) -> Result<ProjectVersion> {
    let _guard = store.lock_root(root).await;
    let mut file = read_versions_or_default(store, root).await?;
    let version = file
        .find_mut(job_id)
        .ok_or_else(|| version_not_found(root, job_id))?;

    if let Some(label) = update.label {
        version.meta.label = label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
    }
    if let Some(archived) = update.archived {
        version.meta.archived = archived;
        if archived {
            version.meta.pinned = false;
        }
    }
    let updated = version.clone();

    store.write_versions(&file).await?;
    let entry = AuditEntry::new(AuditKind::MetaUpdated)
        .with_job(job_id)
        .with_detail(serde_json::json!({
            "label": updated.meta.label,
            "archived": updated.meta.archived,
        }));
    store.append_audit(root, &entry).await?;
    Ok(updated)
}

/// Calibration result for a root, previewed or applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub applied: bool,
    pub segments: Vec<SegmentCalibration>,
}

impl CalibrationReport {
    pub fn recommended(&self, segment: PromotionSegment) -> Option<f64> {
        self.segments
            .iter()
            .find(|s| s.segment == segment)
            .map(|s| s.recommended)
    }
}

/// Recommended threshold for one segment from its outcome counts.
pub fn calibrate_segment(
    segment: PromotionSegment,
    accepted: u32,
    rejected: u32,
    current: f64,
    config: &PromotionConfig,
) -> SegmentCalibration {
    let default = config.segment_default(segment);
    let n = f64::from(accepted + rejected);
    let rate = laplace_rate(accepted, rejected);
    let raw = default + (0.5 - rate) * 0.5;
    let evidence_weight = (n / CALIBRATION_FULL_EVIDENCE).min(1.0);
    let recommended = (default * (1.0 - evidence_weight) + raw * evidence_weight)
        .clamp(CALIBRATION_FLOOR, CALIBRATION_CEILING);
    SegmentCalibration {
        segment,
        accepted,
        rejected,
        acceptance_rate: rate,
        evidence_weight,
        current,
        recommended,
    }
}

/// Compute per-segment thresholds from cross-project history; with `apply`,
/// write them into the root's policy. A preview is read-only and never
/// creates the policy.
pub async fn calibrate_thresholds(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    learning: &OutcomeLearning,
    config: &PromotionConfig,
    apply: bool,
) -> Result<CalibrationReport> {
    let _guard = store.lock_root(root).await;
    let mut file = read_versions_or_default(store, root).await?;
    let policy = file.policy.clone().unwrap_or_default();

    let segments: Vec<SegmentCalibration> = PromotionSegment::ALL
        .iter()
        .map(|&segment| {
            let bucket = learning.segment(segment);
            calibrate_segment(
                segment,
                bucket.accepted,
                bucket.rejected,
                config.effective_threshold(&policy, segment),
                config,
            )
        })
        .collect();

    let report = CalibrationReport {
        applied: apply,
        segments,
    };
    let core = report
        .recommended(PromotionSegment::CoreIcp)
        .unwrap_or(config.core_icp_default);
    let broad = report
        .recommended(PromotionSegment::Broad)
        .unwrap_or(config.broad_default);
    obs::emit_policy_calibrated(apply, core, broad);

    if apply {
        let now = Utc::now();
        let policy = file.policy_or_default();
        for s in &report.segments {
            policy.segment_thresholds.set(s.segment, s.recommended);
        }
        policy.last_calibration = Some(CalibrationRecord {
            applied_at: now,
            segments: report.segments.clone(),
        });
        store.write_versions(&file).await?;
        let entry = AuditEntry::new(AuditKind::PolicyUpdated)
            .with_reason("calibration")
            .with_detail(serde_json::to_value(&report.segments)?);
        store.append_audit(root, &entry).await?;
    }

    Ok(report)
}
