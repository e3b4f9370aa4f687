//! Structured lifecycle events for scoring, improvement and promotion.
//!
//! - `ProjectSpan` RAII guard tags everything logged for one project root
//! - `emit_*` functions log one event each at `info!`
//!
//! Set `SCRIPTGATE_LOG` (or `RUST_LOG`) to filter, and pass `--json` to the
//! binaries for machine-readable output.

use tracing::{info, warn};

/// RAII guard that enters a root-scoped span.
///
/// ```ignore
/// let _span = ProjectSpan::enter("3f2a9c1b0d4e");
/// // every event below carries root = "3f2a9c1b0d4e"
/// ```
pub struct ProjectSpan {
    _span: tracing::span::EnteredSpan,
}

impl ProjectSpan {
    pub fn enter(root_key: &str) -> Self {
        let span = tracing::info_span!("scriptgate.project", root = %root_key);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_quality_evaluated(
    pack_id: &str,
    score: f64,
    passed: bool,
    blockers: usize,
    warnings: usize,
) {
    info!(
        event = "quality.evaluated",
        pack_id = %pack_id,
        score = score,
        passed = passed,
        blockers = blockers,
        warnings = warnings,
    );
}

pub fn emit_autofix_applied(pack_id: &str, actions: usize) {
    info!(event = "autofix.applied", pack_id = %pack_id, actions = actions);
}

pub fn emit_improve_step(
    step: usize,
    section: &str,
    score_before: f64,
    score_after: f64,
    improved: bool,
) {
    info!(
        event = "improve.step",
        step = step,
        section = %section,
        score_before = score_before,
        score_after = score_after,
        improved = improved,
    );
}

/// Emit event: auto-improve loop halted.
pub fn emit_improve_stopped(reason: &str, steps: usize, initial_score: f64, final_score: f64) {
    info!(
        event = "improve.stopped",
        reason = %reason,
        steps = steps,
        initial_score = initial_score,
        final_score = final_score,
    );
}

/// Emit event: a promotion decision was made (promoted or refused).
pub fn emit_promotion_evaluated(
    job_id: &str,
    promoted: bool,
    reason: &str,
    confidence: Option<f64>,
) {
    info!(
        event = "promotion.evaluated",
        job_id = %job_id,
        promoted = promoted,
        reason = %reason,
        confidence = confidence,
    );
}

pub fn emit_policy_calibrated(applied: bool, core_icp: f64, broad: f64) {
    info!(
        event = "policy.calibrated",
        applied = applied,
        core_icp = core_icp,
        broad = broad,
    );
}

pub fn emit_job_queued(job_id: &str, version: u32, queue_depth: usize) {
    info!(
        event = "job.queued",
        job_id = %job_id,
        version = version,
        queue_depth = queue_depth,
    );
}

pub fn emit_job_finished(job_id: &str, status: &str, has_video: bool) {
    info!(event = "job.finished", job_id = %job_id, status = %status, has_video = has_video);
}

/// Emit event: background evaluation failed (warning level).
pub fn emit_promotion_error(job_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "promotion.error", job_id = %job_id, error = %error);
}
