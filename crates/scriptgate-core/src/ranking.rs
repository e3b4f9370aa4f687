//! Version ranking for a project root.
//!
//! Each non-archived version gets a composite score built from its quality
//! snapshot, render state, recency, operator signals and the learned outcome
//! lift. A pinned version always wins.

use std::cmp::Ordering;

use scriptgate_state::{GenerationMode, Outcome, ProjectVersion, VersionStatus};
use serde::{Deserialize, Serialize};

use crate::learning::{LearningSummary, OutcomeLearning};

const PASS_BONUS: f64 = 20.0;
const BLOCKER_COST: f64 = 8.0;
const WARNING_COST: f64 = 2.0;
const INCOMPLETE_COST: f64 = 30.0;
const NO_VIDEO_COST: f64 = 25.0;
const RERENDER_BONUS: f64 = 1.0;
const RECENCY_STEP: f64 = 0.75;
const RECENCY_CAP: u32 = 8;
const LABEL_BONUS: f64 = 0.5;
const PROMOTED_BONUS: f64 = 0.5;
const OUTCOME_SWING: f64 = 18.0;

/// Gap assumed below a lone version, so a single candidate gets full gap score.
const SINGLE_VERSION_GAP: f64 = 17.0;
const PINNED_CONFIDENCE: f64 = 1.0;
const PINNED_REJECTED_CONFIDENCE: f64 = 0.6;

pub const REASON_PINNED: &str = "pinned";
pub const REASON_COMPOSITE: &str = "highest-composite";
pub const REASON_NO_CANDIDATES: &str = "no-candidates";

/// One row of the ranking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVersion {
    pub job_id: String,
    pub version: u32,
    pub composite: f64,
    pub quality_score: f64,
    pub outcome_lift: f64,
    pub passed: bool,
    pub renderable: bool,
    pub pinned: bool,
}

/// Recommendation for a project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecommendation {
    /// Job id of the winning version.
    pub recommended: Option<String>,
    pub confidence: f64,
    pub ranking: Vec<RankedVersion>,
    pub reason: String,
    pub learning: LearningSummary,
}

impl VersionRecommendation {
    pub fn is_recommended(&self, job_id: &str) -> bool {
        self.recommended.as_deref() == Some(job_id)
    }

    pub fn winner(&self) -> Option<&RankedVersion> {
        let id = self.recommended.as_deref()?;
        self.ranking.iter().find(|r| r.job_id == id)
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Composite desirability of one version.
pub fn composite_score(version: &ProjectVersion, learning: &OutcomeLearning) -> (f64, f64) {
    let quality = version.quality.as_ref();
    let mut score = quality.map(|q| q.score).unwrap_or(0.0);

    if quality.map(|q| q.passed).unwrap_or(false) {
        score += PASS_BONUS;
    } else {
        score -= PASS_BONUS;
    }
    if let Some(q) = quality {
        score -= BLOCKER_COST * f64::from(q.blocker_count);
        score -= WARNING_COST * f64::from(q.warning_count);
    }
    if version.status != VersionStatus::Completed {
        score -= INCOMPLETE_COST;
    }
    if !version.artifacts.has_video() {
        score -= NO_VIDEO_COST;
    }
    if version.mode == GenerationMode::Rerender {
        score += RERENDER_BONUS;
    }
    score += f64::from(version.version.min(RECENCY_CAP)) * RECENCY_STEP;
    if version
        .meta
        .label
        .as_deref()
        .map(|l| !l.trim().is_empty())
        .unwrap_or(false)
    {
        score += LABEL_BONUS;
    }
    if version.meta.promoted_at.is_some() {
        score += PROMOTED_BONUS;
    }
    match version.meta.outcome {
        Some(Outcome::Accepted) => score += OUTCOME_SWING,
        Some(Outcome::Rejected) => score -= OUTCOME_SWING,
        None => {}
    }

    let lift = learning.outcome_lift(
        quality.and_then(|q| q.domain_pack_id.as_deref()),
        quality.and_then(|q| q.template_id.as_deref()),
    );
    (score + lift, lift)
}

fn rank(versions: &[ProjectVersion], learning: &OutcomeLearning) -> Vec<RankedVersion> {
    let mut ranking: Vec<RankedVersion> = versions
        .iter()
        .filter(|v| !v.meta.archived)
        .map(|v| {
            let (composite, outcome_lift) = composite_score(v, learning);
            RankedVersion {
                job_id: v.id.clone(),
                version: v.version,
                composite,
                quality_score: v.quality.as_ref().map(|q| q.score).unwrap_or(0.0),
                outcome_lift,
                passed: v.quality.as_ref().map(|q| q.passed).unwrap_or(false),
                renderable: v.is_renderable(),
                pinned: v.meta.pinned,
            }
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.version.cmp(&a.version))
    });
    ranking
}

fn composite_confidence(
    ranking: &[RankedVersion],
    winner_outcome: Option<Outcome>,
    total_outcomes: u32,
) -> f64 {
    let Some(top) = ranking.first() else {
        return 0.0;
    };
    let second = ranking
        .get(1)
        .map(|r| r.composite)
        .unwrap_or(top.composite - SINGLE_VERSION_GAP);
    let gap_score = clamp01((top.composite - second + 3.0) / 20.0);
    let evidence_score = clamp01(f64::from(total_outcomes) / 18.0);
    let mut confidence = 0.7 * gap_score + 0.3 * evidence_score;
    match winner_outcome {
        Some(Outcome::Accepted) => confidence += 0.08,
        Some(Outcome::Rejected) => confidence -= 0.2,
        None => {}
    }
    clamp01(confidence)
}

/// Pick the best version of a root.
pub fn recommend_project_version(
    versions: &[ProjectVersion],
    learning: &OutcomeLearning,
) -> VersionRecommendation {
    let ranking = rank(versions, learning);
    let summary = learning.summary();

    if let Some(pinned) = versions.iter().find(|v| v.meta.pinned && !v.meta.archived) {
        let confidence = if pinned.meta.outcome == Some(Outcome::Rejected) {
            PINNED_REJECTED_CONFIDENCE
        } else {
            PINNED_CONFIDENCE
        };
        return VersionRecommendation {
            recommended: Some(pinned.id.clone()),
            confidence,
            ranking,
            reason: REASON_PINNED.to_string(),
            learning: summary,
        };
    }

    let Some(top) = ranking.first() else {
        return VersionRecommendation {
            recommended: None,
            confidence: 0.0,
            ranking,
            reason: REASON_NO_CANDIDATES.to_string(),
            learning: summary,
        };
    };

    let winner_outcome = versions
        .iter()
        .find(|v| v.id == top.job_id)
        .and_then(|v| v.meta.outcome);
    let confidence = composite_confidence(&ranking, winner_outcome, summary.total_outcomes);

    VersionRecommendation {
        recommended: Some(top.job_id.clone()),
        confidence,
        ranking,
        reason: REASON_COMPOSITE.to_string(),
        learning: summary,
    }
}
