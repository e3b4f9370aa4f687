//! Cross-project learning from recorded version outcomes.
//!
//! Accepted/rejected verdicts are bucketed by domain pack, by template and by
//! the (pack, template) pair. Ranking turns the buckets into an additive
//! `outcome_lift`; threshold calibration reads the per-segment totals.

use std::collections::BTreeMap;

use scriptgate_state::{
    Outcome, ProjectRoot, ProjectStore, PromotionSegment, ReadOutcome, VersionsFile,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Result;
use crate::metrics::METRICS;
use crate::packs::segment_for_pack;

const PAIR_WEIGHT: f64 = 16.0;
const PACK_WEIGHT: f64 = 10.0;
const TEMPLATE_WEIGHT: f64 = 8.0;
/// Evidence count at which a bucket's lift reaches full weight.
const FULL_EVIDENCE: f64 = 6.0;

/// Laplace-smoothed acceptance rate: `(a+1)/(a+r+2)`. 0.5 with no evidence.
pub fn laplace_rate(accepted: u32, rejected: u32) -> f64 {
    (f64::from(accepted) + 1.0) / (f64::from(accepted) + f64::from(rejected) + 2.0)
}

/// Accepted/rejected counts for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeBucket {
    pub accepted: u32,
    pub rejected: u32,
}

impl OutcomeBucket {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Accepted => self.accepted += 1,
            Outcome::Rejected => self.rejected += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.accepted + self.rejected
    }

    pub fn rate(&self) -> f64 {
        laplace_rate(self.accepted, self.rejected)
    }

    /// Signed contribution of this bucket, scaled by how much evidence it has.
    fn lift(&self, weight: f64) -> f64 {
        let n = f64::from(self.total());
        if n == 0.0 {
            return 0.0;
        }
        (self.rate() - 0.5) * (n / FULL_EVIDENCE).min(1.0) * weight
    }
}

/// Compact view of the learning state, attached to recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningSummary {
    pub total_outcomes: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub packs: usize,
    pub templates: usize,
}

/// Outcome buckets collected across every project root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeLearning {
    pub by_pack: BTreeMap<String, OutcomeBucket>,
    pub by_template: BTreeMap<String, OutcomeBucket>,
    /// Keyed `"<pack>|<template>"`.
    pub by_pair: BTreeMap<String, OutcomeBucket>,
    pub by_segment: BTreeMap<PromotionSegment, OutcomeBucket>,
    pub overall: OutcomeBucket,
}

fn pair_key(pack: &str, template: &str) -> String {
    format!("{pack}|{template}")
}

impl OutcomeLearning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every version with a recorded outcome into the buckets.
    pub fn from_versions<'a>(files: impl IntoIterator<Item = &'a VersionsFile>) -> Self {
        let mut learning = Self::new();
        for file in files {
            learning.absorb(file);
        }
        learning
    }

    pub fn absorb(&mut self, file: &VersionsFile) {
        for version in &file.versions {
            let Some(outcome) = version.meta.outcome else {
                continue;
            };
            let pack = version
                .quality
                .as_ref()
                .and_then(|q| q.domain_pack_id.as_deref());
            let template = version
                .quality
                .as_ref()
                .and_then(|q| q.template_id.as_deref());
            self.record(pack, template, outcome);
        }
    }

    pub fn record(&mut self, pack: Option<&str>, template: Option<&str>, outcome: Outcome) {
        self.overall.record(outcome);
        self.by_segment
            .entry(segment_for_pack(pack))
            .or_default()
            .record(outcome);
        if let Some(pack) = pack {
            self.by_pack.entry(pack.to_string()).or_default().record(outcome);
        }
        if let Some(template) = template {
            self.by_template
                .entry(template.to_string())
                .or_default()
                .record(outcome);
        }
        if let (Some(pack), Some(template)) = (pack, template) {
            self.by_pair
                .entry(pair_key(pack, template))
                .or_default()
                .record(outcome);
        }
    }

    /// Additive ranking adjustment for a version built with `pack` and `template`.
    ///
    /// Zero when none of the matching buckets have evidence.
    pub fn outcome_lift(&self, pack: Option<&str>, template: Option<&str>) -> f64 {
        let mut lift = 0.0;
        if let (Some(p), Some(t)) = (pack, template) {
            if let Some(bucket) = self.by_pair.get(&pair_key(p, t)) {
                lift += bucket.lift(PAIR_WEIGHT);
            }
        }
        if let Some(bucket) = pack.and_then(|p| self.by_pack.get(p)) {
            lift += bucket.lift(PACK_WEIGHT);
        }
        if let Some(bucket) = template.and_then(|t| self.by_template.get(t)) {
            lift += bucket.lift(TEMPLATE_WEIGHT);
        }
        lift
    }

    pub fn segment(&self, segment: PromotionSegment) -> OutcomeBucket {
        self.by_segment.get(&segment).copied().unwrap_or_default()
    }

    pub fn total_outcomes(&self) -> u32 {
        self.overall.total()
    }

    pub fn summary(&self) -> LearningSummary {
        LearningSummary {
            total_outcomes: self.overall.total(),
            accepted: self.overall.accepted,
            rejected: self.overall.rejected,
            packs: self.by_pack.len(),
            templates: self.by_template.len(),
        }
    }
}

/// Read `versions.json`, treating absent and corrupt documents as empty.
///
/// Corrupt reads are logged and counted.
pub async fn read_versions_or_default(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
) -> Result<VersionsFile> {
    match store.read_versions(root).await? {
        ReadOutcome::Present(file) => Ok(file),
        ReadOutcome::Absent => Ok(VersionsFile::new(root.clone())),
        ReadOutcome::Corrupt(reason) => {
            warn!(root = %root.key(), reason = %reason, "versions.json is corrupt; using empty document");
            METRICS.inc_corrupt_reads();
            Ok(VersionsFile::new(root.clone()))
        }
    }
}

/// Build learning from every root in the store.
pub async fn collect_outcome_learning(store: &dyn ProjectStore) -> Result<OutcomeLearning> {
    let mut learning = OutcomeLearning::new();
    for root in store.list_roots().await? {
        let file = read_versions_or_default(store, &root).await?;
        learning.absorb(&file);
    }
    Ok(learning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptgate_state::fakes::MemoryProjectStore;
    use scriptgate_state::{GenerationMode, ProjectVersion, QualitySnapshot};

    fn version_with(id: &str, pack: &str, template: &str, outcome: Outcome) -> ProjectVersion {
        let mut v = ProjectVersion::queued(id, 1, GenerationMode::Generate);
        v.quality = Some(QualitySnapshot {
            domain_pack_id: Some(pack.to_string()),
            template_id: Some(template.to_string()),
            ..QualitySnapshot::default()
        });
        v.meta.outcome = Some(outcome);
        v
    }

    #[test]
    fn laplace_rate_is_half_without_evidence() {
        assert!((laplace_rate(0, 0) - 0.5).abs() < 1e-12);
        assert!((laplace_rate(10, 2) - 11.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn zero_evidence_gives_zero_lift() {
        let learning = OutcomeLearning::new();
        assert_eq!(learning.outcome_lift(Some("saas"), Some("product-tour")), 0.0);
        assert_eq!(learning.outcome_lift(None, None), 0.0);
    }

    #[test]
    fn accepted_history_lifts_matching_versions() {
        let mut learning = OutcomeLearning::new();
        for _ in 0..10 {
            learning.record(Some("saas"), Some("product-tour"), Outcome::Accepted);
        }
        let pair_lift = learning.outcome_lift(Some("saas"), Some("product-tour"));
        // (11/12 - 0.5) * (16 + 10 + 8)
        assert!((pair_lift - (11.0 / 12.0 - 0.5) * 34.0).abs() < 1e-9);

        let pack_only = learning.outcome_lift(Some("saas"), Some("other"));
        assert!((pack_only - (11.0 / 12.0 - 0.5) * 10.0).abs() < 1e-9);
        assert_eq!(learning.outcome_lift(Some("gaming"), None), 0.0);
    }

    #[test]
    fn sparse_evidence_is_scaled_down() {
        let mut learning = OutcomeLearning::new();
        for _ in 0..3 {
            learning.record(Some("fintech"), None, Outcome::Rejected);
        }
        let lift = learning.outcome_lift(Some("fintech"), None);
        // rate 1/5, scale 3/6
        assert!((lift - (0.2 - 0.5) * 0.5 * 10.0).abs() < 1e-9);
    }

    #[test]
    fn segments_follow_pack_membership() {
        let mut learning = OutcomeLearning::new();
        learning.record(Some("saas"), None, Outcome::Accepted);
        learning.record(Some("gaming"), None, Outcome::Rejected);
        learning.record(None, None, Outcome::Rejected);
        assert_eq!(learning.segment(PromotionSegment::CoreIcp).accepted, 1);
        assert_eq!(learning.segment(PromotionSegment::Broad).rejected, 2);
        assert_eq!(learning.summary().total_outcomes, 3);
    }

    #[tokio::test]
    async fn collects_across_roots() {
        let store = MemoryProjectStore::new();
        for (url, outcome) in [
            ("https://a.io", Outcome::Accepted),
            ("https://b.io", Outcome::Rejected),
        ] {
            let root = ProjectRoot::new(url, "owner").unwrap();
            let mut file = VersionsFile::new(root);
            file.versions
                .push(version_with("j1", "saas", "product-tour", outcome));
            file.versions
                .push(ProjectVersion::queued("j2", 2, GenerationMode::Rerender));
            store.write_versions(&file).await.unwrap();
        }

        let learning = collect_outcome_learning(&store).await.unwrap();
        let bucket = learning.by_pack["saas"];
        assert_eq!((bucket.accepted, bucket.rejected), (1, 1));
        assert_eq!(learning.by_pair["saas|product-tour"].total(), 2);
        assert_eq!(learning.total_outcomes(), 2);
    }
}
