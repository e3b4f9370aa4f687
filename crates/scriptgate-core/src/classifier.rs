//! Domain classifier: picks the content pack for a scraped site.
//!
//! Scoring is a weighted multi-field keyword hit count. A keyword found as a
//! whole word/phrase in the domain scores ×4, title ×3, description, headings
//! and feature texts ×2 each, links ×1.5 and body ×1, each scaled by the
//! keyword's own weight. Matched negative keywords subtract a flat penalty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::text::contains_whole;
use crate::domain::ScrapedData;
use crate::packs::{builtin_packs, find_pack, general_pack, DomainPack};

const DOMAIN_WEIGHT: f64 = 4.0;
const TITLE_WEIGHT: f64 = 3.0;
const SECTION_WEIGHT: f64 = 2.0;
const LINK_WEIGHT: f64 = 1.5;
const BODY_WEIGHT: f64 = 1.0;
const NEGATIVE_PENALTY: f64 = 2.5;

const MIN_BEST_SCORE: f64 = 5.0;
const MIN_CONFIDENCE: f64 = 0.4;
const MIN_GAP: f64 = 1.5;
const DECISIVE_CONFIDENCE: f64 = 0.62;
const STRENGTH_SCALE: f64 = 18.0;

/// Why a pack was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    ExplicitOverride,
    KeywordMatch,
    FallbackLowScore,
    FallbackLowConfidence,
    FallbackAmbiguous,
}

/// A ranked pack candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackCandidate {
    pub pack_id: String,
    pub score: f64,
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainPackSelection {
    pub pack: DomainPack,
    pub reason: SelectionReason,
    /// Score per non-general pack.
    pub scores: BTreeMap<String, f64>,
    pub confidence: f64,
    pub top_candidates: Vec<PackCandidate>,
}

struct Fields {
    domain: String,
    title: String,
    description: String,
    headings: String,
    features: String,
    links: String,
    body: String,
}

impl Fields {
    fn from_scraped(scraped: &ScrapedData) -> Self {
        Self {
            domain: scraped.domain_tokens().join(" "),
            title: scraped.title.clone(),
            description: scraped.description.clone(),
            headings: scraped.headings.join(" \n "),
            features: scraped.feature_texts.join(" \n "),
            links: scraped.link_text(),
            body: scraped.body_text.clone(),
        }
    }

    fn weighted(&self) -> [(&str, f64); 7] {
        [
            (self.domain.as_str(), DOMAIN_WEIGHT),
            (self.title.as_str(), TITLE_WEIGHT),
            (self.description.as_str(), SECTION_WEIGHT),
            (self.headings.as_str(), SECTION_WEIGHT),
            (self.features.as_str(), SECTION_WEIGHT),
            (self.links.as_str(), LINK_WEIGHT),
            (self.body.as_str(), BODY_WEIGHT),
        ]
    }
}

fn score_pack(pack: &DomainPack, fields: &Fields) -> f64 {
    let weighted = fields.weighted();
    let mut score = 0.0;
    for keyword in &pack.keywords {
        for (text, weight) in &weighted {
            if contains_whole(text, &keyword.term) {
                score += weight * keyword.weight;
            }
        }
    }
    for negative in &pack.negative_keywords {
        if weighted.iter().any(|(text, _)| contains_whole(text, negative)) {
            score -= NEGATIVE_PENALTY;
        }
    }
    score.max(0.0)
}

/// Select the domain pack for `scraped`.
///
/// A known `override_id` always wins with confidence 1. Deterministic: ties
/// are broken by pack id.
pub fn select_domain_pack(scraped: &ScrapedData, override_id: Option<&str>) -> DomainPackSelection {
    let fields = Fields::from_scraped(scraped);
    let scores: BTreeMap<String, f64> = builtin_packs()
        .iter()
        .filter(|p| !p.is_general())
        .map(|p| (p.id.clone(), score_pack(p, &fields)))
        .collect();

    let mut ranked: Vec<PackCandidate> = scores
        .iter()
        .map(|(id, score)| PackCandidate {
            pack_id: id.clone(),
            score: *score,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.pack_id.cmp(&b.pack_id))
    });
    let top_candidates: Vec<PackCandidate> =
        ranked.iter().filter(|c| c.score > 0.0).take(3).cloned().collect();

    if let Some(id) = override_id {
        match find_pack(id) {
            Some(pack) => {
                return DomainPackSelection {
                    pack: pack.clone(),
                    reason: SelectionReason::ExplicitOverride,
                    scores,
                    confidence: 1.0,
                    top_candidates,
                };
            }
            None => warn!(pack_id = %id, "unknown pack override ignored"),
        }
    }

    let best = ranked.first().map(|c| c.score).unwrap_or(0.0);
    let runner_up = ranked.get(1).map(|c| c.score).unwrap_or(0.0);
    let gap = best - runner_up;
    let strength = (best / STRENGTH_SCALE).min(1.0);
    let separation = gap / best.max(1.0);
    let confidence = (0.55 * strength + 0.45 * separation).clamp(0.0, 1.0);

    let reason = if best < MIN_BEST_SCORE {
        SelectionReason::FallbackLowScore
    } else if confidence < MIN_CONFIDENCE {
        SelectionReason::FallbackLowConfidence
    } else if gap < MIN_GAP && confidence < DECISIVE_CONFIDENCE {
        SelectionReason::FallbackAmbiguous
    } else {
        SelectionReason::KeywordMatch
    };

    let pack = match (reason, ranked.first()) {
        (SelectionReason::KeywordMatch, Some(top)) => {
            find_pack(&top.pack_id).unwrap_or_else(general_pack)
        }
        _ => general_pack(),
    };

    debug!(
        pack_id = %pack.id,
        best,
        gap,
        confidence,
        reason = ?reason,
        "domain pack selected"
    );

    DomainPackSelection {
        pack: pack.clone(),
        reason,
        scores,
        confidence,
        top_candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaming_site() -> ScrapedData {
        ScrapedData {
            title: "OP.GG - LoL Stats, Champion Builds, Tier List".into(),
            description: "Ranked stats and win rate for every champion".into(),
            headings: vec!["Champion Tier List".into(), "Esports Schedule".into()],
            body_text: "Search summoners, track ranked games and leaderboard positions.".into(),
            domain: "op.gg".into(),
            ..Default::default()
        }
    }

    #[test]
    fn gaming_site_selects_gaming() {
        let sel = select_domain_pack(&gaming_site(), None);
        assert_eq!(sel.pack.id, "gaming");
        assert_eq!(sel.reason, SelectionReason::KeywordMatch);
        assert!(sel.confidence >= 0.4);
        assert_eq!(sel.top_candidates[0].pack_id, "gaming");
    }

    #[test]
    fn empty_site_falls_back_to_general() {
        let sel = select_domain_pack(&ScrapedData::default(), None);
        assert!(sel.pack.is_general());
        assert_eq!(sel.reason, SelectionReason::FallbackLowScore);
        assert!(sel.top_candidates.is_empty());
    }

    #[test]
    fn generic_platform_word_cannot_win_alone() {
        let scraped = ScrapedData {
            title: "The platform".into(),
            description: "A platform for everyone".into(),
            ..Default::default()
        };
        let sel = select_domain_pack(&scraped, None);
        assert!(sel.pack.is_general());
    }

    #[test]
    fn override_wins_with_full_confidence() {
        let sel = select_domain_pack(&gaming_site(), Some("fintech"));
        assert_eq!(sel.pack.id, "fintech");
        assert_eq!(sel.confidence, 1.0);
        assert_eq!(sel.reason, SelectionReason::ExplicitOverride);
    }

    #[test]
    fn unknown_override_is_ignored() {
        let sel = select_domain_pack(&gaming_site(), Some("nonsense"));
        assert_eq!(sel.pack.id, "gaming");
    }

    #[test]
    fn negative_keywords_reduce_score() {
        let mut scraped = gaming_site();
        let before = select_domain_pack(&scraped, None).scores["gaming"];
        scraped.body_text.push_str(" Run payroll and send an invoice.");
        let after = select_domain_pack(&scraped, None).scores["gaming"];
        assert!((before - after - 5.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let a = select_domain_pack(&gaming_site(), None);
        let b = select_domain_pack(&gaming_site(), None);
        assert_eq!(a, b);
    }
}
