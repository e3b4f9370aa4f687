//! Deterministic script quality scorer.
//!
//! The score starts at 100 and loses a configured penalty per defect.
//! Defects come in two tiers: blockers always fail the report, warnings fail
//! it only past `max_warnings` (or at all in strict mode).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::script::{
    FEATURE_COUNT, HOOK_LINES, MAX_INTEGRATIONS, MIN_INTEGRATIONS, NARRATION_MAX_WORDS,
    NARRATION_MIN_WORDS, SEGMENT_COUNT, WORDMARK_SEGMENT,
};
use crate::domain::text::{contains_whole, has_digit, host_of, tokenize, word_count};
use crate::domain::{ScrapedData, ScriptResult};
use crate::grounding::{extract_grounding_hints, grounding_coverage};
use crate::packs::DomainPack;

pub const MAX_CAPTION_WORDS: usize = 6;
pub const MIN_DEMO_WORDS: usize = 6;
pub const MIN_HOOK_WORDS: usize = 2;
pub const MAX_HOOK_WORDS: usize = 4;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\blorem\s+ipsum\b|\btbd\b|\binsert\b[^.]{0,40}?\bhere\b|\bexample\.com\b|\byour\s+brand\b",
    )
    .expect("valid regex")
});

/// Penalty per defect class. Blockers first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPenalties {
    pub feature_count: f64,
    pub narration_count: f64,
    pub missing_demo: f64,
    pub placeholder: f64,
    pub narration_length: f64,
    pub hook_length: f64,
    pub cta_domain: f64,
    pub brand_relation: f64,
    pub duplicate_app_name: f64,
    pub disallowed_icon: f64,
    pub long_caption: f64,
    pub thin_demo: f64,
    pub abstract_demo: f64,
    pub forbidden_term: f64,
    pub wordmark_brand: f64,
    pub integration_count: f64,
    pub integration_overlap: f64,
    pub pack_mismatch: f64,
}

impl Default for QualityPenalties {
    fn default() -> Self {
        Self {
            feature_count: 35.0,
            narration_count: 30.0,
            missing_demo: 20.0,
            placeholder: 25.0,
            narration_length: 8.0,
            hook_length: 4.0,
            cta_domain: 8.0,
            brand_relation: 6.0,
            duplicate_app_name: 6.0,
            disallowed_icon: 3.0,
            long_caption: 3.0,
            thin_demo: 3.0,
            abstract_demo: 3.0,
            forbidden_term: 5.0,
            wordmark_brand: 5.0,
            integration_count: 5.0,
            integration_overlap: 3.0,
            pack_mismatch: 4.0,
        }
    }
}

/// Pass bar for a quality report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_score: f64,
    pub max_warnings: usize,
    /// Strict mode: any warning fails the report.
    pub fail_on_warnings: bool,
    pub penalties: QualityPenalties,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: 75.0,
            max_warnings: 4,
            fail_on_warnings: false,
            penalties: QualityPenalties::default(),
        }
    }
}

impl QualityConfig {
    pub fn strict(mut self, strict: bool) -> Self {
        self.fail_on_warnings = strict;
        self
    }
}

/// Scorer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: f64,
    pub min_score: f64,
    pub passed: bool,
    pub blockers: Vec<String>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

impl QualityReport {
    pub fn blocker_count(&self) -> usize {
        self.blockers.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[derive(Default)]
struct Findings {
    penalty: f64,
    blockers: Vec<String>,
    warnings: Vec<String>,
}

impl Findings {
    fn blocker(&mut self, penalty: f64, message: String) {
        self.penalty += penalty;
        self.blockers.push(message);
    }

    fn warning(&mut self, penalty: f64, message: String) {
        self.penalty += penalty;
        self.warnings.push(message);
    }
}

/// Human location of a narration segment. Feeds the improvement planner's
/// section keyword table.
pub fn segment_location(index: usize) -> String {
    match index {
        0..=2 => "hook narration".to_string(),
        3..=5 => format!("feature {} narration", index - 2),
        6 => "integrations narration".to_string(),
        7 => "cta narration".to_string(),
        other => format!("narration segment {}", other + 1),
    }
}

/// Every scanned text span with its location.
fn text_locations(script: &ScriptResult) -> Vec<(String, &str)> {
    let mut spans = vec![
        ("brand name".to_string(), script.brand_name.as_str()),
        ("tagline".to_string(), script.tagline.as_str()),
        ("cta url".to_string(), script.cta_url.as_str()),
    ];
    for (i, line) in script.hook.iter().enumerate() {
        spans.push((format!("hook line {}", i + 1), line.as_str()));
    }
    for (i, f) in script.features.iter().enumerate() {
        spans.push((format!("feature {} app name", i + 1), f.app_name.as_str()));
        spans.push((format!("feature {} caption", i + 1), f.caption.as_str()));
        for line in &f.demo_lines {
            spans.push((format!("feature {} demo", i + 1), line.as_str()));
        }
    }
    for name in &script.integrations {
        spans.push(("integrations".to_string(), name.as_str()));
    }
    for (i, seg) in script.narration_segments.iter().enumerate() {
        spans.push((segment_location(i), seg.as_str()));
    }
    spans
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Brand shares a meaningful token with the title or the source domain.
fn brand_is_related(brand: &str, scraped: &ScrapedData) -> bool {
    let brand_squashed = squash(brand);
    if brand_squashed.is_empty() {
        return false;
    }
    let host = scraped.host();
    let host_label = host.split('.').next().unwrap_or("");
    if !host_label.is_empty()
        && (squash(host_label).contains(&brand_squashed)
            || brand_squashed.contains(&squash(host_label))
            || squash(&host) == brand_squashed)
    {
        return true;
    }
    let title_tokens = tokenize(&scraped.title);
    tokenize(brand)
        .iter()
        .filter(|t| t.len() >= 3)
        .any(|t| title_tokens.contains(t))
}

fn cta_matches_source(cta_url: &str, scraped: &ScrapedData) -> bool {
    let source = scraped.host();
    match host_of(cta_url) {
        Some(cta) => cta == source || cta.ends_with(&format!(".{source}")),
        None => false,
    }
}

/// Demo text carries a digit or one of the pack's concrete field names.
pub fn has_concrete_signal(text: &str, pack: &DomainPack) -> bool {
    has_digit(text) || pack.concrete_fields.iter().any(|f| contains_whole(text, f))
}

/// Score `script` against `scraped` under `pack`. Pure.
pub fn evaluate_script_quality(
    script: &ScriptResult,
    scraped: &ScrapedData,
    pack: &DomainPack,
    config: &QualityConfig,
) -> QualityReport {
    let p = &config.penalties;
    let mut found = Findings::default();

    // -- blockers --------------------------------------------------------
    if script.features.len() != FEATURE_COUNT {
        found.blocker(
            p.feature_count,
            format!(
                "Script must contain exactly 3 features (found {})",
                script.features.len()
            ),
        );
    }
    if script.narration_segments.len() != SEGMENT_COUNT {
        found.blocker(
            p.narration_count,
            format!(
                "Narration must contain exactly 8 segments (found {})",
                script.narration_segments.len()
            ),
        );
    }
    for (i, f) in script.features.iter().enumerate() {
        if f.demo_lines.iter().all(|l| l.trim().is_empty()) {
            found.blocker(p.missing_demo, format!("Feature {} has no demo lines", i + 1));
        }
    }
    let spans = text_locations(script);
    if let Some((location, hit)) = spans.iter().find_map(|(loc, text)| {
        PLACEHOLDER_RE
            .find(text)
            .map(|m| (loc.clone(), m.as_str().to_string()))
    }) {
        found.blocker(
            p.placeholder,
            format!("Placeholder text detected: '{hit}' in {location}"),
        );
    }

    // -- warnings --------------------------------------------------------
    let words = script.narration_word_count();
    if !script.narration_segments.is_empty()
        && !(NARRATION_MIN_WORDS..=NARRATION_MAX_WORDS).contains(&words)
    {
        found.warning(
            p.narration_length,
            format!("Narration word count {words} is outside {NARRATION_MIN_WORDS}-{NARRATION_MAX_WORDS}"),
        );
    }

    if script.hook.len() != HOOK_LINES {
        found.warning(
            p.hook_length,
            format!("Hook must have 3 lines (found {})", script.hook.len()),
        );
    }
    for (i, line) in script.hook.iter().enumerate() {
        let n = word_count(line);
        if !(MIN_HOOK_WORDS..=MAX_HOOK_WORDS).contains(&n) {
            found.warning(
                p.hook_length,
                format!("Hook line {} has {n} words (expected 2-4)", i + 1),
            );
        }
    }

    if !scraped.host().is_empty() && !cta_matches_source(&script.cta_url, scraped) {
        let message = if script.cta_url.trim().is_empty() {
            "CTA URL is missing".to_string()
        } else {
            format!(
                "CTA URL '{}' does not match source domain {}",
                script.cta_url,
                scraped.host()
            )
        };
        found.warning(p.cta_domain, message);
    }

    if !brand_is_related(&script.brand_name, scraped) {
        found.warning(
            p.brand_relation,
            format!(
                "Brand name '{}' is weakly related to the site title or domain",
                script.brand_name
            ),
        );
    }

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (i, f) in script.features.iter().enumerate() {
        let key = f.app_name.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        match first_seen.get(&key) {
            Some(&first) => found.warning(
                p.duplicate_app_name,
                format!(
                    "Feature {} duplicates app name '{}' from feature {}",
                    i + 1,
                    f.app_name.trim(),
                    first + 1
                ),
            ),
            None => {
                first_seen.insert(key, i);
            }
        }
    }

    for (i, f) in script.features.iter().enumerate() {
        let n = i + 1;
        if !pack.allows_icon(&f.icon) {
            found.warning(
                p.disallowed_icon,
                format!("Feature {n} icon '{}' is not allowed for pack {}", f.icon, pack.id),
            );
        }
        if word_count(&f.caption) > MAX_CAPTION_WORDS {
            found.warning(
                p.long_caption,
                format!("Feature {n} caption exceeds {MAX_CAPTION_WORDS} words"),
            );
        }
        let demo = f.demo_text();
        if demo.trim().is_empty() {
            continue;
        }
        if word_count(&demo) < MIN_DEMO_WORDS {
            found.warning(
                p.thin_demo,
                format!("Feature {n} demo text is under {MIN_DEMO_WORDS} words"),
            );
        }
        if !has_concrete_signal(&demo, pack) {
            found.warning(
                p.abstract_demo,
                format!("Feature {n} demo text lacks a concrete number or field"),
            );
        }
    }

    for term in &pack.forbidden_terms {
        for (location, text) in &spans {
            if contains_whole(text, term) {
                found.warning(
                    p.forbidden_term,
                    format!("Forbidden term '{term}' in {location}"),
                );
            }
        }
    }

    let brand = script.brand_name.trim();
    if !brand.is_empty()
        && script.narration_segments.len() > WORDMARK_SEGMENT
        && !contains_whole(script.segment(WORDMARK_SEGMENT), brand)
    {
        found.warning(
            p.wordmark_brand,
            "Wordmark segment does not mention the brand name".to_string(),
        );
    }

    let integrations = script.integrations.len();
    if !(MIN_INTEGRATIONS..=MAX_INTEGRATIONS).contains(&integrations) {
        found.warning(
            p.integration_count,
            format!("Integration count {integrations} is outside {MIN_INTEGRATIONS}-{MAX_INTEGRATIONS}"),
        );
    }
    if !pack.fallback_integrations.is_empty()
        && integrations > 0
        && !script.integrations.iter().any(|name| {
            pack.fallback_integrations
                .iter()
                .any(|f| f.eq_ignore_ascii_case(name.trim()))
        })
    {
        found.warning(
            p.integration_overlap,
            format!("No integrations overlap the {} pack list", pack.id),
        );
    }

    if let Some(stamped) = script.domain_pack_id.as_deref() {
        if stamped != pack.id {
            found.warning(
                p.pack_mismatch,
                format!(
                    "Script domain pack '{stamped}' differs from active pack '{}'",
                    pack.id
                ),
            );
        }
    }

    // -- verdict ---------------------------------------------------------
    let score = (100.0 - found.penalty).clamp(0.0, 100.0);
    let warnings_ok = if config.fail_on_warnings {
        found.warnings.is_empty()
    } else {
        found.warnings.len() <= config.max_warnings
    };
    let passed = found.blockers.is_empty() && score >= config.min_score && warnings_ok;

    let coverage = grounding_coverage(script, &extract_grounding_hints(scraped));
    let notes = vec![
        format!("Active pack: {}", pack.id),
        format!("Narration word count: {words}"),
        format!("Grounding coverage: {:.0}%", coverage * 100.0),
    ];

    debug!(
        score,
        passed,
        blockers = found.blockers.len(),
        warnings = found.warnings.len(),
        pack_id = %pack.id,
        "script scored"
    );

    QualityReport {
        score,
        min_score: config.min_score,
        passed,
        blockers: found.blockers,
        warnings: found.warnings,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_scraped, sample_script};
    use crate::packs::find_pack;

    fn saas() -> &'static DomainPack {
        find_pack("saas").unwrap()
    }

    fn score(script: &ScriptResult) -> QualityReport {
        evaluate_script_quality(script, &sample_scraped(), saas(), &QualityConfig::default())
    }

    #[test]
    fn sample_script_passes_clean() {
        let report = score(&sample_script());
        assert_eq!(report.score, 100.0);
        assert!(report.passed, "{report:?}");
        assert!(report.blockers.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.notes[0], "Active pack: saas");
    }

    #[test]
    fn two_features_is_a_blocker() {
        let mut script = sample_script();
        script.features.pop();
        let report = score(&script);
        assert!(!report.passed);
        assert!(report.score <= 65.0);
        assert!(report
            .blockers
            .iter()
            .any(|b| b.starts_with("Script must contain exactly 3 features")));
    }

    #[test]
    fn placeholder_is_located() {
        let mut script = sample_script();
        script.features[1].caption = "Lorem ipsum dolor".into();
        let report = score(&script);
        assert_eq!(
            report.blockers,
            vec!["Placeholder text detected: 'Lorem ipsum' in feature 2 caption"]
        );
        assert_eq!(report.score, 75.0);
        assert!(!report.passed);
    }

    #[test]
    fn warnings_accumulate_penalties() {
        let mut script = sample_script();
        script.cta_url = "https://other.com".into();
        script.hook[0] = "Stuck".into();
        script.features[2].icon = "skull".into();
        let report = score(&script);
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.score, 100.0 - 8.0 - 4.0 - 3.0);
        assert!(report.passed);
    }

    #[test]
    fn strict_mode_fails_on_any_warning() {
        let mut script = sample_script();
        script.features[0].caption = "A caption that is far too long to read".into();
        let lenient = score(&script);
        assert!(lenient.passed);
        let strict = evaluate_script_quality(
            &script,
            &sample_scraped(),
            saas(),
            &QualityConfig::default().strict(true),
        );
        assert!(!strict.passed);
        assert_eq!(strict.score, lenient.score);
    }

    #[test]
    fn forbidden_terms_and_wordmark() {
        let mut script = sample_script();
        script.narration_segments[2] = "A revolutionary way to run approvals.".into();
        let report = score(&script);
        assert!(report
            .warnings
            .contains(&"Forbidden term 'revolutionary' in hook narration".to_string()));
        assert!(report
            .warnings
            .contains(&"Wordmark segment does not mention the brand name".to_string()));
    }

    #[test]
    fn pack_mismatch_and_duplicates() {
        let mut script = sample_script();
        script.domain_pack_id = Some("gaming".into());
        script.features[2].app_name = "approval workflows".into();
        let report = score(&script);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.starts_with("Feature 3 duplicates app name")));
        assert!(report.warnings.iter().any(|w| w.contains("differs from active pack")));
    }

    #[test]
    fn score_never_goes_negative() {
        let report = score(&ScriptResult::default());
        assert_eq!(report.score.max(0.0), report.score);
        assert!(!report.passed);
    }

    #[test]
    fn scoring_does_not_mutate_and_is_deterministic() {
        let script = sample_script();
        let before = script.clone();
        let a = score(&script);
        let b = score(&script);
        assert_eq!(script, before);
        assert_eq!(a, b);
    }
}
