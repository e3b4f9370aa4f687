//! Auto-improve loop: evaluate, regenerate the weakest section, autofix,
//! rescale, evaluate again.
//!
//! The loop is bounded three ways: a step budget, a per-section attempt cap
//! and a stall detector. Every exit carries a [`StopReason`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::autofix::autofix_script;
use crate::classifier::select_domain_pack;
use crate::domain::script::{feature_segment, HOOK_LINES};
use crate::domain::text::{contains_whole, has_digit, word_count};
use crate::domain::{ScrapedData, ScriptResult, Section, TemplateProfile};
use crate::grounding::extract_grounding_hints;
use crate::metrics::METRICS;
use crate::obs;
use crate::packs::pack_or_general;
use crate::quality::{
    evaluate_script_quality, QualityConfig, QualityReport, MAX_HOOK_WORDS, MIN_DEMO_WORDS,
    MIN_HOOK_WORDS,
};
use crate::regenerate::{recompute_scene_weights, regenerate_section, rescale_scene_weights};

const BLOCKER_POINTS: f64 = 12.0;
const WARNING_POINTS: f64 = 6.0;
const STRUCTURAL_POINTS: f64 = 6.0;
const MISSING_CTA_POINTS: f64 = 12.0;
const CROSS_REFERENCE_POINTS: f64 = 4.0;
const HIGH_IMPACT: f64 = 18.0;
const MEDIUM_IMPACT: f64 = 10.0;
const MIN_SCORE_GAIN: f64 = 0.5;
const STALL_LIMIT: usize = 2;
pub const MAX_STEPS_CEILING: usize = 12;

static FEATURE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfeature ([1-3])\b").expect("valid regex"));

/// Message keyword → sections it implicates. First match wins; an explicit
/// "feature N" mention takes precedence over the table.
const SECTION_KEYWORDS: &[(&str, &[Section])] = &[
    ("exactly 3 features", &Section::FEATURES),
    ("exactly 8 segments", &Section::ALL),
    ("narration word count", &Section::ALL),
    ("hook", &[Section::Hook]),
    ("wordmark", &[Section::Hook]),
    ("brand name", &[Section::Hook]),
    ("tagline", &[Section::Hook]),
    ("cta", &[Section::Cta]),
    ("call to action", &[Section::Cta]),
    ("integration", &[Section::Cta]),
];

/// Hype phrasing that marks a hook as generic.
const HYPE_PHRASES: &[&str] = &[
    "revolutionize",
    "revolutionary",
    "next level",
    "game changer",
    "supercharge",
    "unleash",
    "world class",
    "cutting edge",
    "seamless",
    "like never before",
];

/// Sections a report message can be attributed to.
pub fn sections_for_message(message: &str) -> Vec<Section> {
    if let Some(section) = FEATURE_MENTION
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .and_then(|n| Section::from_feature_index(n - 1))
    {
        return vec![section];
    }
    let lower = message.to_lowercase();
    SECTION_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, sections)| sections.to_vec())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    fn from_score(score: f64) -> Self {
        if score >= HIGH_IMPACT {
            Self::High
        } else if score >= MEDIUM_IMPACT {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// One ranked section recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecommendation {
    pub section: Section,
    pub score: f64,
    pub confidence: f64,
    pub impact: Impact,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImprovementPlan {
    /// Highest priority first.
    pub recommendations: Vec<SectionRecommendation>,
}

impl ImprovementPlan {
    pub fn top(&self) -> Option<&SectionRecommendation> {
        self.recommendations.first()
    }
}

#[derive(Default)]
struct Tally(BTreeMap<Section, (f64, Vec<String>)>);

impl Tally {
    fn add(&mut self, section: Section, points: f64, reason: impl Into<String>) {
        let entry = self.0.entry(section).or_insert((0.0, Vec::new()));
        entry.0 += points;
        entry.1.push(reason.into());
    }
}

fn structural_checks(script: &ScriptResult, tally: &mut Tally) {
    if script.hook.len() != HOOK_LINES
        || script
            .hook
            .iter()
            .any(|l| !(MIN_HOOK_WORDS..=MAX_HOOK_WORDS).contains(&word_count(l)))
    {
        tally.add(Section::Hook, STRUCTURAL_POINTS, "hook lines outside 2-4 words");
    }
    let opening = script
        .hook
        .iter()
        .map(String::as_str)
        .chain(script.narration_segments.iter().take(HOOK_LINES).map(String::as_str));
    let hype = opening
        .flat_map(|text| HYPE_PHRASES.iter().filter(move |h| contains_whole(text, h)))
        .next();
    if let Some(phrase) = hype {
        tally.add(
            Section::Hook,
            STRUCTURAL_POINTS,
            format!("generic hype phrasing '{phrase}'"),
        );
    }
    if script.cta_url.trim().is_empty() {
        tally.add(Section::Cta, MISSING_CTA_POINTS, "missing CTA URL");
    }

    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, f) in script.features.iter().enumerate() {
        let key = f.app_name.trim().to_lowercase();
        if !key.is_empty() {
            by_name.entry(key).or_default().push(i);
        }
    }
    let mut duplicated: Vec<usize> = by_name
        .values()
        .filter(|idx| idx.len() > 1)
        .flatten()
        .copied()
        .collect();
    duplicated.sort_unstable();
    for i in duplicated {
        if let Some(section) = Section::from_feature_index(i) {
            tally.add(section, STRUCTURAL_POINTS, "duplicate feature name");
        }
    }

    for (i, f) in script.features.iter().enumerate() {
        let Some(section) = Section::from_feature_index(i) else {
            continue;
        };
        let demo = f.demo_text();
        if word_count(&demo) < MIN_DEMO_WORDS || !has_digit(&demo) {
            tally.add(section, STRUCTURAL_POINTS, "thin or non-numeric demo lines");
        }
        let narration = script.segment(feature_segment(i));
        if f.app_name.trim().is_empty() || !contains_whole(narration, &f.app_name) {
            tally.add(section, CROSS_REFERENCE_POINTS, "narration does not name the feature");
        }
    }
}

/// Rank sections by how much the report and the script's structure
/// implicate them.
pub fn build_improvement_plan(script: &ScriptResult, report: &QualityReport) -> ImprovementPlan {
    let mut tally = Tally::default();
    for blocker in &report.blockers {
        for section in sections_for_message(blocker) {
            tally.add(section, BLOCKER_POINTS, blocker.clone());
        }
    }
    for warning in &report.warnings {
        for section in sections_for_message(warning) {
            tally.add(section, WARNING_POINTS, warning.clone());
        }
    }
    structural_checks(script, &mut tally);

    let max = tally.0.values().map(|(s, _)| *s).fold(0.0_f64, f64::max);
    let mut recommendations: Vec<SectionRecommendation> = tally
        .0
        .into_iter()
        .filter(|(_, (score, _))| *score > 0.0)
        .map(|(section, (score, reasons))| SectionRecommendation {
            section,
            score,
            confidence: if max > 0.0 { score / max } else { 0.0 },
            impact: Impact::from_score(score),
            reasons,
        })
        .collect();
    // BTreeMap order is section order, and the sort is stable.
    recommendations.sort_by(|a, b| b.score.total_cmp(&a.score));
    ImprovementPlan { recommendations }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    AlreadyMeetsTarget,
    TargetReached,
    StalledNoImprovement,
    SectionsExhausted,
    MaxStepsReached,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyMeetsTarget => "already-meets-target",
            Self::TargetReached => "target-reached",
            Self::StalledNoImprovement => "stalled-no-improvement",
            Self::SectionsExhausted => "sections-exhausted",
            Self::MaxStepsReached => "max-steps-reached",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::AlreadyMeetsTarget | Self::TargetReached)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loop knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImproveOptions {
    pub target_score: f64,
    pub max_warnings: usize,
    /// Clamped to `1..=12`.
    pub max_steps: usize,
    pub max_attempts_per_section: usize,
    pub autofix: bool,
    /// Enqueue a rerender when the goal is met (see `jobs::improve_and_queue`).
    pub queue_rerender: bool,
    pub auto_promote_if_winner: bool,
    pub pack_override: Option<String>,
    #[serde(skip)]
    pub template: Option<TemplateProfile>,
    #[serde(skip)]
    pub quality: QualityConfig,
}

impl Default for ImproveOptions {
    fn default() -> Self {
        let quality = QualityConfig::default();
        Self {
            target_score: quality.min_score,
            max_warnings: quality.max_warnings,
            max_steps: 4,
            max_attempts_per_section: 2,
            autofix: true,
            queue_rerender: false,
            auto_promote_if_winner: true,
            pack_override: None,
            template: None,
            quality,
        }
    }
}

impl ImproveOptions {
    pub fn effective_max_steps(&self) -> usize {
        self.max_steps.clamp(1, MAX_STEPS_CEILING)
    }

    fn goal_met(&self, report: &QualityReport) -> bool {
        report.blockers.is_empty()
            && report.score >= self.target_score
            && report.warnings.len() <= self.max_warnings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImproveStep {
    pub step: usize,
    pub section: Section,
    pub actions: Vec<String>,
    pub score_before: f64,
    pub score_after: f64,
    pub improved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoImproveOutcome {
    pub script: ScriptResult,
    pub pack_id: String,
    pub initial_report: QualityReport,
    pub final_report: QualityReport,
    pub steps: Vec<ImproveStep>,
    pub stop_reason: StopReason,
    /// Set by `jobs::improve_and_queue` when a rerender was enqueued.
    pub queued_version: Option<u32>,
}

impl AutoImproveOutcome {
    pub fn succeeded(&self) -> bool {
        self.stop_reason.is_success()
    }
}

fn strictly_improved(before: &QualityReport, after: &QualityReport) -> bool {
    after.blockers.len() < before.blockers.len()
        || after.warnings.len() < before.warnings.len()
        || after.score > before.score + MIN_SCORE_GAIN
        || (after.passed && !before.passed)
}

/// Run the bounded improvement loop on `script`.
pub fn run_auto_improve(
    script: &ScriptResult,
    scraped: &ScrapedData,
    options: &ImproveOptions,
) -> AutoImproveOutcome {
    let selection = select_domain_pack(scraped, options.pack_override.as_deref());
    let pack = pack_or_general(Some(&selection.pack.id));
    let hints = extract_grounding_hints(scraped);
    let evaluate = |s: &ScriptResult| {
        METRICS.inc_scripts_scored();
        evaluate_script_quality(s, scraped, pack, &options.quality)
    };

    let initial_report = evaluate(script);
    let mut current = script.clone();
    let mut report = initial_report.clone();
    let mut steps: Vec<ImproveStep> = Vec::new();
    let mut attempts: HashMap<Section, usize> = HashMap::new();
    let mut stalled = 0usize;

    let stop_reason = if options.goal_met(&report) {
        StopReason::AlreadyMeetsTarget
    } else {
        let mut reason = StopReason::MaxStepsReached;
        for step in 1..=options.effective_max_steps() {
            let plan = build_improvement_plan(&current, &report);
            let next = plan.recommendations.iter().find(|r| {
                attempts.get(&r.section).copied().unwrap_or(0) < options.max_attempts_per_section
            });
            let Some(section) = next.map(|r| r.section) else {
                reason = StopReason::SectionsExhausted;
                break;
            };
            *attempts.entry(section).or_insert(0) += 1;

            let regenerated = regenerate_section(&current, section, &hints, pack, scraped);
            METRICS.inc_sections_regenerated();
            let mut candidate = regenerated.script;
            let mut actions = regenerated.actions;
            if options.autofix {
                let fixed = autofix_script(&candidate, &hints, pack, scraped);
                METRICS.add_autofix_actions(fixed.actions.len() as u64);
                candidate = fixed.script;
                actions.extend(fixed.actions);
            }
            candidate = match &options.template {
                Some(template) => rescale_scene_weights(&candidate, template),
                None => {
                    candidate.scene_weights = Some(recompute_scene_weights(&candidate));
                    candidate
                }
            };

            let candidate_report = evaluate(&candidate);
            let improved = strictly_improved(&report, &candidate_report);
            obs::emit_improve_step(
                step,
                section.as_str(),
                report.score,
                candidate_report.score,
                improved,
            );
            steps.push(ImproveStep {
                step,
                section,
                actions,
                score_before: report.score,
                score_after: candidate_report.score,
                improved,
            });

            // Keep the candidate unless it is a regression.
            if improved || candidate_report.score >= report.score {
                current = candidate;
                report = candidate_report;
            }

            if options.goal_met(&report) {
                reason = StopReason::TargetReached;
                break;
            }
            if improved {
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= STALL_LIMIT {
                    reason = StopReason::StalledNoImprovement;
                    break;
                }
            }
        }
        reason
    };

    obs::emit_improve_stopped(
        stop_reason.as_str(),
        steps.len(),
        initial_report.score,
        report.score,
    );

    AutoImproveOutcome {
        script: current,
        pack_id: pack.id.clone(),
        initial_report,
        final_report: report,
        steps,
        stop_reason,
        queued_version: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_scraped, sample_script};
    use crate::packs::find_pack;

    fn saas_options() -> ImproveOptions {
        ImproveOptions {
            pack_override: Some("saas".into()),
            ..ImproveOptions::default()
        }
    }

    #[test]
    fn message_attribution() {
        assert_eq!(
            sections_for_message("Script must contain exactly 3 features (found 2)"),
            Section::FEATURES.to_vec()
        );
        assert_eq!(
            sections_for_message("Feature 2 caption exceeds 6 words"),
            vec![Section::Feature2]
        );
        assert_eq!(sections_for_message("CTA URL is missing"), vec![Section::Cta]);
        assert_eq!(
            sections_for_message("Hook line 1 has 1 words (expected 2-4)"),
            vec![Section::Hook]
        );
        assert!(sections_for_message("Script domain pack 'x' differs from active pack 'y'")
            .is_empty());
    }

    #[test]
    fn plan_ranks_blockers_first() {
        let mut script = sample_script();
        script.features[2].demo_lines.clear();
        script.hook[0] = "Go".into();
        let scraped = sample_scraped();
        let report = evaluate_script_quality(
            &script,
            &scraped,
            find_pack("saas").unwrap(),
            &QualityConfig::default(),
        );
        let plan = build_improvement_plan(&script, &report);
        let top = plan.top().unwrap();
        assert_eq!(top.section, Section::Feature3);
        assert_eq!(top.confidence, 1.0);
        assert_eq!(top.impact, Impact::High);
        assert!(plan
            .recommendations
            .iter()
            .any(|r| r.section == Section::Hook && r.confidence < 1.0));
    }

    #[test]
    fn passing_script_stops_immediately() {
        let out = run_auto_improve(&sample_script(), &sample_scraped(), &saas_options());
        assert_eq!(out.stop_reason, StopReason::AlreadyMeetsTarget);
        assert!(out.steps.is_empty());
        assert_eq!(out.script, sample_script());
    }

    #[test]
    fn broken_feature_is_repaired() {
        let mut script = sample_script();
        script.features[1].demo_lines.clear();
        script.features[1].icon = "skull".into();
        let out = run_auto_improve(&script, &sample_scraped(), &saas_options());
        assert_eq!(out.stop_reason, StopReason::TargetReached);
        assert_eq!(out.steps[0].section, Section::Feature2);
        assert!(out.final_report.blockers.is_empty());
        assert!(out.final_report.score > out.initial_report.score);
        assert!(out.succeeded());
    }

    #[test]
    fn template_pacing_outlives_later_autofix() {
        let template = TemplateProfile {
            id: "product-tour".into(),
            scene_pacing: vec![2.0, 1.5],
        };
        let options = ImproveOptions {
            template: Some(template.clone()),
            ..saas_options()
        };
        let mut script = sample_script();
        script.features[1].demo_lines.clear();
        script.features[1].icon = "skull".into();

        let out = run_auto_improve(&script, &sample_scraped(), &options);
        assert!(out.succeeded());
        let paced = rescale_scene_weights(&out.script, &template).scene_weights;
        assert_eq!(out.script.scene_weights, paced);

        let scraped = sample_scraped();
        let refixed = autofix_script(
            &out.script,
            &extract_grounding_hints(&scraped),
            find_pack("saas").unwrap(),
            &scraped,
        );
        assert_eq!(refixed.script.scene_weights, paced);
    }

    #[test]
    fn loop_is_bounded_and_respects_section_cap() {
        let options = ImproveOptions {
            target_score: 101.0,
            max_steps: 50,
            autofix: false,
            ..saas_options()
        };
        let out = run_auto_improve(&ScriptResult::default(), &ScrapedData::default(), &options);
        assert!(out.steps.len() <= MAX_STEPS_CEILING);
        let mut counts: HashMap<Section, usize> = HashMap::new();
        for step in &out.steps {
            *counts.entry(step.section).or_insert(0) += 1;
        }
        assert!(counts.values().all(|c| *c <= 2));
        assert!(!out.succeeded());
    }

    #[test]
    fn max_steps_is_clamped() {
        let low = ImproveOptions {
            max_steps: 0,
            ..ImproveOptions::default()
        };
        assert_eq!(low.effective_max_steps(), 1);
        let high = ImproveOptions {
            max_steps: 99,
            ..ImproveOptions::default()
        };
        assert_eq!(high.effective_max_steps(), 12);
    }

    #[test]
    fn stop_reasons_serialize_kebab() {
        let json = serde_json::to_string(&StopReason::StalledNoImprovement).unwrap();
        assert_eq!(json, "\"stalled-no-improvement\"");
        assert_eq!(StopReason::SectionsExhausted.to_string(), "sections-exhausted");
    }
}
