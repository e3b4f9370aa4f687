//! Section regenerator: rebuilds one script section from grounding evidence.
//!
//! Regeneration is deterministic. The same script, section and hints always
//! produce the same output, so the improve loop's per-section attempt cap is
//! what prevents it from repeating itself.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::script::{feature_segment, CTA_SEGMENT, SEGMENT_COUNT, WORDMARK_SEGMENT};
use crate::domain::text::{
    clip_words, contains_whole, has_digit, normalize_ws, strip_trailing_punct, tokenize,
    word_count,
};
use crate::domain::{Feature, ScrapedData, ScriptResult, Section, TemplateProfile};
use crate::grounding::GroundingHints;
use crate::packs::DomainPack;

const MIN_SCENE_WEIGHT: f64 = 2.0;
const DEMO_FIELD_PAIRS: usize = 3;
const FALLBACK_VALUES: &[&str] = &["3", "12", "24", "48", "7"];

/// Short hook lines used when grounding yields too little evidence.
pub(crate) const HOOK_FALLBACKS: &[&str] = &[
    "See it in action",
    "Less busywork, more progress",
    "Start in minutes",
    "Everything in one place",
];

/// Result of regenerating one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerateSectionResult {
    pub script: ScriptResult,
    pub section: Section,
    pub actions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Text composition shared with the autofixer
// ---------------------------------------------------------------------------

/// Trimmed text ending in terminal punctuation.
pub(crate) fn sentence(text: &str) -> String {
    let text = normalize_ws(text);
    match text.chars().last() {
        None => text,
        Some(c) if c.is_alphanumeric() || c == ')' || c == '%' => format!("{text}."),
        Some(_) => text,
    }
}

/// 2–4 word hook phrase, or `None` if `text` is empty.
pub(crate) fn hook_phrase(text: &str) -> Option<String> {
    let clipped = strip_trailing_punct(&clip_words(&normalize_ws(text), 4));
    match word_count(&clipped) {
        0 => None,
        1 => Some(format!("{clipped}, simplified")),
        _ => Some(clipped),
    }
}

pub(crate) fn feature_narration(feature: &Feature) -> String {
    let name = feature.app_name.trim();
    let caption = strip_trailing_punct(&feature.caption);
    let lead = match (name.is_empty(), caption.is_empty()) {
        (false, false) => format!("{name}: {caption}."),
        (false, true) => format!("{name} keeps the details in view."),
        (true, false) => sentence(&caption),
        (true, true) => String::new(),
    };
    let detail = feature
        .demo_lines
        .iter()
        .find(|l| !l.contains(':') && word_count(l) >= 2)
        .map(|l| sentence(l));
    match detail {
        Some(detail) => normalize_ws(&format!("{lead} {detail}")),
        None => lead,
    }
}

pub(crate) fn integrations_narration(brand: &str, integrations: &[String]) -> String {
    let names: Vec<&str> = integrations.iter().map(String::as_str).take(3).collect();
    let subject = if brand.trim().is_empty() { "It" } else { brand.trim() };
    match names.as_slice() {
        [] => format!("{subject} fits the tools your team already uses."),
        [one] => format!("{subject} connects with {one} out of the box."),
        [init @ .., last] => format!(
            "{subject} connects with {} and {last} out of the box.",
            init.join(", ")
        ),
    }
}

pub(crate) fn cta_narration(brand: &str, scraped: &ScrapedData, hints: &GroundingHints) -> String {
    let host = scraped.host();
    let brand = brand.trim();
    let close = match (brand.is_empty(), host.is_empty()) {
        (false, false) => format!("Start with {brand} today at {host}."),
        (false, true) => format!("Start with {brand} today."),
        (true, false) => format!("Get started today at {host}."),
        (true, true) => "Get started today.".to_string(),
    };
    match hints.phrases.iter().find(|p| has_digit(p)) {
        Some(proof) => format!("{} {close}", sentence(proof)),
        None => close,
    }
}

pub(crate) fn wordmark_narration(hook_line: &str, brand: &str) -> String {
    let brand = brand.trim();
    if brand.is_empty() || contains_whole(hook_line, brand) {
        return sentence(hook_line);
    }
    normalize_ws(&format!("{} Meet {brand}.", sentence(hook_line)))
}

/// Narration used to backfill a missing segment.
pub(crate) fn default_segment(
    script: &ScriptResult,
    index: usize,
    hints: &GroundingHints,
    scraped: &ScrapedData,
) -> String {
    let hook = |i: usize| script.hook.get(i).map(String::as_str).unwrap_or("");
    match index {
        0 | 1 => {
            let line = hook(index);
            if line.is_empty() {
                hints
                    .phrases
                    .get(index)
                    .map(|p| sentence(p))
                    .unwrap_or_else(|| sentence(HOOK_FALLBACKS[index]))
            } else {
                sentence(line)
            }
        }
        WORDMARK_SEGMENT => wordmark_narration(hook(2), &script.brand_name),
        3..=5 => script
            .features
            .get(index - 3)
            .map(feature_narration)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| sentence(HOOK_FALLBACKS[index - 3])),
        CTA_SEGMENT => cta_narration(&script.brand_name, scraped, hints),
        _ => integrations_narration(&script.brand_name, &script.integrations),
    }
}

/// `"<Field>: <value>"` demo line for the `k`th concrete pair of a feature.
pub(crate) fn field_line(
    pack: &DomainPack,
    hints: &GroundingHints,
    feature: usize,
    k: usize,
) -> String {
    let field = pack
        .concrete_fields
        .get((feature + k) % pack.concrete_fields.len().max(1))
        .map(String::as_str)
        .unwrap_or("Status");
    let slot = feature * DEMO_FIELD_PAIRS + k;
    let value = if hints.numbers.is_empty() {
        FALLBACK_VALUES[slot % FALLBACK_VALUES.len()].to_string()
    } else {
        hints.numbers[slot % hints.numbers.len()].clone()
    };
    format!("{field}: {value}")
}

// ---------------------------------------------------------------------------
// Scene weights
// ---------------------------------------------------------------------------

/// `max(2, word_count(segment))` per narration segment.
pub fn recompute_scene_weights(script: &ScriptResult) -> Vec<f64> {
    script
        .narration_segments
        .iter()
        .map(|s| (word_count(s) as f64).max(MIN_SCENE_WEIGHT))
        .collect()
}

/// Scene weights scaled by the template's per-scene pacing.
pub fn rescale_scene_weights(script: &ScriptResult, template: &TemplateProfile) -> ScriptResult {
    let mut next = script.clone();
    let weights = recompute_scene_weights(script)
        .into_iter()
        .enumerate()
        .map(|(i, w)| ((w * template.pacing(i)) * 100.0).round() / 100.0)
        .collect();
    next.scene_weights = Some(weights);
    if !template.id.is_empty() {
        next.template_id = Some(template.id.clone());
    }
    next
}

// ---------------------------------------------------------------------------
// Regeneration
// ---------------------------------------------------------------------------

fn ensure_narration(script: &mut ScriptResult) {
    if script.narration_segments.len() < SEGMENT_COUNT {
        script.narration_segments.resize(SEGMENT_COUNT, String::new());
    }
}

fn regenerate_hook(script: &mut ScriptResult, hints: &GroundingHints, actions: &mut Vec<String>) {
    let current: Vec<String> = script.hook.iter().map(|h| h.to_lowercase()).collect();
    let mut lines: Vec<String> = Vec::with_capacity(3);
    for candidate in hints
        .evidence()
        .iter()
        .filter_map(|e| hook_phrase(e))
        .chain(HOOK_FALLBACKS.iter().map(|f| f.to_string()))
    {
        let key = candidate.to_lowercase();
        if current.contains(&key) || lines.iter().any(|l| l.to_lowercase() == key) {
            continue;
        }
        lines.push(candidate);
        if lines.len() == 3 {
            break;
        }
    }
    // Every fallback may already be in use; keep the old lines to fill.
    for old in &script.hook {
        if lines.len() == 3 {
            break;
        }
        lines.push(old.clone());
    }
    script.hook = lines;
    actions.push(format!("Regenerated hook lines: {}", script.hook.join(" / ")));

    ensure_narration(script);
    let support: Vec<String> = hints
        .phrases
        .iter()
        .filter(|p| !script.hook.iter().any(|h| h.eq_ignore_ascii_case(p)))
        .take(2)
        .cloned()
        .collect();
    for i in 0..2 {
        let hook = script.hook.get(i).cloned().unwrap_or_default();
        script.narration_segments[i] = match support.get(i) {
            Some(p) => normalize_ws(&format!("{} {}", sentence(&hook), sentence(p))),
            None => sentence(&hook),
        };
    }
    let third = script.hook.get(2).cloned().unwrap_or_default();
    script.narration_segments[WORDMARK_SEGMENT] = wordmark_narration(&third, &script.brand_name);
    actions.push("Rewrote hook narration segments 1-3".to_string());
}

/// `"Team Dashboard: see every project"` → `"See every project"`.
fn without_name_prefix(phrase: &str, name: &str) -> String {
    let lower = phrase.to_lowercase();
    let name = name.to_lowercase();
    match lower.strip_prefix(&name) {
        Some(rest) if rest.starts_with([':', '-', ' ']) => {
            let rest = phrase
                .get(name.len()..)
                .unwrap_or("")
                .trim_start_matches([':', '-', ' ']);
            let mut chars = rest.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        _ => phrase.to_string(),
    }
}

fn regenerate_feature(
    script: &mut ScriptResult,
    index: usize,
    hints: &GroundingHints,
    pack: &DomainPack,
    actions: &mut Vec<String>,
) {
    if script.features.len() <= index {
        script.features.resize(index + 1, Feature::default());
    }
    let others: Vec<String> = script
        .features
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, f)| f.app_name.trim().to_lowercase())
        .collect();

    let available: Vec<String> = hints
        .evidence()
        .into_iter()
        .filter(|e| (1..=4).contains(&word_count(e)))
        .filter(|e| !others.contains(&e.to_lowercase()))
        .collect();
    let field_name = pack
        .concrete_fields
        .get(index % pack.concrete_fields.len().max(1))
        .cloned()
        .unwrap_or_else(|| "Status".to_string());
    let app_name = available
        .first()
        .cloned()
        .unwrap_or_else(|| format!("{field_name} View"));

    let name_tokens: Vec<String> = tokenize(&app_name).into_iter().filter(|t| t.len() >= 3).collect();
    let related = hints
        .phrases
        .iter()
        .filter(|p| !p.eq_ignore_ascii_case(&app_name))
        .find(|p| name_tokens.iter().any(|t| contains_whole(p, t)));
    let phrase = related
        .or_else(|| {
            let pool: Vec<&String> = hints
                .phrases
                .iter()
                .filter(|p| !p.eq_ignore_ascii_case(&app_name))
                .collect();
            pool.get(index % pool.len().max(1)).copied()
        })
        .cloned();
    let caption = phrase
        .as_deref()
        .map(|p| strip_trailing_punct(&clip_words(&without_name_prefix(p, &app_name), 6)))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format!("{app_name} at a glance"));

    let feature = &mut script.features[index];
    if !pack.allows_icon(&feature.icon) {
        feature.icon = pack.first_icon().to_string();
    }
    feature.app_name = app_name;
    feature.caption = caption;
    let mut demo = Vec::with_capacity(DEMO_FIELD_PAIRS + 1);
    if let Some(p) = &phrase {
        demo.push(p.clone());
    }
    for k in 0..DEMO_FIELD_PAIRS {
        demo.push(field_line(pack, hints, index, k));
    }
    feature.demo_lines = demo;
    actions.push(format!(
        "Regenerated feature {} as '{}'",
        index + 1,
        feature.app_name
    ));

    let narration = feature_narration(feature);
    ensure_narration(script);
    script.narration_segments[feature_segment(index)] = narration;
    actions.push(format!(
        "Rewrote narration segment {}",
        feature_segment(index) + 1
    ));
}

fn regenerate_cta(
    script: &mut ScriptResult,
    hints: &GroundingHints,
    scraped: &ScrapedData,
    actions: &mut Vec<String>,
) {
    let url = scraped.cta_url();
    if !url.is_empty() {
        script.cta_url = url;
        actions.push(format!("Reset CTA URL to {}", script.cta_url));
    }
    ensure_narration(script);
    script.narration_segments[CTA_SEGMENT] = cta_narration(&script.brand_name, scraped, hints);
    actions.push("Rewrote CTA narration".to_string());
}

/// Rebuild `section` of `script` from grounding evidence. Never mutates the
/// input.
pub fn regenerate_section(
    script: &ScriptResult,
    section: Section,
    hints: &GroundingHints,
    pack: &DomainPack,
    scraped: &ScrapedData,
) -> RegenerateSectionResult {
    let mut next = script.clone();
    let mut actions = Vec::new();

    match section {
        Section::Hook => regenerate_hook(&mut next, hints, &mut actions),
        Section::Cta => regenerate_cta(&mut next, hints, scraped, &mut actions),
        feature => {
            if let Some(index) = feature.feature_index() {
                regenerate_feature(&mut next, index, hints, pack, &mut actions);
            }
        }
    }
    next.scene_weights = Some(recompute_scene_weights(&next));

    debug!(section = %section, actions = actions.len(), "section regenerated");

    RegenerateSectionResult {
        script: next,
        section,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_scraped, sample_script};
    use crate::grounding::extract_grounding_hints;
    use crate::packs::find_pack;

    fn regen(script: &ScriptResult, section: Section) -> RegenerateSectionResult {
        let scraped = sample_scraped();
        let hints = extract_grounding_hints(&scraped);
        regenerate_section(script, section, &hints, find_pack("saas").unwrap(), &scraped)
    }

    #[test]
    fn hook_lines_are_short_and_fresh() {
        let script = sample_script();
        let out = regen(&script, Section::Hook);
        assert_eq!(out.script.hook.len(), 3);
        for line in &out.script.hook {
            let n = word_count(line);
            assert!((2..=4).contains(&n), "{line}");
            assert!(!script.hook.contains(line));
        }
        assert!(contains_whole(&out.script.narration_segments[2], "Acme Flow"));
        assert_eq!(out.script.features, script.features);
    }

    #[test]
    fn feature_regeneration_is_grounded_and_concrete() {
        let mut script = sample_script();
        script.features[1].icon = "skull".into();
        script.features[1].demo_lines.clear();
        let out = regen(&script, Section::Feature2);
        let f = &out.script.features[1];
        assert_eq!(f.icon, "chart");
        assert!(word_count(&f.caption) <= 6);
        assert!(f.demo_lines.len() >= 3);
        assert!(f.demo_lines.iter().filter(|l| l.contains(": ")).count() >= 3);
        assert_ne!(f.app_name.to_lowercase(), out.script.features[0].app_name.to_lowercase());
        assert!(contains_whole(&out.script.narration_segments[4], &f.app_name));
        assert_eq!(out.script.narration_segments[3], script.narration_segments[3]);
    }

    #[test]
    fn missing_feature_is_created() {
        let mut script = sample_script();
        script.features.truncate(2);
        let out = regen(&script, Section::Feature3);
        assert_eq!(out.script.features.len(), 3);
        assert!(!out.script.features[2].app_name.is_empty());
    }

    #[test]
    fn cta_resets_url_and_segment() {
        let mut script = sample_script();
        script.cta_url = "https://elsewhere.net".into();
        let out = regen(&script, Section::Cta);
        assert_eq!(out.script.cta_url, "https://acmeflow.io");
        assert!(out.script.narration_segments[7].contains("acmeflow.io"));
    }

    #[test]
    fn weights_follow_word_counts() {
        let out = regen(&sample_script(), Section::Cta);
        let weights = out.script.scene_weights.clone().unwrap();
        assert_eq!(weights.len(), 8);
        for (w, seg) in weights.iter().zip(&out.script.narration_segments) {
            assert_eq!(*w, (word_count(seg) as f64).max(2.0));
        }
    }

    #[test]
    fn template_pacing_scales_weights() {
        let template = TemplateProfile {
            id: "terminal".into(),
            scene_pacing: vec![2.0, 0.5],
        };
        let script = sample_script();
        let base = recompute_scene_weights(&script);
        let scaled = rescale_scene_weights(&script, &template);
        let weights = scaled.scene_weights.unwrap();
        assert_eq!(weights[0], base[0] * 2.0);
        assert_eq!(weights[1], base[1] * 0.5);
        assert_eq!(weights[7], base[7]);
        assert_eq!(scaled.template_id.as_deref(), Some("terminal"));
    }

    #[test]
    fn regeneration_is_deterministic() {
        let a = regen(&sample_script(), Section::Feature1);
        let b = regen(&sample_script(), Section::Feature1);
        assert_eq!(a, b);
    }
}
