//! Rule-based autofixer.
//!
//! Rules mirror the scorer's defect classes and run in a fixed order on a
//! clone of the input. A pass is not guaranteed to produce a passing script,
//! but running it again on its own output reports no further actions for
//! defect classes it already repaired.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::script::{
    feature_segment, FEATURE_COUNT, HOOK_LINES, MAX_INTEGRATIONS, MIN_INTEGRATIONS,
    NARRATION_MAX_WORDS, NARRATION_MIN_WORDS, SEGMENT_COUNT, WORDMARK_SEGMENT,
};
use crate::domain::text::{
    clip_words, contains_whole, host_of, normalize_ws, strip_trailing_punct, tokenize, word_count,
};
use crate::domain::{Feature, ScrapedData, ScriptResult};
use crate::grounding::{canonical_integration, GroundingHints};
use crate::packs::DomainPack;
use crate::quality::{
    has_concrete_signal, MAX_CAPTION_WORDS, MAX_HOOK_WORDS, MIN_DEMO_WORDS, MIN_HOOK_WORDS,
};
use crate::regenerate::{
    default_segment, field_line, hook_phrase, recompute_scene_weights, sentence, HOOK_FALLBACKS,
};

/// Replacement for forbidden terms.
pub const NEUTRAL_PHRASE: &str = "reliable results";

const MIN_DEMO_LINES: usize = 2;
const MIN_SEGMENT_WORDS: usize = 4;

const BOOSTERS: &[&str] = &[
    "Setup takes minutes, not weeks.",
    "Everything stays in one shared place.",
    "Every change is tracked automatically.",
    "The whole team sees the same numbers.",
];

/// Output of one autofix pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoFixResult {
    pub script: ScriptResult,
    pub actions: Vec<String>,
}

struct Ctx<'a> {
    hints: &'a GroundingHints,
    pack: &'a DomainPack,
    scraped: &'a ScrapedData,
}

// -- 1. structure ------------------------------------------------------------

fn backfill_feature(script: &ScriptResult, index: usize, ctx: &Ctx<'_>) -> Feature {
    let used: HashSet<String> = script
        .features
        .iter()
        .map(|f| f.app_name.trim().to_lowercase())
        .collect();
    let app_name = ctx
        .hints
        .evidence()
        .into_iter()
        .filter(|e| (1..=4).contains(&word_count(e)))
        .find(|e| !used.contains(&e.to_lowercase()))
        .unwrap_or_else(|| format!("Feature {}", index + 1));
    let caption = ctx
        .hints
        .phrases
        .iter()
        .find(|p| !p.eq_ignore_ascii_case(&app_name))
        .map(|p| strip_trailing_punct(&clip_words(p, MAX_CAPTION_WORDS)))
        .unwrap_or_else(|| format!("{app_name} at a glance"));
    Feature {
        icon: ctx.pack.first_icon().to_string(),
        app_name,
        caption,
        demo_lines: Vec::new(),
    }
}

fn fix_structure(script: &mut ScriptResult, ctx: &Ctx<'_>, actions: &mut Vec<String>) {
    if script.features.len() > FEATURE_COUNT {
        script.features.truncate(FEATURE_COUNT);
        actions.push("Truncated features to 3".to_string());
    }
    if script.features.len() < FEATURE_COUNT {
        let before = script.features.len();
        while script.features.len() < FEATURE_COUNT {
            let feature = backfill_feature(script, script.features.len(), ctx);
            script.features.push(feature);
        }
        actions.push(format!("Backfilled features from {before} to 3"));
    }

    if script.hook.len() > HOOK_LINES {
        script.hook.truncate(HOOK_LINES);
        actions.push("Truncated hook to 3 lines".to_string());
    }
    if script.hook.len() < HOOK_LINES {
        let mut pool = ctx
            .hints
            .evidence()
            .into_iter()
            .filter_map(|e| hook_phrase(&e))
            .chain(HOOK_FALLBACKS.iter().map(|f| f.to_string()));
        while script.hook.len() < HOOK_LINES {
            match pool.next() {
                Some(line) if !script.hook.contains(&line) => script.hook.push(line),
                Some(_) => continue,
                None => script.hook.push(HOOK_FALLBACKS[script.hook.len()].to_string()),
            }
        }
        actions.push("Backfilled hook to 3 lines".to_string());
    }

    if script.narration_segments.len() > SEGMENT_COUNT {
        script.narration_segments.truncate(SEGMENT_COUNT);
        actions.push("Truncated narration to 8 segments".to_string());
    }
    if script.narration_segments.len() < SEGMENT_COUNT {
        let before = script.narration_segments.len();
        while script.narration_segments.len() < SEGMENT_COUNT {
            let index = script.narration_segments.len();
            let text = default_segment(script, index, ctx.hints, ctx.scraped);
            script.narration_segments.push(text);
        }
        actions.push(format!("Backfilled narration from {before} to 8 segments"));
    }
}

// -- 2. CTA ------------------------------------------------------------------

fn fix_cta(script: &mut ScriptResult, ctx: &Ctx<'_>, actions: &mut Vec<String>) {
    let canonical = ctx.scraped.cta_url();
    if canonical.is_empty() {
        return;
    }
    let source = ctx.scraped.host();
    let aligned = host_of(&script.cta_url)
        .is_some_and(|h| h == source || h.ends_with(&format!(".{source}")));
    if !aligned {
        script.cta_url = canonical;
        actions.push(format!("Realigned CTA URL to {}", script.cta_url));
    }
}

// -- 3. hook -----------------------------------------------------------------

fn fix_hook(script: &mut ScriptResult, ctx: &Ctx<'_>, actions: &mut Vec<String>) {
    let mut replacements = ctx
        .hints
        .phrases
        .iter()
        .filter_map(|p| hook_phrase(p))
        .filter(|p| word_count(p) >= MIN_HOOK_WORDS)
        .chain(HOOK_FALLBACKS.iter().map(|f| f.to_string()))
        .filter(|p| !script.hook.contains(p))
        .collect::<Vec<_>>()
        .into_iter();
    for i in 0..script.hook.len() {
        let line = normalize_ws(&script.hook[i]);
        let n = word_count(&line);
        if n > MAX_HOOK_WORDS {
            script.hook[i] = clip_words(&line, MAX_HOOK_WORDS);
            actions.push(format!("Clipped hook line {} to 4 words", i + 1));
        } else if n < MIN_HOOK_WORDS {
            let replacement = replacements
                .next()
                .unwrap_or_else(|| HOOK_FALLBACKS[i % HOOK_FALLBACKS.len()].to_string());
            actions.push(format!("Replaced hook line {} with '{replacement}'", i + 1));
            script.hook[i] = replacement;
        }
    }
}

// -- 4. captions -------------------------------------------------------------

fn fit_caption(caption: &str) -> String {
    strip_trailing_punct(&clip_words(&normalize_ws(caption), MAX_CAPTION_WORDS))
}

fn fix_captions(script: &mut ScriptResult, actions: &mut Vec<String>) {
    for (i, f) in script.features.iter_mut().enumerate() {
        let fitted = fit_caption(&f.caption);
        if fitted.is_empty() && !f.app_name.trim().is_empty() {
            f.caption = fit_caption(&format!("{} at a glance", f.app_name.trim()));
            actions.push(format!("Filled empty caption for feature {}", i + 1));
        } else if fitted != f.caption {
            f.caption = fitted;
            actions.push(format!("Canonicalized caption for feature {}", i + 1));
        }
    }
}

// -- 5. demo lines -----------------------------------------------------------

fn demo_ok(feature: &Feature, pack: &DomainPack) -> bool {
    let text = feature.demo_text();
    feature.demo_lines.len() >= MIN_DEMO_LINES
        && word_count(&text) >= MIN_DEMO_WORDS
        && has_concrete_signal(&text, pack)
}

fn fix_demo_lines(script: &mut ScriptResult, ctx: &Ctx<'_>, actions: &mut Vec<String>) {
    let mut used: HashSet<String> = script
        .features
        .iter()
        .flat_map(|f| f.demo_lines.iter().map(|l| l.to_lowercase()))
        .collect();
    for (i, f) in script.features.iter_mut().enumerate() {
        let before = f.demo_lines.len();
        f.demo_lines.retain(|l| !l.trim().is_empty());
        let mut added = 0usize;
        let mut pair = 0usize;
        if !f.demo_lines.is_empty() && !has_concrete_signal(&f.demo_text(), ctx.pack) {
            f.demo_lines.push(field_line(ctx.pack, ctx.hints, i, pair));
            pair += 1;
            added += 1;
        }
        while !demo_ok(f, ctx.pack) && added < 6 {
            let grounded = ctx
                .hints
                .phrases
                .iter()
                .find(|p| !used.contains(&p.to_lowercase()))
                .cloned();
            let line = match grounded {
                Some(p)
                    if f.demo_lines.is_empty() || has_concrete_signal(&f.demo_text(), ctx.pack) =>
                {
                    p
                }
                _ => {
                    pair += 1;
                    field_line(ctx.pack, ctx.hints, i, pair - 1)
                }
            };
            used.insert(line.to_lowercase());
            f.demo_lines.push(line);
            added += 1;
        }
        if added > 0 || f.demo_lines.len() != before {
            actions.push(format!(
                "Backfilled demo lines for feature {} ({} added)",
                i + 1,
                added
            ));
        }
    }
}

// -- 6. icons ----------------------------------------------------------------

fn fix_icons(script: &mut ScriptResult, pack: &DomainPack, actions: &mut Vec<String>) {
    for (i, f) in script.features.iter_mut().enumerate() {
        if !pack.allows_icon(&f.icon) {
            let replacement = pack.first_icon().to_string();
            actions.push(format!(
                "Replaced icon '{}' with '{replacement}' on feature {}",
                f.icon,
                i + 1
            ));
            f.icon = replacement;
        }
    }
}

// -- 7. integrations ---------------------------------------------------------

fn fix_integrations(script: &mut ScriptResult, ctx: &Ctx<'_>, actions: &mut Vec<String>) {
    let original = script.integrations.clone();
    let mut seen = HashSet::new();
    let mut list: Vec<String> = script
        .integrations
        .iter()
        .map(|name| {
            canonical_integration(name)
                .map(str::to_string)
                .unwrap_or_else(|| normalize_ws(name))
        })
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect();

    let pack_list = &ctx.pack.fallback_integrations;
    for candidate in ctx.hints.integration_candidates.iter().chain(pack_list.iter()) {
        if list.len() >= MIN_INTEGRATIONS {
            break;
        }
        if seen.insert(candidate.to_lowercase()) {
            list.push(candidate.clone());
        }
    }
    list.truncate(MAX_INTEGRATIONS);

    let overlaps = |list: &[String]| {
        list.iter()
            .any(|n| pack_list.iter().any(|p| p.eq_ignore_ascii_case(n)))
    };
    if !pack_list.is_empty() && !overlaps(&list) {
        if let Some(first) = pack_list.first() {
            if list.len() >= MAX_INTEGRATIONS {
                list.pop();
            }
            list.push(first.clone());
        }
    }

    if list != original {
        actions.push(format!("Normalized integrations to {}", list.join(", ")));
        script.integrations = list;
    }
}

// -- 8. forbidden terms ------------------------------------------------------

fn forbidden_regex(term: &str) -> Option<Regex> {
    let tokens = tokenize(term);
    if tokens.is_empty() {
        return None;
    }
    let body = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join(r"[^\p{L}\p{N}]+");
    Regex::new(&format!(r"(?i)\b{body}\b")).ok()
}

fn scrub(text: &mut String, re: &Regex) -> bool {
    if re.is_match(text) {
        *text = re.replace_all(text, NEUTRAL_PHRASE).into_owned();
        true
    } else {
        false
    }
}

fn fix_forbidden_terms(script: &mut ScriptResult, pack: &DomainPack, actions: &mut Vec<String>) {
    for term in &pack.forbidden_terms {
        let Some(re) = forbidden_regex(term) else {
            continue;
        };
        let mut hits = 0usize;
        let texts = std::iter::once(&mut script.tagline)
            .chain(script.hook.iter_mut())
            .chain(script.features.iter_mut().flat_map(|f| {
                std::iter::once(&mut f.caption)
                    .chain(std::iter::once(&mut f.app_name))
                    .chain(f.demo_lines.iter_mut())
            }))
            .chain(script.narration_segments.iter_mut());
        for text in texts {
            if scrub(text, &re) {
                hits += 1;
            }
        }
        if hits > 0 {
            actions.push(format!("Replaced forbidden term '{term}' in {hits} place(s)"));
        }
        // Integration names are dropped, not rewritten.
        let before = script.integrations.len();
        script.integrations.retain(|name| !re.is_match(name));
        let dropped = before - script.integrations.len();
        if dropped > 0 {
            actions.push(format!("Dropped {dropped} integration(s) naming '{term}'"));
        }
    }
}

// -- 9. wordmark -------------------------------------------------------------

fn fix_wordmark(script: &mut ScriptResult, actions: &mut Vec<String>) {
    let brand = script.brand_name.trim().to_string();
    if brand.is_empty() || script.narration_segments.len() <= WORDMARK_SEGMENT {
        return;
    }
    let segment = &mut script.narration_segments[WORDMARK_SEGMENT];
    if !contains_whole(segment, &brand) {
        *segment = normalize_ws(&format!("Meet {brand}. {segment}"));
        actions.push("Added brand mention to wordmark segment".to_string());
    }
}

// -- 10. narration length ----------------------------------------------------

fn truncate_words(text: &str, keep: usize) -> String {
    sentence(&strip_trailing_punct(&clip_words(text, keep)))
}

fn fix_narration_length(script: &mut ScriptResult, actions: &mut Vec<String>) {
    let mut total = script.narration_word_count();
    if script.narration_segments.len() != SEGMENT_COUNT {
        return;
    }
    if total < NARRATION_MIN_WORDS {
        let before = total;
        let targets: Vec<usize> = (0..FEATURE_COUNT).map(feature_segment).chain([6]).collect();
        let mut k = 0usize;
        while total < NARRATION_MIN_WORDS {
            let seg = targets[k % targets.len()];
            let booster = BOOSTERS[k % BOOSTERS.len()];
            let segment = &mut script.narration_segments[seg];
            *segment = normalize_ws(&format!("{} {booster}", sentence(segment)));
            total += word_count(booster);
            k += 1;
        }
        actions.push(format!("Extended narration from {before} to {total} words"));
    } else if total > NARRATION_MAX_WORDS {
        let before = total;
        while total > NARRATION_MAX_WORDS {
            let largest = script
                .narration_segments
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != WORDMARK_SEGMENT)
                .map(|(i, s)| (i, word_count(s)))
                .filter(|(_, n)| *n > MIN_SEGMENT_WORDS)
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
            let Some((index, words)) = largest else {
                break;
            };
            let keep = words
                .saturating_sub(total - NARRATION_MAX_WORDS)
                .max(MIN_SEGMENT_WORDS);
            script.narration_segments[index] =
                truncate_words(&script.narration_segments[index], keep);
            total = script.narration_word_count();
        }
        actions.push(format!("Trimmed narration from {before} to {total} words"));
    }
}

// -- 11. stamps ---------------------------------------------------------------

fn fix_stamps(script: &mut ScriptResult, pack: &DomainPack, actions: &mut Vec<String>) {
    if script.domain_pack_id.as_deref() != Some(pack.id.as_str()) {
        script.domain_pack_id = Some(pack.id.clone());
        actions.push(format!("Stamped domain pack '{}'", pack.id));
    }
    // Template-paced weights are kept; pacing is not known here.
    let paced = script.template_id.is_some()
        && script.scene_weights.as_ref().is_some_and(|w| {
            w.len() == script.narration_segments.len()
                && w.iter().all(|x| x.is_finite() && *x > 0.0)
        });
    if paced {
        return;
    }
    let weights = recompute_scene_weights(script);
    if script.scene_weights.as_ref() != Some(&weights) {
        script.scene_weights = Some(weights);
        actions.push("Recomputed scene weights".to_string());
    }
}

/// Repair `script` toward the passing bar. Never mutates the input.
pub fn autofix_script(
    script: &ScriptResult,
    hints: &GroundingHints,
    pack: &DomainPack,
    scraped: &ScrapedData,
) -> AutoFixResult {
    let ctx = Ctx {
        hints,
        pack,
        scraped,
    };
    let mut next = script.clone();
    let mut actions = Vec::new();

    fix_structure(&mut next, &ctx, &mut actions);
    fix_cta(&mut next, &ctx, &mut actions);
    fix_hook(&mut next, &ctx, &mut actions);
    fix_captions(&mut next, &mut actions);
    fix_demo_lines(&mut next, &ctx, &mut actions);
    fix_icons(&mut next, pack, &mut actions);
    fix_integrations(&mut next, &ctx, &mut actions);
    let scrubbed = actions.len();
    fix_forbidden_terms(&mut next, pack, &mut actions);
    if actions.len() > scrubbed {
        // Replacements change word counts; settle the length rules again.
        fix_hook(&mut next, &ctx, &mut actions);
        fix_captions(&mut next, &mut actions);
        fix_demo_lines(&mut next, &ctx, &mut actions);
        fix_integrations(&mut next, &ctx, &mut actions);
    }
    fix_wordmark(&mut next, &mut actions);
    fix_narration_length(&mut next, &mut actions);
    fix_stamps(&mut next, pack, &mut actions);

    debug!(actions = actions.len(), pack_id = %pack.id, "autofix pass complete");

    AutoFixResult {
        script: next,
        actions,
    }
}
