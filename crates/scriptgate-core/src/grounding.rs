//! Grounding extractor: verifiable facts mined from scraped content.
//!
//! Every downstream stage uses [`GroundingHints`] to tell generated text that
//! is tied to real source material apart from generic filler.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::text::{
    contains_whole, is_stop_word, normalize_ws, strip_trailing_punct, title_case, tokenize,
    word_count,
};
use crate::domain::{ScrapedData, ScriptResult};

const MAX_TERMS: usize = 40;
const MAX_PHRASES: usize = 30;
const MAX_FEATURE_NAMES: usize = 12;
const MAX_NUMBERS: usize = 20;
const MIN_PHRASE_WORDS: usize = 2;
const MAX_PHRASE_WORDS: usize = 9;
const MAX_PHRASE_CHARS: usize = 72;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        [$€£]\s?\d[\d,]*(?:\.\d+)?[kKmMbB]?      # currency
        | \d+/\d+                                # 24/7
        | \d[\d,]*(?:\.\d+)?\s?(?:%|\+|x\b|k\b)   # 99.9%, 10x, 500+
        | \b\d{1,3}(?:,\d{3})+(?:\.\d+)?\b       # 1,200
        | \b\d{2,}(?:\.\d+)?\b                    # 30
        ",
    )
    .expect("valid regex")
});

/// Canonical tool names recognized as integrations.
const KNOWN_INTEGRATIONS: &[&str] = &[
    "Slack", "Google Drive", "Google Calendar", "Google Classroom", "Gmail", "Notion", "Zapier",
    "Salesforce", "HubSpot", "GitHub", "GitLab", "Jira", "Docker", "AWS", "Stripe", "QuickBooks",
    "Xero", "Plaid", "PayPal", "Shopify", "Klaviyo", "Instagram", "Discord", "Twitch", "Steam",
    "Riot Games", "YouTube", "Zoom", "Microsoft Teams", "Trello", "Asana", "Figma", "Dropbox",
    "Intercom", "Mailchimp", "Airtable", "Linear", "Canvas", "Sentry", "Datadog", "Vercel",
];

/// Alias → canonical name.
const INTEGRATION_ALIASES: &[(&str, &str)] = &[
    ("gdrive", "Google Drive"),
    ("google docs", "Google Drive"),
    ("gcal", "Google Calendar"),
    ("gh", "GitHub"),
    ("ms teams", "Microsoft Teams"),
    ("msteams", "Microsoft Teams"),
    ("sfdc", "Salesforce"),
    ("qbo", "QuickBooks"),
    ("quickbooks online", "QuickBooks"),
    ("amazon web services", "AWS"),
    ("riot", "Riot Games"),
    ("yt", "YouTube"),
];

/// Resolve a tool name or alias to its canonical spelling.
pub fn canonical_integration(name: &str) -> Option<&'static str> {
    let lower = normalize_ws(name).to_lowercase();
    if lower.is_empty() {
        return None;
    }
    KNOWN_INTEGRATIONS
        .iter()
        .find(|k| k.to_lowercase() == lower)
        .copied()
        .or_else(|| {
            INTEGRATION_ALIASES
                .iter()
                .find(|(alias, _)| *alias == lower)
                .map(|(_, canonical)| *canonical)
        })
}

/// Facts extracted from one scraped snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroundingHints {
    /// Frequency-ordered content words.
    pub terms: Vec<String>,
    /// Deduped short extracts in source order.
    pub phrases: Vec<String>,
    pub feature_name_candidates: Vec<String>,
    /// Numeric, currency and percent tokens.
    pub numbers: Vec<String>,
    /// Canonical integration names in first-seen order.
    pub integration_candidates: Vec<String>,
}

impl GroundingHints {
    /// Ordered evidence for naming features and hooks: feature name
    /// candidates, then phrases, then title-cased top terms.
    pub fn evidence(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.feature_name_candidates
            .iter()
            .cloned()
            .chain(self.phrases.iter().cloned())
            .chain(self.terms.iter().map(|t| title_case(t)))
            .filter(|e| seen.insert(e.to_lowercase()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.phrases.is_empty() && self.numbers.is_empty()
    }
}

fn content_sources(scraped: &ScrapedData) -> Vec<&str> {
    let mut sources = vec![scraped.title.as_str(), scraped.description.as_str()];
    sources.extend(scraped.headings.iter().map(String::as_str));
    sources.extend(scraped.feature_texts.iter().map(String::as_str));
    sources.push(scraped.body_text.as_str());
    sources
}

fn extract_terms(scraped: &ScrapedData) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;
    for source in content_sources(scraped) {
        for token in tokenize(source) {
            if token.len() < 3 || is_stop_word(&token) || token.chars().all(|c| c.is_ascii_digit())
            {
                continue;
            }
            let entry = counts.entry(token).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
    }
    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(t, (n, first))| (t, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_TERMS)
        .map(|(t, _, _)| t)
        .collect()
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| matches!(c, '.' | '!' | '?' | ';' | '\n' | '|' | '•'))
}

fn clean_phrase(raw: &str) -> Option<String> {
    let phrase = strip_trailing_punct(&normalize_ws(raw));
    let words = word_count(&phrase);
    if !(MIN_PHRASE_WORDS..=MAX_PHRASE_WORDS).contains(&words) || phrase.len() > MAX_PHRASE_CHARS {
        return None;
    }
    if tokenize(&phrase).iter().all(|t| is_stop_word(t)) {
        return None;
    }
    Some(phrase)
}

fn extract_phrases(scraped: &ScrapedData) -> Vec<String> {
    let mut seen = HashSet::new();
    let whole = scraped
        .headings
        .iter()
        .chain(scraped.feature_texts.iter())
        .map(String::as_str);
    let sentences = split_sentences(&scraped.description).chain(split_sentences(&scraped.body_text));
    whole
        .flat_map(split_sentences)
        .chain(sentences)
        .filter_map(clean_phrase)
        .filter(|p| seen.insert(p.to_lowercase()))
        .take(MAX_PHRASES)
        .collect()
}

fn extract_feature_names(scraped: &ScrapedData) -> Vec<String> {
    let mut seen = HashSet::new();
    scraped
        .headings
        .iter()
        .chain(scraped.feature_texts.iter())
        .filter_map(|raw| {
            let text = strip_trailing_punct(&normalize_ws(raw));
            // "Match History: every game you played" → "Match History"
            let head = text
                .split([':', '—'])
                .next()
                .and_then(|h| h.split(" - ").next())
                .map(strip_trailing_punct)
                .unwrap_or_default();
            if head.len() < text.len() && (1..=4).contains(&word_count(&head)) {
                return Some(head);
            }
            (1..=4).contains(&word_count(&text)).then_some(text)
        })
        .filter(|name| !tokenize(name).iter().all(|t| is_stop_word(t)))
        .map(|name| title_case(&name))
        .filter(|name| seen.insert(name.to_lowercase()))
        .take(MAX_FEATURE_NAMES)
        .collect()
}

fn extract_numbers(scraped: &ScrapedData) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut numbers = Vec::new();
    for source in content_sources(scraped) {
        for m in NUMBER_RE.find_iter(source) {
            let token = m.as_str().trim().to_string();
            if seen.insert(token.clone()) {
                numbers.push(token);
            }
            if numbers.len() >= MAX_NUMBERS {
                return numbers;
            }
        }
    }
    numbers
}

fn first_whole_position(hay: &[String], needle: &str) -> Option<usize> {
    let needle = tokenize(needle);
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle.as_slice())
}

fn extract_integrations(scraped: &ScrapedData) -> Vec<String> {
    let mut text: Vec<&str> = content_sources(scraped);
    let links = scraped.link_text();
    text.push(&links);
    let tokens = tokenize(&text.join(" \n "));

    let mut hits: Vec<(usize, &'static str)> = KNOWN_INTEGRATIONS
        .iter()
        .map(|k| (*k, *k))
        .chain(INTEGRATION_ALIASES.iter().copied())
        .filter_map(|(needle, canonical)| {
            first_whole_position(&tokens, needle).map(|pos| (pos, canonical))
        })
        .collect();
    hits.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(b.1)));

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|(_, c)| seen.insert(*c))
        .map(|(_, c)| c.to_string())
        .collect()
}

/// Mine grounding hints from a scraped snapshot. Pure.
pub fn extract_grounding_hints(scraped: &ScrapedData) -> GroundingHints {
    GroundingHints {
        terms: extract_terms(scraped),
        phrases: extract_phrases(scraped),
        feature_name_candidates: extract_feature_names(scraped),
        numbers: extract_numbers(scraped),
        integration_candidates: extract_integrations(scraped),
    }
}

fn number_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `text` whole-word-contains any extracted term or phrase, or
/// carries one of the extracted numbers verbatim (`$19` never matches `19`).
pub fn has_grounding_signal(text: &str, hints: &GroundingHints) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    if hints
        .terms
        .iter()
        .chain(hints.phrases.iter())
        .any(|needle| contains_whole(text, needle))
    {
        return true;
    }
    if hints.numbers.is_empty() {
        return false;
    }
    let wanted: HashSet<String> = hints.numbers.iter().map(|n| number_key(n)).collect();
    NUMBER_RE
        .find_iter(text)
        .any(|m| wanted.contains(&number_key(m.as_str())))
}

/// Fraction of captions, demo blocks and narration segments that carry a
/// grounding signal.
pub fn grounding_coverage(script: &ScriptResult, hints: &GroundingHints) -> f64 {
    let demo_texts: Vec<String> = script.features.iter().map(|f| f.demo_text()).collect();
    let items: Vec<&str> = script
        .features
        .iter()
        .map(|f| f.caption.as_str())
        .chain(demo_texts.iter().map(String::as_str))
        .chain(script.narration_segments.iter().map(String::as_str))
        .collect();
    if items.is_empty() {
        return 0.0;
    }
    let grounded = items
        .iter()
        .filter(|t| has_grounding_signal(t, hints))
        .count();
    grounded as f64 / items.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScrapedLink;

    fn site() -> ScrapedData {
        ScrapedData {
            title: "Ledgerly - Invoicing for small teams".into(),
            description: "Send invoices in 30 seconds. Get paid 2x faster.".into(),
            headings: vec!["Recurring Invoices".into(), "Expense Tracking: snap receipts".into()],
            feature_texts: vec!["Bank sync".into()],
            body_text: "Plans from $19/mo. Trusted by 1,200 agencies. Syncs with QBO and gdrive. \
                        Invoices reminders invoices."
                .into(),
            links: vec![ScrapedLink {
                label: "Stripe integration".into(),
                href: "/integrations/stripe".into(),
            }],
            domain: "ledgerly.io".into(),
            ..Default::default()
        }
    }

    #[test]
    fn terms_are_frequency_ranked_without_stop_words() {
        let hints = extract_grounding_hints(&site());
        assert_eq!(hints.terms[0], "invoices");
        assert!(!hints.terms.iter().any(|t| t == "the" || t == "for"));
        assert!(hints.terms.iter().all(|t| t.len() >= 3));
    }

    #[test]
    fn phrases_are_bounded_and_deduped() {
        let hints = extract_grounding_hints(&site());
        assert!(hints.phrases.contains(&"Recurring Invoices".to_string()));
        assert!(hints.phrases.contains(&"Send invoices in 30 seconds".to_string()));
        for p in &hints.phrases {
            let n = word_count(p);
            assert!((2..=9).contains(&n), "{p}");
        }
    }

    #[test]
    fn feature_names_take_heading_heads() {
        let hints = extract_grounding_hints(&site());
        assert_eq!(
            hints.feature_name_candidates,
            vec!["Recurring Invoices", "Expense Tracking", "Bank Sync"]
        );
    }

    #[test]
    fn numbers_cover_currency_percent_and_multipliers() {
        let hints = extract_grounding_hints(&site());
        assert!(hints.numbers.contains(&"$19".to_string()));
        assert!(hints.numbers.contains(&"2x".to_string()));
        assert!(hints.numbers.contains(&"1,200".to_string()));
        assert!(hints.numbers.contains(&"30".to_string()));
    }

    #[test]
    fn integrations_resolve_aliases() {
        let hints = extract_grounding_hints(&site());
        assert_eq!(
            hints.integration_candidates,
            vec!["QuickBooks", "Google Drive", "Stripe"]
        );
        assert_eq!(canonical_integration("  GDrive "), Some("Google Drive"));
        assert_eq!(canonical_integration("slack"), Some("Slack"));
        assert_eq!(canonical_integration("Unknown Tool"), None);
    }

    #[test]
    fn grounding_signal_is_whole_word() {
        let hints = extract_grounding_hints(&site());
        assert!(has_grounding_signal("Recurring invoices on autopilot", &hints));
        assert!(has_grounding_signal("Only $19 a month", &hints));
        assert!(!has_grounding_signal("Unleash synergy today", &hints));
        assert!(!has_grounding_signal("", &hints));
    }

    #[test]
    fn numbers_match_on_the_whole_figure() {
        let hints = GroundingHints {
            numbers: vec!["$19".into(), "2x".into()],
            ..GroundingHints::default()
        };
        assert!(has_grounding_signal("Plans from $19/mo", &hints));
        assert!(has_grounding_signal("Get paid 2x faster", &hints));
        assert!(!has_grounding_signal("Loved by 19 users", &hints));
        assert!(!has_grounding_signal("Priced at $199", &hints));

        let bare = GroundingHints {
            numbers: vec!["19".into()],
            ..GroundingHints::default()
        };
        assert!(!has_grounding_signal("Only $19 a month", &bare));
        assert!(has_grounding_signal("Set up in 19 minutes", &bare));
    }
}
