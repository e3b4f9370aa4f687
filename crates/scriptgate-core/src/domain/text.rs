//! Small text helpers shared by the classifier, grounding and scorer.
//!
//! Whole-word matching works on lowercase alphanumeric token sequences, so
//! `"Google Drive"` matches `"sync to google-drive today"` but `"git"` does
//! not match `"digital"`.

/// Words that never count as grounding terms.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "do", "does", "each", "every", "for", "from", "get", "had",
    "has", "have", "how", "if", "in", "into", "is", "it", "its", "just", "make", "more", "most",
    "much", "new", "no", "not", "now", "of", "on", "one", "only", "or", "other", "our", "out",
    "over", "own", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "up", "us", "use",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "why",
    "will", "with", "without", "you", "your", "yours",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Case-insensitive whole-word/phrase containment.
pub fn contains_whole(haystack: &str, needle: &str) -> bool {
    let needle = tokenize(needle);
    if needle.is_empty() {
        return false;
    }
    let hay = tokenize(haystack);
    if hay.len() < needle.len() {
        return false;
    }
    hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Collapse runs of whitespace and trim.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max` words of `text`.
pub fn clip_words(text: &str, max: usize) -> String {
    text.split_whitespace()
        .take(max)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn strip_trailing_punct(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '-'))
        .trim()
        .to_string()
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

/// Bare host for a URL or host string: no scheme, no `www.`, no path, lowercase.
pub fn host_of(url_or_host: &str) -> Option<String> {
    let trimmed = url_or_host.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_word_matching() {
        assert!(contains_whole("Sync to google-drive today", "Google Drive"));
        assert!(!contains_whole("digital signage", "git"));
        assert!(contains_whole("Plans from $49/mo", "$49"));
        assert!(!contains_whole("anything", ""));
    }

    #[test]
    fn clip_and_title() {
        assert_eq!(clip_words("one two three four five", 3), "one two three");
        assert_eq!(title_case("match history"), "Match History");
        assert_eq!(strip_trailing_punct("Fast setup!!"), "Fast setup");
    }

    #[test]
    fn host_strips_scheme_www_and_path() {
        assert_eq!(host_of("https://www.Acme.io/pricing").as_deref(), Some("acme.io"));
        assert_eq!(host_of("op.gg").as_deref(), Some("op.gg"));
        assert_eq!(host_of("  "), None);
    }
}
