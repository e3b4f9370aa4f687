//! Inputs supplied by external collaborators: scraped site facts and
//! template pacing profiles.

use serde::{Deserialize, Serialize};

use super::text::host_of;

/// An outbound link found on the scraped site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScrapedLink {
    pub label: String,
    pub href: String,
}

/// Site facts produced by the external fetch/parse step. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapedData {
    pub title: String,
    pub description: String,
    pub headings: Vec<String>,
    pub feature_texts: Vec<String>,
    pub body_text: String,
    pub colors: Vec<String>,
    pub links: Vec<ScrapedLink>,
    pub domain: String,
}

impl ScrapedData {
    /// Bare source host (`acme.io`), or the raw trimmed domain if it does not parse.
    pub fn host(&self) -> String {
        host_of(&self.domain).unwrap_or_else(|| self.domain.trim().to_ascii_lowercase())
    }

    /// Canonical CTA URL for the source domain.
    pub fn cta_url(&self) -> String {
        let host = self.host();
        if host.is_empty() {
            String::new()
        } else {
            format!("https://{host}")
        }
    }

    /// Domain split into label tokens (`op.gg` → `["op", "gg"]`).
    pub fn domain_tokens(&self) -> Vec<String> {
        self.host()
            .split(|c: char| c == '.' || c == '-')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Link labels and hrefs joined for keyword matching.
    pub fn link_text(&self) -> String {
        self.links
            .iter()
            .map(|l| format!("{} {}", l.label, l.href))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Per-template pacing supplied by the render collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateProfile {
    pub id: String,
    /// Multiplier per narration segment; missing entries count as 1.0.
    #[serde(default)]
    pub scene_pacing: Vec<f64>,
}

impl TemplateProfile {
    pub fn pacing(&self, index: usize) -> f64 {
        self.scene_pacing
            .get(index)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_with_missing_fields() {
        let scraped: ScrapedData = serde_json::from_value(serde_json::json!({
            "title": "OP.GG",
            "featureTexts": ["Match history"],
            "domain": "https://www.op.gg/"
        }))
        .unwrap();
        assert_eq!(scraped.feature_texts, vec!["Match history"]);
        assert!(scraped.headings.is_empty());
        assert_eq!(scraped.host(), "op.gg");
        assert_eq!(scraped.cta_url(), "https://op.gg");
        assert_eq!(scraped.domain_tokens(), vec!["op", "gg"]);
    }

    #[test]
    fn pacing_defaults_to_one() {
        let t = TemplateProfile {
            id: "t".into(),
            scene_pacing: vec![1.5, -1.0],
        };
        assert_eq!(t.pacing(0), 1.5);
        assert_eq!(t.pacing(1), 1.0);
        assert_eq!(t.pacing(7), 1.0);
    }
}
