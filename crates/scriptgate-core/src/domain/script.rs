//! The script artifact under evaluation and its persisted JSON shape.
//!
//! Narration layout (8 segments):
//!
//! | index | content |
//! |---|---|
//! | 0–2 | hook narration; 2 is also the wordmark segment and must name the brand |
//! | 3–5 | feature 1–3 |
//! | 6 | integrations |
//! | 7 | call to action |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{Result, ScriptGateError};
use super::text::word_count;

pub const FEATURE_COUNT: usize = 3;
pub const SEGMENT_COUNT: usize = 8;
pub const HOOK_LINES: usize = 3;
pub const WORDMARK_SEGMENT: usize = 2;
pub const INTEGRATIONS_SEGMENT: usize = 6;
pub const CTA_SEGMENT: usize = 7;
pub const NARRATION_MIN_WORDS: usize = 100;
pub const NARRATION_MAX_WORDS: usize = 140;
pub const MIN_INTEGRATIONS: usize = 2;
pub const MAX_INTEGRATIONS: usize = 12;

/// Narration segment that voices feature `index` (0-based).
pub fn feature_segment(index: usize) -> usize {
    3 + index
}

/// One showcased feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub icon: String,
    pub app_name: String,
    pub caption: String,
    #[serde(default)]
    pub demo_lines: Vec<String>,
}

impl Feature {
    pub fn demo_text(&self) -> String {
        self.demo_lines.join(" ")
    }
}

/// Generated marketing script for one product video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub brand_name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub brand_colors: Vec<String>,
    #[serde(default)]
    pub cta_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_pack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub hook: Vec<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub integrations: Vec<String>,
    #[serde(default)]
    pub narration_segments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_weights: Option<Vec<f64>>,
}

impl ScriptResult {
    pub fn narration_word_count(&self) -> usize {
        self.narration_segments.iter().map(|s| word_count(s)).sum()
    }

    pub fn segment(&self, index: usize) -> &str {
        self.narration_segments
            .get(index)
            .map(String::as_str)
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// A regenerable part of the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Hook,
    Feature1,
    Feature2,
    Feature3,
    Cta,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Hook,
        Section::Feature1,
        Section::Feature2,
        Section::Feature3,
        Section::Cta,
    ];

    pub const FEATURES: [Section; 3] = [Section::Feature1, Section::Feature2, Section::Feature3];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hook => "hook",
            Self::Feature1 => "feature1",
            Self::Feature2 => "feature2",
            Self::Feature3 => "feature3",
            Self::Cta => "cta",
        }
    }

    /// 0-based feature index for `featureN` sections.
    pub fn feature_index(self) -> Option<usize> {
        match self {
            Self::Feature1 => Some(0),
            Self::Feature2 => Some(1),
            Self::Feature3 => Some(2),
            Self::Hook | Self::Cta => None,
        }
    }

    pub fn from_feature_index(index: usize) -> Option<Self> {
        Self::FEATURES.get(index).copied()
    }

    /// Narration segments owned by this section.
    pub fn narration_segments(self) -> Vec<usize> {
        match self {
            Self::Hook => vec![0, 1, 2],
            Self::Cta => vec![CTA_SEGMENT],
            other => other
                .feature_index()
                .map(|i| vec![feature_segment(i)])
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = ScriptGateError;

    fn from_str(s: &str) -> Result<Self> {
        Section::ALL
            .into_iter()
            .find(|sec| sec.as_str() == s)
            .ok_or_else(|| ScriptGateError::UnknownSection(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Payload normalization
// ---------------------------------------------------------------------------

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn as_opt_text(value: Option<&Value>) -> Option<String> {
    Some(as_text(value)).filter(|s| !s.is_empty())
}

/// Array of strings, or a single newline-separated string.
fn as_text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| as_text(Some(v)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn as_feature(value: &Value) -> Option<Feature> {
    let obj = value.as_object()?;
    Some(Feature {
        icon: as_text(field(obj, &["icon"])),
        app_name: as_text(field(obj, &["appName", "app_name", "name", "title"])),
        caption: as_text(field(obj, &["caption", "subtitle"])),
        demo_lines: as_text_list(field(obj, &["demoLines", "demo_lines", "demo"])),
    })
}

/// Lenient conversion of any script-like JSON into a [`ScriptResult`].
///
/// Accepts camelCase or snake_case keys, string-or-array list fields and
/// missing fields. Strings are trimmed and empty list items dropped, so the
/// function is idempotent over its own persisted output.
pub fn normalize_script_payload(value: &Value) -> ScriptResult {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let features = match field(obj, &["features"]) {
        Some(Value::Array(items)) => items.iter().filter_map(as_feature).collect(),
        _ => Vec::new(),
    };

    let scene_weights = match field(obj, &["sceneWeights", "scene_weights"]) {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_f64)
                .filter(|w| w.is_finite())
                .collect(),
        ),
        _ => None,
    };

    ScriptResult {
        brand_name: as_text(field(obj, &["brandName", "brand_name", "brand"])),
        tagline: as_text(field(obj, &["tagline"])),
        brand_colors: as_text_list(field(obj, &["brandColors", "brand_colors", "colors"])),
        cta_url: as_text(field(obj, &["ctaUrl", "cta_url", "cta"])),
        domain_pack_id: as_opt_text(field(obj, &["domainPackId", "domain_pack_id"])),
        template_id: as_opt_text(field(obj, &["templateId", "template_id"])),
        hook: as_text_list(field(obj, &["hook", "hookLines", "hook_lines"])),
        features,
        integrations: as_text_list(field(obj, &["integrations"])),
        narration_segments: as_text_list(field(
            obj,
            &["narrationSegments", "narration_segments", "narration"],
        )),
        scene_weights,
    }
}

/// Persisted JSON shape of a script.
pub fn to_persisted_script(script: &ScriptResult) -> Result<Value> {
    Ok(serde_json::to_value(script)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn section_names_are_closed() {
        for s in Section::ALL {
            assert_eq!(s.as_str().parse::<Section>().unwrap(), s);
        }
        assert!("feature4".parse::<Section>().is_err());
        assert!("Hook".parse::<Section>().is_err());
        assert_eq!(Section::Feature2.narration_segments(), vec![4]);
        assert_eq!(Section::Hook.narration_segments(), vec![0, 1, 2]);
    }

    #[test]
    fn normalize_accepts_snake_case_and_strings() {
        let raw = json!({
            "brand_name": "  Acme ",
            "hook": "Ship faster\n\nStay calm",
            "features": [
                { "name": "Inbox", "caption": "Triage", "demo": "Line one\nLine two" },
                "not-a-feature"
            ],
            "integrations": ["Slack", "", 42],
            "scene_weights": [2, "x", 3.5]
        });
        let script = normalize_script_payload(&raw);
        assert_eq!(script.brand_name, "Acme");
        assert_eq!(script.hook, vec!["Ship faster", "Stay calm"]);
        assert_eq!(script.features.len(), 1);
        assert_eq!(script.features[0].app_name, "Inbox");
        assert_eq!(script.features[0].demo_lines.len(), 2);
        assert_eq!(script.integrations, vec!["Slack", "42"]);
        assert_eq!(script.scene_weights, Some(vec![2.0, 3.5]));
    }

    #[test]
    fn normalize_non_object_is_empty() {
        assert_eq!(normalize_script_payload(&json!([1, 2])), ScriptResult::default());
    }

    #[test]
    fn persisted_roundtrip_is_stable() {
        let raw = json!({
            "brandName": "Acme",
            "ctaUrl": "https://acme.io",
            "domainPackId": "saas",
            "hook": [" Ship faster ", "Stay calm"],
            "features": [{ "icon": "chart", "appName": "Reports", "caption": "Weekly", "demoLines": ["a", " "] }],
            "narrationSegments": ["one", "two"],
            "sceneWeights": [2, 2]
        });
        let once = normalize_script_payload(&raw);
        let twice = normalize_script_payload(&to_persisted_script(&once).unwrap());
        assert_eq!(once, twice);
    }
}
