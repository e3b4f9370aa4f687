//! Domain pack policy tables.
//!
//! A pack is the content profile for one kind of site: the vocabulary the
//! classifier looks for, the icons and integrations the script may use, and
//! the terms it must avoid. Packs are data; the classifier, scorer and
//! autofixer read them but never branch on a pack id.

use std::sync::LazyLock;

use serde::Serialize;

use scriptgate_state::PromotionSegment;

pub const GENERAL_PACK_ID: &str = "general";

/// A classifier keyword with its own weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyword {
    pub term: String,
    pub weight: f64,
}

/// Immutable content profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainPack {
    pub id: String,
    pub label: String,
    pub keywords: Vec<Keyword>,
    pub negative_keywords: Vec<String>,
    pub allowed_icons: Vec<String>,
    pub forbidden_terms: Vec<String>,
    /// Field names that make demo lines concrete (`"Win Rate: 54%"`).
    pub concrete_fields: Vec<String>,
    pub fallback_integrations: Vec<String>,
    pub preferred_template: String,
    pub segment: PromotionSegment,
}

impl DomainPack {
    pub fn is_general(&self) -> bool {
        self.id == GENERAL_PACK_ID
    }

    pub fn allows_icon(&self, icon: &str) -> bool {
        let icon = icon.trim().to_ascii_lowercase();
        self.allowed_icons.iter().any(|i| *i == icon)
    }

    pub fn first_icon(&self) -> &str {
        self.allowed_icons.first().map(String::as_str).unwrap_or("sparkles")
    }
}

struct PackDef {
    id: &'static str,
    label: &'static str,
    segment: PromotionSegment,
    keywords: &'static [(&'static str, f64)],
    negative: &'static [&'static str],
    icons: &'static [&'static str],
    forbidden: &'static [&'static str],
    fields: &'static [&'static str],
    integrations: &'static [&'static str],
    template: &'static str,
}

const PACK_DEFS: &[PackDef] = &[
    PackDef {
        id: GENERAL_PACK_ID,
        label: "General",
        segment: PromotionSegment::Broad,
        keywords: &[],
        negative: &[],
        icons: &["sparkles", "check", "chart", "bolt", "globe", "star", "users", "calendar"],
        forbidden: &["guaranteed", "revolutionary", "best in the world", "number one"],
        fields: &["Status", "Owner", "Updated", "Total"],
        integrations: &["Slack", "Google Drive", "Zapier"],
        template: "classic",
    },
    PackDef {
        id: "saas",
        label: "B2B SaaS",
        segment: PromotionSegment::CoreIcp,
        keywords: &[
            ("saas", 1.5),
            ("software", 1.0),
            ("dashboard", 1.0),
            ("workflow", 1.0),
            ("workflows", 1.0),
            ("automation", 1.0),
            ("crm", 1.2),
            ("analytics", 1.0),
            ("integrations", 0.8),
            ("project management", 1.2),
            ("team", 0.6),
            ("teams", 0.6),
            ("cloud", 0.6),
            ("platform", 0.4),
        ],
        negative: &["casino", "recipe", "recipes"],
        icons: &["chart", "bolt", "users", "calendar", "check", "inbox", "settings", "layers"],
        forbidden: &["guaranteed", "revolutionary", "game-changing"],
        fields: &["Owner", "Due", "Status", "Pipeline", "MRR"],
        integrations: &["Slack", "Google Drive", "Salesforce", "HubSpot", "Zapier", "Notion"],
        template: "product-tour",
    },
    PackDef {
        id: "devtools",
        label: "Developer Tools",
        segment: PromotionSegment::CoreIcp,
        keywords: &[
            ("developer", 1.2),
            ("developers", 1.2),
            ("api", 1.2),
            ("sdk", 1.5),
            ("cli", 1.2),
            ("deploy", 1.0),
            ("github", 1.2),
            ("code", 1.0),
            ("repository", 1.0),
            ("open source", 1.0),
            ("kubernetes", 1.5),
            ("pull request", 1.2),
            ("infrastructure", 1.0),
            ("platform", 0.4),
        ],
        negative: &["recipe", "fashion", "casino"],
        icons: &["terminal", "code", "git-branch", "server", "bolt", "check", "layers", "shield"],
        forbidden: &["bug-free", "guaranteed", "unhackable"],
        fields: &["Build", "Commit", "Latency", "Region", "Version"],
        integrations: &["GitHub", "GitLab", "Slack", "Jira", "Docker", "AWS"],
        template: "terminal",
    },
    PackDef {
        id: "fintech",
        label: "Finance & Payments",
        segment: PromotionSegment::CoreIcp,
        keywords: &[
            ("payments", 1.3),
            ("invoice", 1.2),
            ("invoicing", 1.2),
            ("banking", 1.2),
            ("finance", 1.0),
            ("accounting", 1.2),
            ("expense", 1.0),
            ("expenses", 1.0),
            ("payroll", 1.3),
            ("transactions", 1.0),
            ("treasury", 1.2),
            ("budget", 0.8),
            ("platform", 0.4),
        ],
        negative: &["casino", "betting", "esports"],
        icons: &["wallet", "card", "chart", "receipt", "shield", "bank", "check", "calendar"],
        forbidden: &["guaranteed returns", "risk-free", "get rich"],
        fields: &["Amount", "Due", "Balance", "Invoice", "Status"],
        integrations: &["Stripe", "QuickBooks", "Xero", "Plaid", "Slack"],
        template: "ledger",
    },
    PackDef {
        id: "ecommerce",
        label: "E-commerce",
        segment: PromotionSegment::Broad,
        keywords: &[
            ("shop", 1.0),
            ("store", 0.8),
            ("cart", 1.2),
            ("checkout", 1.2),
            ("shipping", 1.0),
            ("free shipping", 1.3),
            ("products", 0.8),
            ("ecommerce", 1.5),
            ("orders", 0.8),
            ("sale", 0.8),
            ("collection", 0.6),
            ("inventory", 1.0),
        ],
        negative: &["sdk", "api", "payroll"],
        icons: &["cart", "bag", "tag", "truck", "star", "heart", "gift", "check"],
        forbidden: &["guaranteed", "cheapest", "miracle"],
        fields: &["Price", "SKU", "Stock", "Order", "Ships"],
        integrations: &["Shopify", "Stripe", "PayPal", "Klaviyo", "Instagram"],
        template: "storefront",
    },
    PackDef {
        id: "gaming",
        label: "Gaming",
        segment: PromotionSegment::Broad,
        keywords: &[
            ("game", 1.2),
            ("games", 1.2),
            ("gaming", 1.3),
            ("gamer", 1.2),
            ("esports", 1.5),
            ("ranked", 1.2),
            ("champion", 1.0),
            ("champions", 1.0),
            ("players", 0.8),
            ("leaderboard", 1.2),
            ("win rate", 1.2),
            ("lol", 1.0),
            ("gg", 1.2),
            ("valorant", 1.5),
            ("league of legends", 1.5),
            ("builds", 0.8),
            ("stats", 0.8),
            ("tier list", 1.2),
        ],
        negative: &["payroll", "invoice", "patient"],
        icons: &["trophy", "gamepad", "chart", "sword", "star", "users", "bolt", "target"],
        forbidden: &["guaranteed win", "hack", "cheat", "cheats"],
        fields: &["Win Rate", "KDA", "Tier", "Rank", "Matches"],
        integrations: &["Discord", "Twitch", "Steam", "Riot Games", "YouTube"],
        template: "arcade",
    },
    PackDef {
        id: "healthcare",
        label: "Healthcare",
        segment: PromotionSegment::Broad,
        keywords: &[
            ("health", 1.0),
            ("patient", 1.3),
            ("patients", 1.3),
            ("clinic", 1.3),
            ("doctor", 1.2),
            ("medical", 1.2),
            ("therapy", 1.0),
            ("wellness", 0.8),
            ("appointment", 1.0),
            ("telehealth", 1.5),
            ("care", 0.5),
        ],
        negative: &["casino", "esports"],
        icons: &["heart", "stethoscope", "calendar", "shield", "users", "check", "clipboard", "pill"],
        forbidden: &["cure", "miracle", "guaranteed results", "fda approved"],
        fields: &["Patient", "Appointment", "Provider", "Status", "Next Visit"],
        integrations: &["Epic", "Google Calendar", "Zoom", "Stripe"],
        template: "calm",
    },
    PackDef {
        id: "education",
        label: "Education",
        segment: PromotionSegment::Broad,
        keywords: &[
            ("learn", 0.8),
            ("learning", 1.0),
            ("course", 1.2),
            ("courses", 1.2),
            ("students", 1.3),
            ("teachers", 1.3),
            ("classroom", 1.3),
            ("lesson", 1.2),
            ("lessons", 1.2),
            ("education", 1.2),
            ("tutor", 1.2),
            ("quiz", 1.0),
            ("curriculum", 1.2),
        ],
        negative: &["casino", "payroll"],
        icons: &["book", "graduation", "pencil", "users", "calendar", "check", "star", "lightbulb"],
        forbidden: &["guaranteed grades", "instant fluency"],
        fields: &["Lesson", "Score", "Progress", "Due", "Level"],
        integrations: &["Google Classroom", "Zoom", "Canvas", "YouTube"],
        template: "chalkboard",
    },
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

static PACKS: LazyLock<Vec<DomainPack>> = LazyLock::new(|| {
    PACK_DEFS
        .iter()
        .map(|d| DomainPack {
            id: d.id.to_string(),
            label: d.label.to_string(),
            keywords: d
                .keywords
                .iter()
                .map(|(term, weight)| Keyword {
                    term: term.to_string(),
                    weight: *weight,
                })
                .collect(),
            negative_keywords: owned(d.negative),
            allowed_icons: owned(d.icons),
            forbidden_terms: owned(d.forbidden),
            concrete_fields: owned(d.fields),
            fallback_integrations: owned(d.integrations),
            preferred_template: d.template.to_string(),
            segment: d.segment,
        })
        .collect()
});

/// Every built-in pack, `general` first.
pub fn builtin_packs() -> &'static [DomainPack] {
    &PACKS
}

pub fn find_pack(id: &str) -> Option<&'static DomainPack> {
    let id = id.trim().to_ascii_lowercase();
    PACKS.iter().find(|p| p.id == id)
}

pub fn general_pack() -> &'static DomainPack {
    &PACKS[0]
}

/// Pack for an optional id, falling back to `general`.
pub fn pack_or_general(id: Option<&str>) -> &'static DomainPack {
    id.and_then(find_pack).unwrap_or_else(general_pack)
}

/// Promotion segment for a pack id; unknown ids are `broad`.
pub fn segment_for_pack(id: Option<&str>) -> PromotionSegment {
    id.and_then(find_pack)
        .map(|p| p.segment)
        .unwrap_or(PromotionSegment::Broad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_is_first_and_keywordless() {
        let general = general_pack();
        assert!(general.is_general());
        assert!(general.keywords.is_empty());
    }

    #[test]
    fn pack_ids_are_unique_and_tables_complete() {
        let mut ids: Vec<&str> = builtin_packs().iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), builtin_packs().len());
        for p in builtin_packs() {
            assert!(!p.allowed_icons.is_empty(), "{} has no icons", p.id);
            assert!(p.concrete_fields.len() >= 3, "{} needs 3 fields", p.id);
            assert!(p.fallback_integrations.len() >= 2, "{} needs 2 integrations", p.id);
        }
    }

    #[test]
    fn generic_words_are_downweighted() {
        for p in builtin_packs() {
            if let Some(k) = p.keywords.iter().find(|k| k.term == "platform") {
                assert!((k.weight - 0.4).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn segments_resolve_with_broad_fallback() {
        assert_eq!(segment_for_pack(Some("saas")), PromotionSegment::CoreIcp);
        assert_eq!(segment_for_pack(Some("gaming")), PromotionSegment::Broad);
        assert_eq!(segment_for_pack(Some("nope")), PromotionSegment::Broad);
        assert_eq!(segment_for_pack(None), PromotionSegment::Broad);
    }
}
