//! Canned inputs for tests and demos.
//!
//! `sample_script()` passes the default quality bar against
//! `sample_scraped()` under the `saas` pack.

use crate::domain::{Feature, ScrapedData, ScrapedLink, ScriptResult};

pub fn sample_scraped() -> ScrapedData {
    ScrapedData {
        title: "Acme Flow - Workflow automation for teams".into(),
        description: "Automate approvals in 5 minutes. Cut busywork by 40%.".into(),
        headings: vec![
            "Approval Workflows".into(),
            "Team Dashboard: see every project".into(),
            "Slack Alerts".into(),
        ],
        feature_texts: vec!["Automated reminders for overdue tasks".into()],
        body_text: "Acme Flow is workflow automation software for operations teams. Connect \
                    Slack and Google Drive, build approval workflows, and track every request \
                    on one dashboard. Trusted by 3,000 teams. Plans from $29/mo."
            .into(),
        colors: vec!["#4F46E5".into(), "#F59E0B".into()],
        links: vec![ScrapedLink {
            label: "Integrations".into(),
            href: "/integrations/slack".into(),
        }],
        domain: "acmeflow.io".into(),
    }
}

fn feature(icon: &str, app_name: &str, caption: &str, demo: &[&str]) -> Feature {
    Feature {
        icon: icon.into(),
        app_name: app_name.into(),
        caption: caption.into(),
        demo_lines: demo.iter().map(|l| l.to_string()).collect(),
    }
}

pub fn sample_script() -> ScriptResult {
    ScriptResult {
        brand_name: "Acme Flow".into(),
        tagline: "Approvals without the chase".into(),
        brand_colors: vec!["#4F46E5".into()],
        cta_url: "https://acmeflow.io".into(),
        domain_pack_id: Some("saas".into()),
        template_id: Some("product-tour".into()),
        hook: vec![
            "Approvals stuck again?".into(),
            "Requests lost in email?".into(),
            "Meet Acme Flow.".into(),
        ],
        features: vec![
            feature(
                "check",
                "Approval Workflows",
                "Route approvals in minutes",
                &["Status: 12 approvals pending", "Owner: Finance team"],
            ),
            feature(
                "chart",
                "Team Dashboard",
                "Every request in one view",
                &["Pipeline: 48 open requests", "Due: Friday 5pm"],
            ),
            feature(
                "bolt",
                "Slack Alerts",
                "Reminders before tasks slip",
                &["Status: 3 overdue tasks flagged", "Owner: Ops lead"],
            ),
        ],
        integrations: vec!["Slack".into(), "Google Drive".into()],
        narration_segments: vec![
            "Approvals stuck in email threads again?".into(),
            "Requests slip through the cracks and nobody knows who owns what next.".into(),
            "Meet Acme Flow, workflow automation built for operations teams.".into(),
            "Approval Workflows route every request to the right owner in 5 minutes, with a \
             clear status at each step."
                .into(),
            "The Team Dashboard shows every open request in one view, so you always see what \
             is due this week."
                .into(),
            "Slack Alerts nudge owners before tasks go overdue, cutting busywork by 40 percent \
             across the team."
                .into(),
            "Acme Flow connects with Slack and Google Drive, so files and conversations stay in \
             sync."
                .into(),
            "Join 3,000 teams moving faster. Start free today at acmeflow.io.".into(),
        ],
        scene_weights: None,
    }
}
