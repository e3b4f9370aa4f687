//! Quality-guard pipeline: classify, ground, autofix, score.
//!
//! The result is persisted per root as `script.json` plus `quality.json`. The
//! quality file carries the digest of the script it was computed from, so a
//! script edited after scoring is detectable.

use chrono::{DateTime, Utc};
use scriptgate_state::{
    ContentDigest, GenerationMode, ProjectRoot, ProjectStore, QualitySnapshot, ReadOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::autofix::autofix_script;
use crate::classifier::{select_domain_pack, PackCandidate, SelectionReason};
use crate::domain::{
    normalize_script_payload, to_persisted_script, Result, ScrapedData, ScriptResult,
};
use crate::grounding::{extract_grounding_hints, grounding_coverage};
use crate::metrics::METRICS;
use crate::obs;
use crate::packs::pack_or_general;
use crate::quality::{evaluate_script_quality, QualityConfig, QualityReport};

/// Options for one guard run.
#[derive(Debug, Clone, Default)]
pub struct GuardOptions {
    pub pack_override: Option<String>,
    pub quality: QualityConfig,
    /// Skip autofix and score the script as given.
    pub skip_autofix: bool,
    pub mode: Option<GenerationMode>,
}

/// Persisted classifier decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub pack_id: String,
    pub reason: SelectionReason,
    pub confidence: f64,
    pub top_candidates: Vec<PackCandidate>,
}

/// Contents of `quality.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityFile {
    pub classification: ClassificationRecord,
    pub grounding_coverage: f64,
    pub report: QualityReport,
    pub mode: GenerationMode,
    #[serde(default)]
    pub autofix_actions: Vec<String>,
    pub script_digest: ContentDigest,
    pub evaluated_at: DateTime<Utc>,
}

impl QualityFile {
    /// Snapshot stored on a version record.
    pub fn snapshot(&self, template_id: Option<String>) -> QualitySnapshot {
        QualitySnapshot {
            score: self.report.score,
            passed: self.report.passed,
            blocker_count: self.report.blocker_count() as u32,
            warning_count: self.report.warning_count() as u32,
            domain_pack_id: Some(self.classification.pack_id.clone()),
            template_id,
        }
    }

    /// Whether this file was computed from `script`.
    pub fn matches_script(&self, script: &ScriptResult) -> Result<bool> {
        Ok(script_digest(script)? == self.script_digest)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutput {
    pub script: ScriptResult,
    pub quality: QualityFile,
}

fn script_digest(script: &ScriptResult) -> Result<ContentDigest> {
    Ok(ContentDigest::from_json(&to_persisted_script(script)?)?)
}

/// Run the full guard over a script.
pub fn run_quality_guard(
    script: &ScriptResult,
    scraped: &ScrapedData,
    options: &GuardOptions,
) -> Result<GuardOutput> {
    let selection = select_domain_pack(scraped, options.pack_override.as_deref());
    let pack = pack_or_general(Some(&selection.pack.id));
    let hints = extract_grounding_hints(scraped);

    let (script, actions) = if options.skip_autofix {
        (script.clone(), Vec::new())
    } else {
        let fixed = autofix_script(script, &hints, pack, scraped);
        METRICS.add_autofix_actions(fixed.actions.len() as u64);
        obs::emit_autofix_applied(&pack.id, fixed.actions.len());
        (fixed.script, fixed.actions)
    };

    let report = evaluate_script_quality(&script, scraped, pack, &options.quality);
    METRICS.inc_scripts_scored();
    obs::emit_quality_evaluated(
        &pack.id,
        report.score,
        report.passed,
        report.blocker_count(),
        report.warning_count(),
    );

    let quality = QualityFile {
        classification: ClassificationRecord {
            pack_id: pack.id.clone(),
            reason: selection.reason,
            confidence: selection.confidence,
            top_candidates: selection.top_candidates,
        },
        grounding_coverage: grounding_coverage(&script, &hints),
        report,
        mode: options.mode.unwrap_or(GenerationMode::Generate),
        autofix_actions: actions,
        script_digest: script_digest(&script)?,
        evaluated_at: Utc::now(),
    };
    Ok(GuardOutput { script, quality })
}

/// Write `script.json` and `quality.json` for a root.
pub async fn persist_guard_output(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    output: &GuardOutput,
) -> Result<()> {
    store
        .write_script(root, &to_persisted_script(&output.script)?)
        .await?;
    store
        .write_quality(root, &serde_json::to_value(&output.quality)?)
        .await?;
    debug!(root = %root.key(), score = output.quality.report.score, "guard output persisted");
    Ok(())
}

/// Load the persisted script, normalized. `None` when absent or corrupt.
pub async fn load_script(store: &dyn ProjectStore, root: &ProjectRoot) -> Result<Option<ScriptResult>> {
    match store.read_script(root).await? {
        ReadOutcome::Present(value) => Ok(Some(normalize_script_payload(&value))),
        ReadOutcome::Absent => Ok(None),
        ReadOutcome::Corrupt(reason) => {
            warn!(root = %root.key(), reason = %reason, "script.json is corrupt");
            METRICS.inc_corrupt_reads();
            Ok(None)
        }
    }
}

/// Load `quality.json`. `None` when absent, corrupt or of an unknown shape.
pub async fn load_quality_file(
    store: &dyn ProjectStore,
    root: &ProjectRoot,
) -> Result<Option<QualityFile>> {
    let value = match store.read_quality(root).await? {
        ReadOutcome::Present(value) => value,
        ReadOutcome::Absent => return Ok(None),
        ReadOutcome::Corrupt(reason) => {
            warn!(root = %root.key(), reason = %reason, "quality.json is corrupt");
            METRICS.inc_corrupt_reads();
            return Ok(None);
        }
    };
    match serde_json::from_value(value) {
        Ok(file) => Ok(Some(file)),
        Err(err) => {
            warn!(root = %root.key(), error = %err, "quality.json has an unexpected shape");
            METRICS.inc_corrupt_reads();
            Ok(None)
        }
    }
}
