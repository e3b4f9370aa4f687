//! Scriptgate CLI
//!
//! The `scriptgate` command scores, repairs and improves generated video
//! scripts, and manages the rendered versions of a project root.
//!
//! ## Commands
//!
//! - `classify` / `ground`: inspect what the engine sees in a scraped site
//! - `score` / `autofix` / `regenerate` / `improve`: work on a script file
//! - `guard`: run the full pipeline and persist the result for a root
//! - `versions`, `promote`, `outcome`, `calibrate`, `sweep`: promotion engine

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scriptgate_core::learning::collect_outcome_learning;
use scriptgate_core::pipeline::persist_guard_output;
use scriptgate_core::promotion::VersionMetaUpdate;
use scriptgate_core::{
    autofix_script, calibrate_thresholds, evaluate_script_quality, extract_grounding_hints,
    find_pack, normalize_script_payload, pack_or_general, promote_version,
    recommend_project_version, record_outcome, regenerate_section, run_auto_improve,
    run_quality_guard, select_domain_pack, sweep_pending_promotions, to_persisted_script,
    update_version_meta, EngineConfig, GuardOptions, ProjectSpan, ScrapedData, ScriptResult,
    Section, TemplateProfile, METRICS,
};
use scriptgate_state::{FsProjectStore, Outcome, ProjectRoot, ProjectStore};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "scriptgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quality guard and promotion engine for generated video scripts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML config file
    #[arg(long, global = true, env = "SCRIPTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Project store directory (overrides config and SCRIPTGATE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Identifies a project root.
#[derive(clap::Args, Clone)]
struct RootArgs {
    /// Source URL of the project
    #[arg(long)]
    url: String,

    /// Owning account
    #[arg(long)]
    owner: String,
}

impl RootArgs {
    fn root(&self) -> Result<ProjectRoot> {
        ProjectRoot::new(&self.url, &self.owner).context("invalid project root")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pick the domain pack for a scraped site
    Classify {
        #[arg(long)]
        scraped: PathBuf,

        /// Force a pack id
        #[arg(long)]
        pack: Option<String>,
    },

    /// Show grounding hints mined from a scraped site
    Ground {
        #[arg(long)]
        scraped: PathBuf,
    },

    /// Score a script against its source site
    Score {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        scraped: PathBuf,

        #[arg(long)]
        pack: Option<String>,

        /// Fail on any warning
        #[arg(long)]
        strict: bool,
    },

    /// Apply deterministic repairs to a script
    Autofix {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        scraped: PathBuf,

        #[arg(long)]
        pack: Option<String>,

        /// Write the repaired script here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rewrite one section (hook, feature1, feature2, feature3, cta)
    Regenerate {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        scraped: PathBuf,

        #[arg(long)]
        section: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Iterate on weak sections until the quality target is met
    Improve {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        scraped: PathBuf,

        /// Target score (default: config min score)
        #[arg(long)]
        target: Option<f64>,

        #[arg(long)]
        max_steps: Option<usize>,

        /// Template profile JSON for scene pacing
        #[arg(long)]
        template: Option<PathBuf>,

        #[arg(long)]
        no_autofix: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run classify, ground, autofix and score, then persist for a root
    Guard {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        scraped: PathBuf,

        #[command(flatten)]
        root: RootArgs,

        #[arg(long)]
        pack: Option<String>,
    },

    /// Inspect versions of a root
    Versions {
        #[command(subcommand)]
        action: VersionsAction,
    },

    /// Promote a version (pins it, unpins the rest)
    Promote {
        #[command(flatten)]
        root: RootArgs,

        #[arg(long)]
        job: String,
    },

    /// Record the operator verdict on a version
    Outcome {
        #[command(flatten)]
        root: RootArgs,

        #[arg(long)]
        job: String,

        verdict: Verdict,
    },

    /// Recommend per-segment auto-promote thresholds from history
    Calibrate {
        #[command(flatten)]
        root: RootArgs,

        /// Write the recommendations into the root's policy
        #[arg(long)]
        apply: bool,
    },

    /// Evaluate pending auto-promotions once
    Sweep,
}

#[derive(Subcommand)]
enum VersionsAction {
    /// List versions with status and quality
    List {
        #[command(flatten)]
        root: RootArgs,
    },

    /// Rank versions and show the recommended one
    Recommend {
        #[command(flatten)]
        root: RootArgs,
    },

    /// Label or archive a version
    Meta {
        #[command(flatten)]
        root: RootArgs,

        #[arg(long)]
        job: String,

        /// New label; empty string clears it
        #[arg(long)]
        label: Option<String>,

        #[arg(long, conflicts_with = "unarchive")]
        archive: bool,

        #[arg(long)]
        unarchive: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Verdict {
    Accepted,
    Rejected,
    Clear,
}

impl Verdict {
    fn outcome(self) -> Option<Outcome> {
        match self {
            Self::Accepted => Some(Outcome::Accepted),
            Self::Rejected => Some(Outcome::Rejected),
            Self::Clear => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    scriptgate_core::init_tracing(cli.json, level);

    let mut config =
        EngineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let result = run(cli.command, &config).await;
    METRICS.flush();
    result
}

async fn run(command: Commands, config: &EngineConfig) -> Result<()> {
    match command {
        Commands::Classify { scraped, pack } => cmd_classify(&scraped, pack.as_deref()),
        Commands::Ground { scraped } => cmd_ground(&scraped),
        Commands::Score {
            script,
            scraped,
            pack,
            strict,
        } => cmd_score(config, &script, &scraped, pack.as_deref(), strict),
        Commands::Autofix {
            script,
            scraped,
            pack,
            output,
        } => cmd_autofix(&script, &scraped, pack.as_deref(), output.as_deref()),
        Commands::Regenerate {
            script,
            scraped,
            section,
            output,
        } => cmd_regenerate(&script, &scraped, &section, output.as_deref()),
        Commands::Improve {
            script,
            scraped,
            target,
            max_steps,
            template,
            no_autofix,
            output,
        } => cmd_improve(
            config,
            &script,
            &scraped,
            ImproveArgs {
                target,
                max_steps,
                template,
                no_autofix,
            },
            output.as_deref(),
        ),
        Commands::Guard {
            script,
            scraped,
            root,
            pack,
        } => {
            let store = open_store(config)?;
            cmd_guard(&store, config, &script, &scraped, &root.root()?, pack).await
        }
        Commands::Versions { action } => {
            let store = open_store(config)?;
            match action {
                VersionsAction::List { root } => cmd_versions_list(&store, &root.root()?).await,
                VersionsAction::Recommend { root } => {
                    cmd_versions_recommend(&store, &root.root()?).await
                }
                VersionsAction::Meta {
                    root,
                    job,
                    label,
                    archive,
                    unarchive,
                } => {
                    let update = VersionMetaUpdate {
                        label: label.map(|l| Some(l).filter(|l| !l.trim().is_empty())),
                        archived: if archive {
                            Some(true)
                        } else if unarchive {
                            Some(false)
                        } else {
                            None
                        },
                    };
                    let version = update_version_meta(&store, &root.root()?, &job, update).await?;
                    print_json(&version)
                }
            }
        }
        Commands::Promote { root, job } => {
            let store = open_store(config)?;
            cmd_promote(&store, &root.root()?, &job).await
        }
        Commands::Outcome { root, job, verdict } => {
            let store = open_store(config)?;
            let version = record_outcome(&store, &root.root()?, &job, verdict.outcome()).await?;
            println!(
                "{} v{} outcome: {}",
                version.id,
                version.version,
                version
                    .meta
                    .outcome
                    .map(|o| format!("{o:?}").to_lowercase())
                    .unwrap_or_else(|| "none".to_string())
            );
            Ok(())
        }
        Commands::Calibrate { root, apply } => {
            let store = open_store(config)?;
            cmd_calibrate(&store, config, &root.root()?, apply).await
        }
        Commands::Sweep => {
            let store = open_store(config)?;
            let report = sweep_pending_promotions(&store, &config.promotion).await?;
            print_json(&report)
        }
    }
}

fn open_store(config: &EngineConfig) -> Result<FsProjectStore> {
    FsProjectStore::new(&config.data_dir)
        .with_context(|| format!("failed to open project store at {:?}", config.data_dir))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn read_script(path: &Path) -> Result<ScriptResult> {
    let raw: serde_json::Value = read_json_file(path)?;
    Ok(normalize_script_payload(&raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_script(script: &ScriptResult, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&to_persisted_script(script)?)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!(path = %path.display(), "script written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_classify(scraped: &Path, pack: Option<&str>) -> Result<()> {
    let scraped: ScrapedData = read_json_file(scraped)?;
    let selection = select_domain_pack(&scraped, pack);
    print_json(&serde_json::json!({
        "pack": selection.pack.id,
        "reason": selection.reason,
        "confidence": selection.confidence,
        "scores": selection.scores,
        "topCandidates": selection.top_candidates,
    }))
}

fn cmd_ground(scraped: &Path) -> Result<()> {
    let scraped: ScrapedData = read_json_file(scraped)?;
    print_json(&extract_grounding_hints(&scraped))
}

fn cmd_score(
    config: &EngineConfig,
    script: &Path,
    scraped: &Path,
    pack: Option<&str>,
    strict: bool,
) -> Result<()> {
    let script = read_script(script)?;
    let scraped: ScrapedData = read_json_file(scraped)?;
    let selection = select_domain_pack(&scraped, pack);
    let quality = config
        .quality
        .clone()
        .strict(strict || config.quality.fail_on_warnings);
    let report = evaluate_script_quality(
        &script,
        &scraped,
        pack_or_general(Some(&selection.pack.id)),
        &quality,
    );
    print_json(&report)?;
    if !report.passed {
        anyhow::bail!(
            "quality gate failed: score {:.1} with {} blocker(s), {} warning(s)",
            report.score,
            report.blocker_count(),
            report.warning_count()
        );
    }
    Ok(())
}

fn cmd_autofix(
    script: &Path,
    scraped: &Path,
    pack: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let script = read_script(script)?;
    let scraped: ScrapedData = read_json_file(scraped)?;
    let selection = select_domain_pack(&scraped, pack);
    let hints = extract_grounding_hints(&scraped);
    let result = autofix_script(
        &script,
        &hints,
        pack_or_general(Some(&selection.pack.id)),
        &scraped,
    );
    for action in &result.actions {
        eprintln!("  fix: {action}");
    }
    write_script(&result.script, output)
}

fn cmd_regenerate(
    script: &Path,
    scraped: &Path,
    section: &str,
    output: Option<&Path>,
) -> Result<()> {
    let section: Section = section.parse()?;
    let script = read_script(script)?;
    let scraped: ScrapedData = read_json_file(scraped)?;
    // the script's own pack stamp wins over classification
    let pack = match script.domain_pack_id.as_deref().and_then(find_pack) {
        Some(pack) => pack,
        None => pack_or_general(Some(&select_domain_pack(&scraped, None).pack.id)),
    };
    let hints = extract_grounding_hints(&scraped);
    let result = regenerate_section(&script, section, &hints, pack, &scraped);
    for action in &result.actions {
        eprintln!("  {section}: {action}");
    }
    write_script(&result.script, output)
}

struct ImproveArgs {
    target: Option<f64>,
    max_steps: Option<usize>,
    template: Option<PathBuf>,
    no_autofix: bool,
}

fn cmd_improve(
    config: &EngineConfig,
    script: &Path,
    scraped: &Path,
    args: ImproveArgs,
    output: Option<&Path>,
) -> Result<()> {
    let script = read_script(script)?;
    let scraped: ScrapedData = read_json_file(scraped)?;
    let mut options = config.improve_options();
    if let Some(target) = args.target {
        options.target_score = target;
    }
    if let Some(max_steps) = args.max_steps {
        options.max_steps = max_steps;
    }
    if args.no_autofix {
        options.autofix = false;
    }
    if let Some(path) = &args.template {
        options.template = Some(read_json_file::<TemplateProfile>(path)?);
    }

    let outcome = run_auto_improve(&script, &scraped, &options);
    for step in &outcome.steps {
        eprintln!(
            "  step {} {}: {:.1} -> {:.1}{}",
            step.step,
            step.section,
            step.score_before,
            step.score_after,
            if step.improved { "" } else { " (no gain)" }
        );
    }
    eprintln!(
        "stopped: {} ({:.1} -> {:.1})",
        outcome.stop_reason, outcome.initial_report.score, outcome.final_report.score
    );
    write_script(&outcome.script, output)
}

async fn cmd_guard(
    store: &dyn ProjectStore,
    config: &EngineConfig,
    script: &Path,
    scraped: &Path,
    root: &ProjectRoot,
    pack: Option<String>,
) -> Result<()> {
    let _span = ProjectSpan::enter(&root.key());
    let script = read_script(script)?;
    let scraped: ScrapedData = read_json_file(scraped)?;
    let output = run_quality_guard(
        &script,
        &scraped,
        &GuardOptions {
            pack_override: pack,
            quality: config.quality.clone(),
            ..GuardOptions::default()
        },
    )?;
    persist_guard_output(store, root, &output)
        .await
        .context("failed to persist guard output")?;

    let report = &output.quality.report;
    println!(
        "{} pack={} score={:.1} passed={} blockers={} warnings={} coverage={:.0}%",
        root,
        output.quality.classification.pack_id,
        report.score,
        report.passed,
        report.blocker_count(),
        report.warning_count(),
        output.quality.grounding_coverage * 100.0
    );
    for blocker in &report.blockers {
        println!("  blocker: {blocker}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

async fn cmd_versions_list(store: &dyn ProjectStore, root: &ProjectRoot) -> Result<()> {
    let file = store.load_versions(root).await?;
    if file.versions.is_empty() {
        println!("No versions for {}", root);
        return Ok(());
    }
    for v in &file.versions {
        let quality = v
            .quality
            .as_ref()
            .map(|q| format!("{:.1}{}", q.score, if q.passed { "" } else { "!" }))
            .unwrap_or_else(|| "-".to_string());
        let mut flags = Vec::new();
        if v.meta.pinned {
            flags.push("pinned");
        }
        if v.meta.archived {
            flags.push("archived");
        }
        if v.artifacts.has_video() {
            flags.push("video");
        }
        println!(
            "v{:<3} {} {:<9} {:<8} q={:<6} {} {}",
            v.version,
            v.id,
            format!("{:?}", v.status).to_lowercase(),
            format!("{:?}", v.mode).to_lowercase(),
            quality,
            flags.join(","),
            v.meta.label.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_versions_recommend(store: &dyn ProjectStore, root: &ProjectRoot) -> Result<()> {
    let learning = collect_outcome_learning(store).await?;
    let file = store.load_versions(root).await?;
    let recommendation = recommend_project_version(&file.versions, &learning);
    print_json(&recommendation)
}

async fn cmd_promote(store: &dyn ProjectStore, root: &ProjectRoot, job: &str) -> Result<()> {
    let result = promote_version(store, root, job).await?;
    if !result.promoted {
        anyhow::bail!("promotion of {} refused: {}", job, result.reason);
    }
    println!("Promoted {} for {}", job, root);
    Ok(())
}

async fn cmd_calibrate(
    store: &dyn ProjectStore,
    config: &EngineConfig,
    root: &ProjectRoot,
    apply: bool,
) -> Result<()> {
    let learning = collect_outcome_learning(store).await?;
    let report = calibrate_thresholds(store, root, &learning, &config.promotion, apply).await?;
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptgate_core::fixtures::{sample_scraped, sample_script};
    use scriptgate_state::{GenerationMode, ProjectVersion, VersionStatus};

    fn write_fixtures(dir: &Path) -> (PathBuf, PathBuf) {
        let script = dir.join("script.json");
        let scraped = dir.join("scraped.json");
        std::fs::write(
            &script,
            serde_json::to_string(&to_persisted_script(&sample_script()).unwrap()).unwrap(),
        )
        .unwrap();
        std::fs::write(&scraped, serde_json::to_string(&sample_scraped()).unwrap()).unwrap();
        (script, scraped)
    }

    fn config_at(dir: &Path) -> EngineConfig {
        EngineConfig {
            data_dir: dir.join("data"),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scriptgate",
            "outcome",
            "--url",
            "https://a.io",
            "--owner",
            "o",
            "--job",
            "j1",
            "rejected",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Outcome {
                verdict: Verdict::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn score_passes_sample_and_fails_broken() {
        let dir = tempfile::tempdir().unwrap();
        let (script, scraped) = write_fixtures(dir.path());
        let config = config_at(dir.path());
        cmd_score(&config, &script, &scraped, Some("saas"), false).unwrap();

        let mut broken = sample_script();
        broken.features.truncate(1);
        let broken_path = dir.path().join("broken.json");
        std::fs::write(
            &broken_path,
            serde_json::to_string(&to_persisted_script(&broken).unwrap()).unwrap(),
        )
        .unwrap();
        let err = cmd_score(&config, &broken_path, &scraped, Some("saas"), false).unwrap_err();
        assert!(err.to_string().contains("quality gate failed"));
    }

    #[test]
    fn autofix_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let (script, scraped) = write_fixtures(dir.path());
        let out = dir.path().join("fixed.json");
        cmd_autofix(&script, &scraped, Some("saas"), Some(&out)).unwrap();
        let fixed = read_script(&out).unwrap();
        assert_eq!(fixed.features.len(), 3);
        assert!(fixed.scene_weights.is_some());
    }

    #[test]
    fn regenerate_rejects_unknown_section() {
        let dir = tempfile::tempdir().unwrap();
        let (script, scraped) = write_fixtures(dir.path());
        let err = cmd_regenerate(&script, &scraped, "outro", None).unwrap_err();
        assert!(err.to_string().contains("unknown section"));
    }

    #[tokio::test]
    async fn guard_persists_and_promote_refuses_without_video() {
        let dir = tempfile::tempdir().unwrap();
        let (script, scraped) = write_fixtures(dir.path());
        let config = config_at(dir.path());
        let store = open_store(&config).unwrap();
        let root = ProjectRoot::new("https://acmeflow.io", "acct-1").unwrap();

        cmd_guard(&store, &config, &script, &scraped, &root, Some("saas".into()))
            .await
            .unwrap();
        assert!(store.read_quality(&root).await.unwrap().into_option().is_some());

        let mut file = store.load_versions(&root).await.unwrap();
        let mut v = ProjectVersion::queued("job-1", 1, GenerationMode::Generate);
        v.status = VersionStatus::Completed;
        file.versions.push(v);
        store.write_versions(&file).await.unwrap();

        let err = cmd_promote(&store, &root, "job-1").await.unwrap_err();
        assert!(err.to_string().contains("missing-video"));
        cmd_versions_list(&store, &root).await.unwrap();
        cmd_versions_recommend(&store, &root).await.unwrap();
        cmd_calibrate(&store, &config, &root, true).await.unwrap();

        let file = store.load_versions(&root).await.unwrap();
        assert!(file.policy.and_then(|p| p.last_calibration).is_some());
    }
}
