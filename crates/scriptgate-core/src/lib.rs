//! Scriptgate Core Library
//!
//! Quality guard and promotion decision engine for generated product-video
//! scripts: classify the source site, mine grounding facts, score and repair
//! scripts, iterate on weak sections, and rank/promote rendered versions.

pub mod autofix;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod fixtures;
pub mod grounding;
pub mod improve;
pub mod jobs;
pub mod learning;
pub mod metrics;
pub mod obs;
pub mod packs;
pub mod pipeline;
pub mod promotion;
pub mod quality;
pub mod ranking;
pub mod regenerate;
pub mod telemetry;

pub use domain::{
    normalize_script_payload, to_persisted_script, Feature, Result, ScrapedData, ScrapedLink,
    ScriptGateError, ScriptResult, Section, TemplateProfile,
};

pub use autofix::{autofix_script, AutoFixResult};
pub use classifier::{select_domain_pack, DomainPackSelection, PackCandidate, SelectionReason};
pub use config::EngineConfig;
pub use grounding::{extract_grounding_hints, grounding_coverage, has_grounding_signal, GroundingHints};
pub use improve::{
    build_improvement_plan, run_auto_improve, AutoImproveOutcome, ImproveOptions, ImproveStep,
    ImprovementPlan, StopReason,
};
pub use jobs::{
    improve_and_queue, spawn_watchdog, sweep_pending_promotions, EnqueueRequest, JobQueue,
    RenderJob, RenderOutcome, Renderer, SweepReport,
};
pub use learning::{collect_outcome_learning, laplace_rate, OutcomeLearning};
pub use packs::{find_pack, pack_or_general, DomainPack};
pub use pipeline::{run_quality_guard, GuardOptions, QualityFile};
pub use promotion::{
    calibrate_thresholds, evaluate_auto_promote, promote_version, record_outcome,
    update_version_meta, CalibrationReport, PromotionConfig, PromotionReason, PromotionResult,
};
pub use quality::{evaluate_script_quality, QualityConfig, QualityPenalties, QualityReport};
pub use ranking::{recommend_project_version, VersionRecommendation};
pub use regenerate::{regenerate_section, rescale_scene_weights, RegenerateSectionResult};

pub use metrics::METRICS;
pub use obs::ProjectSpan;
pub use telemetry::init_tracing;

/// Scriptgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
