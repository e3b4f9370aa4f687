//! Engine configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment:
//!
//! - `SCRIPTGATE_DATA_DIR` - root of the project store (default `.scriptgate`)
//! - `SCRIPTGATE_MIN_SCORE` - quality pass score
//! - `SCRIPTGATE_MAX_WARNINGS` - warnings tolerated before failing
//! - `SCRIPTGATE_STRICT` - `true`/`1` fails on any warning

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Result, ScriptGateError};
use crate::improve::ImproveOptions;
use crate::promotion::PromotionConfig;
use crate::quality::QualityConfig;

pub const DEFAULT_DATA_DIR: &str = ".scriptgate";

/// Improve-loop defaults that can live in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImproveDefaults {
    pub max_steps: usize,
    pub max_attempts_per_section: usize,
    pub autofix: bool,
    pub queue_rerender: bool,
    pub auto_promote_if_winner: bool,
}

impl Default for ImproveDefaults {
    fn default() -> Self {
        let options = ImproveOptions::default();
        Self {
            max_steps: options.max_steps,
            max_attempts_per_section: options.max_attempts_per_section,
            autofix: options.autofix,
            queue_rerender: options.queue_rerender,
            auto_promote_if_winner: options.auto_promote_if_winner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub quality: QualityConfig,
    pub improve: ImproveDefaults,
    pub promotion: PromotionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            quality: QualityConfig::default(),
            improve: ImproveDefaults::default(),
            promotion: PromotionConfig::default(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ScriptGateError::Config(e.to_string()))
    }

    /// Defaults, optionally replaced by a TOML file, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SCRIPTGATE_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("SCRIPTGATE_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("SCRIPTGATE_MIN_SCORE") {
            self.quality.min_score = raw.trim().parse().map_err(|_| {
                ScriptGateError::Config(format!("SCRIPTGATE_MIN_SCORE is not a number: '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("SCRIPTGATE_MAX_WARNINGS") {
            self.quality.max_warnings = raw.trim().parse().map_err(|_| {
                ScriptGateError::Config(format!(
                    "SCRIPTGATE_MAX_WARNINGS is not a count: '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = lookup("SCRIPTGATE_STRICT") {
            self.quality.fail_on_warnings = parse_bool(&raw).ok_or_else(|| {
                ScriptGateError::Config(format!("SCRIPTGATE_STRICT is not a boolean: '{raw}'"))
            })?;
        }
        Ok(())
    }

    /// Improve options seeded from this config; the target follows the quality bar.
    pub fn improve_options(&self) -> ImproveOptions {
        ImproveOptions {
            target_score: self.quality.min_score,
            max_warnings: self.quality.max_warnings,
            max_steps: self.improve.max_steps,
            max_attempts_per_section: self.improve.max_attempts_per_section,
            autofix: self.improve.autofix,
            queue_rerender: self.improve.queue_rerender,
            auto_promote_if_winner: self.improve.auto_promote_if_winner,
            quality: self.quality.clone(),
            ..ImproveOptions::default()
        }
    }
}
