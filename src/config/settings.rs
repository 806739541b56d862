//! Engine settings.
//!
//! Loaded from ./critiq.yml or ~/.config/critiq/critiq.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine-wide settings shared by every pipeline.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Iteration loop settings.
    pub engine: EngineConfig,

    /// Timeouts for external collaborators.
    pub timeouts: TimeoutConfig,

    /// Concurrency limits.
    pub concurrency: ConcurrencyConfig,

    /// Report output settings.
    pub report: ReportConfig,

    /// Validation bundle location.
    pub bundles: BundlesConfig,
}

impl EngineSettings {
    /// Load settings with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. critiq.yml in current directory
    /// 3. ~/.config/critiq/critiq.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            let settings =
                Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            settings.validate()?;
            return Ok(settings);
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try project config
        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(settings) => {
                    log::info!("Loaded config from {}", project_config.display());
                    settings.validate()?;
                    return Ok(settings);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", project_config.display(), e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(settings) => {
                        log::info!("Loaded config from {}", user_config.display());
                        settings.validate()?;
                        return Ok(settings);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let settings: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_iterations == 0 {
            eyre::bail!("engine.max_iterations must be > 0");
        }
        if !(0.0..=1.0).contains(&self.engine.margin) {
            eyre::bail!("engine.margin must be within [0, 1], got {}", self.engine.margin);
        }
        if self.timeouts.generator_ms == 0 || self.timeouts.reference_ms == 0 {
            eyre::bail!("timeouts must be > 0");
        }
        if self.concurrency.max_lineages == 0 {
            eyre::bail!("concurrency.max_lineages must be > 0");
        }
        if self.report.display_limit == 0 {
            eyre::bail!("report.display_limit must be > 0");
        }
        Ok(())
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.generator_ms)
    }

    pub fn reference_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.reference_ms)
    }
}

/// What to keep when a run ends without acceptance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BestEffortPolicy {
    /// Keep nothing beyond the final result
    Discard,
    /// Keep the highest-scoring candidate seen
    #[default]
    RetainBest,
}

/// Iteration loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum evaluation passes per lineage.
    pub max_iterations: u32,

    /// How far below the threshold a score may fall and still be refined.
    pub margin: f64,

    /// Transient failures tolerated per run.
    pub retry_budget: u32,

    pub best_effort: BestEffortPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            margin: 0.10,
            retry_budget: 2,
            best_effort: BestEffortPolicy::RetainBest,
        }
    }
}

/// Timeouts for external collaborators.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout per generator call in milliseconds.
    pub generator_ms: u64,

    /// Timeout per reference lookup in milliseconds.
    pub reference_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generator_ms: 60_000,
            reference_ms: 5_000,
        }
    }
}

/// Concurrency limits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Lineages evaluated at once by the batch runner.
    pub max_lineages: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_lineages: 4 }
    }
}

/// Report output settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Items shown per list when rendering.
    pub display_limit: usize,

    /// JSONL file terminal results are appended to.
    pub sink_path: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            display_limit: 10,
            sink_path: None,
        }
    }
}

/// Validation bundle location.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BundlesConfig {
    pub dir: Option<PathBuf>,
}
