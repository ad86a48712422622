//! Runtime and Testing Configuration
//!
//! Provides configuration loading for the runtime and the testing engine.
//! Supports TOML files with `MARIONETTE_` environment overrides.

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix of environment overrides, e.g. `MARIONETTE_SCHEDULING__ITERATIONS=50`
pub const ENV_PREFIX: &str = "MARIONETTE";

/// Complete configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Configuration {
    pub scheduling: SchedulingConfig,
    pub runtime: RuntimeSettings,
    pub logging: LoggingConfig,

    /// Where the testing engine writes the trace of a failing iteration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_output: Option<PathBuf>,
}

/// How scheduling points are treated
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Scheduling points return immediately, actors run freely
    #[default]
    Production,
    /// One operation runs at a time, chosen by an exploration strategy
    Exploration,
}

/// Exploration strategy selection
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Random,
    Pct,
    Replay,
}

/// Which queued event the interpreter dequeues next
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DequeuePolicy {
    /// First event the current state does not defer
    #[default]
    FirstNonDeferred,
    /// First event the current state has no goto, push or action binding for
    FirstUnhandled,
}

/// Scheduling section
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    pub mode: SchedulingMode,
    pub strategy: StrategyKind,

    /// Number of exploration iterations
    pub iterations: u32,

    /// Scheduling decisions per iteration before the run is cut off
    pub max_steps: u64,

    /// Seed for the random and PCT strategies, drawn at random when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Number of priority change points for PCT
    pub pct_change_points: u32,

    /// Trace file fed to the replay strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_trace: Option<PathBuf>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            mode: SchedulingMode::Production,
            strategy: StrategyKind::Random,
            iterations: 100,
            max_steps: 10_000,
            seed: None,
            pct_change_points: 2,
            replay_trace: None,
        }
    }
}

/// Runtime section
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeSettings {
    pub dequeue_policy: DequeuePolicy,

    /// Identity generation of the first runtime created from this configuration
    pub generation: u64,
}

/// Logging section
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    pub ansi: bool,

    /// Emit one JSON object per line instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            json: false,
        }
    }
}

impl Configuration {
    /// Defaults with exploration mode switched on
    pub fn exploration() -> Self {
        let mut config = Self::default();
        config.scheduling.mode = SchedulingMode::Exploration;
        config
    }

    /// Load configuration from a TOML file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration: {:?}", path);

        let builder = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(Self::environment());

        Self::finish(builder.build().context("Failed to build configuration")?)
    }

    /// Parse configuration from TOML text with environment overrides
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .add_source(Self::environment());

        Self::finish(builder.build().context("Failed to build configuration")?)
    }

    /// Write this configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write configuration to {:?}", path))
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        parsed.validate()?;
        debug!(
            mode = ?parsed.scheduling.mode,
            strategy = ?parsed.scheduling.strategy,
            iterations = parsed.scheduling.iterations,
            "Configuration loaded"
        );
        Ok(parsed)
    }

    /// Reject bounds that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.scheduling.iterations > 0,
            "scheduling.iterations must be at least 1"
        );
        ensure!(
            self.scheduling.max_steps > 0,
            "scheduling.max_steps must be at least 1"
        );
        ensure!(
            self.scheduling.strategy != StrategyKind::Replay
                || self.scheduling.replay_trace.is_some(),
            "scheduling.replay_trace is required by the replay strategy"
        );
        Ok(())
    }

    pub fn with_mode(mut self, mode: SchedulingMode) -> Self {
        self.scheduling.mode = mode;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.scheduling.strategy = strategy;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.scheduling.iterations = iterations;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.scheduling.max_steps = max_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.scheduling.seed = Some(seed);
        self
    }

    pub fn with_pct_change_points(mut self, change_points: u32) -> Self {
        self.scheduling.pct_change_points = change_points;
        self
    }

    pub fn with_replay_trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.scheduling.strategy = StrategyKind::Replay;
        self.scheduling.replay_trace = Some(path.into());
        self
    }

    pub fn with_dequeue_policy(mut self, policy: DequeuePolicy) -> Self {
        self.runtime.dequeue_policy = policy;
        self
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.runtime.generation = generation;
        self
    }

    pub fn with_trace_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_output = Some(path.into());
        self
    }

    pub fn is_exploration(&self) -> bool {
        self.scheduling.mode == SchedulingMode::Exploration
    }
}
