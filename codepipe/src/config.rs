//! Configuration types for pipeline runs and the engine.

use crate::core::{StageSequence, DEFAULT_STAGES};
use crate::errors::PipelineResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for one `execute_pipeline` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Resume the task's latest state instead of starting fresh.
    #[serde(default)]
    pub continue_from_current: bool,
    /// Checkpoint before every stage.
    #[serde(default)]
    pub create_checkpoints: bool,
    /// Pause for feedback after every non-terminal stage.
    #[serde(default)]
    pub wait_for_feedback: bool,
    /// Wrap every stage execution in a repository transaction.
    #[serde(default)]
    pub use_transactions: bool,
    /// Most checkpoint rollbacks one run performs before giving up.
    #[serde(default = "default_max_recoveries")]
    pub max_recoveries: u32,
}

fn default_max_recoveries() -> u32 {
    3
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            continue_from_current: false,
            create_checkpoints: false,
            wait_for_feedback: false,
            use_transactions: false,
            max_recoveries: default_max_recoveries(),
        }
    }
}

impl RunOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes from the latest state.
    #[must_use]
    pub fn with_continue_from_current(mut self, enabled: bool) -> Self {
        self.continue_from_current = enabled;
        self
    }

    /// Checkpoints before every stage.
    #[must_use]
    pub fn with_checkpoints(mut self, enabled: bool) -> Self {
        self.create_checkpoints = enabled;
        self
    }

    /// Pauses for feedback between stages.
    #[must_use]
    pub fn with_feedback(mut self, enabled: bool) -> Self {
        self.wait_for_feedback = enabled;
        self
    }

    /// Runs each stage in a transaction.
    #[must_use]
    pub fn with_transactions(mut self, enabled: bool) -> Self {
        self.use_transactions = enabled;
        self
    }

    /// Sets the rollback budget.
    #[must_use]
    pub fn with_max_recoveries(mut self, max: u32) -> Self {
        self.max_recoveries = max;
        self
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "codepipe=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches JSON output on or off.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Defaults for pipeline runs.
    #[serde(default)]
    pub run: RunOptions,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Stage names in execution order.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Whether `execute_single_stage` checkpoints when the caller does not say.
    #[serde(default = "default_single_stage_checkpoint")]
    pub single_stage_checkpoint: bool,
}

fn default_stages() -> Vec<String> {
    DEFAULT_STAGES.iter().map(ToString::to_string).collect()
}

fn default_single_stage_checkpoint() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run: RunOptions::default(),
            logging: LoggingConfig::default(),
            stages: default_stages(),
            single_stage_checkpoint: default_single_stage_checkpoint(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Serialization` if it is malformed.
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// The configured stage sequence.
    #[must_use]
    pub fn sequence(&self) -> StageSequence {
        StageSequence::new(self.stages.iter().cloned())
    }
}
