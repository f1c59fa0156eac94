//! Policy and runtime configuration.
//!
//! The three policy knobs (entropy alert threshold, QBER abort threshold
//! and the min-entropy assumption behind the health cutoffs) are read
//! from configuration so they can be retuned without code changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Min-entropy outside `(0, 1]`.
    #[error("min_entropy_per_bit must be in (0, 1], got {0}")]
    InvalidMinEntropy(f64),
    /// Entropy threshold outside `[0, 1]`.
    #[error("entropy_threshold must be in [0, 1], got {0}")]
    InvalidEntropyThreshold(f64),
    /// QBER threshold outside `[0, 1]`.
    #[error("qber_threshold must be in [0, 1], got {0}")]
    InvalidQberThreshold(f64),
    /// History capacity of zero.
    #[error("history_capacity must be positive")]
    InvalidHistoryCapacity,
    /// Trend window shorter than two samples.
    #[error("trend_window must be at least 2")]
    InvalidTrendWindow,
    /// Pattern source without a pattern.
    #[error("pattern source requires a non-empty `pattern`")]
    MissingPattern,
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Security policy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Entropy below this raises a low-entropy alert.
    pub entropy_threshold: f64,
    /// QBER at or above this marks a session insecure.
    pub qber_threshold: f64,
    /// Assumed min-entropy per bit; drives the health cutoffs.
    pub min_entropy_per_bit: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 0.90,
            qber_threshold: 0.11,
            min_entropy_per_bit: 0.80, // conservative until a measured estimate exists
        }
    }
}

impl PolicyConfig {
    /// Validates the policy values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = self.min_entropy_per_bit;
        if !h.is_finite() || h <= 0.0 || h > 1.0 {
            return Err(ConfigError::InvalidMinEntropy(h));
        }
        if !(0.0..=1.0).contains(&self.entropy_threshold) {
            return Err(ConfigError::InvalidEntropyThreshold(self.entropy_threshold));
        }
        if !(0.0..=1.0).contains(&self.qber_threshold) {
            return Err(ConfigError::InvalidQberThreshold(self.qber_threshold));
        }
        Ok(())
    }
}

/// Which bit-source backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Operating-system CSPRNG.
    #[default]
    Os,
    /// Deterministic ChaCha20 stream.
    Seeded,
    /// Fixed repeating pattern (test double).
    Pattern,
}

/// Bit-source selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Which backend to use.
    pub kind: SourceKind,
    /// Seed for the `seeded` backend.
    pub seed: Option<u64>,
    /// Bit pattern for the `pattern` backend.
    pub pattern: Option<String>,
}

impl SourceConfig {
    /// Validates the source selection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == SourceKind::Pattern
            && self.pattern.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingPattern);
        }
        Ok(())
    }
}

/// Rolling-history and trend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples kept per history.
    pub history_capacity: usize,
    /// Trailing samples used for the trend fit.
    pub trend_window: usize,
    /// Slopes below this raise a declining-trend alert.
    pub trend_slope_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 200,
            trend_window: 5,
            trend_slope_threshold: -0.01,
        }
    }
}

impl MonitorConfig {
    /// Validates the monitor settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidHistoryCapacity);
        }
        if self.trend_window < 2 {
            return Err(ConfigError::InvalidTrendWindow);
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for captured datasets.
    pub capture_dir: PathBuf,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("./captures"),
            metrics_port: 9090,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Security policy thresholds.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Bit-source selection.
    #[serde(default)]
    pub source: SourceConfig,
    /// Anomaly monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.source.validate()?;
        self.monitor.validate()
    }
}
