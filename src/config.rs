// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration file types and parsing for logflow.
//!
//! JSON5 configuration format supporting:
//! - Sampling strategy, global rate and per-path / per-logger overrides
//! - Buffer capacity, backpressure policy and utilization thresholds
//! - Comments and trailing commas
//!
//! Every field has a default, so `{}` is a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::BackpressureStrategy;
use crate::sampling::SamplingStrategy;

/// Startup configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Sampling engine settings (swappable at runtime)
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Buffer and backpressure settings (fixed for the pipeline's lifetime)
    #[serde(default)]
    pub buffer: BufferConfig,
}

/// Sampling engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingConfig {
    /// When false every event is kept and nothing is counted
    pub enabled: bool,

    pub strategy: SamplingStrategy,

    /// Global keep probability in [0, 1]
    pub rate: f64,

    /// COUNT_BASED keeps every Nth event
    pub count_interval: u64,

    /// Keep WARN and ERROR regardless of strategy
    pub always_sample_above_warn: bool,

    /// Events/sec above which ADAPTIVE halves the rate
    pub high_load_threshold: u64,

    /// Events/sec above which ADAPTIVE keeps a tenth of the rate
    pub critical_load_threshold: u64,

    /// Ordered path overrides; first match wins
    pub path_rates: Vec<PathRate>,

    /// Ordered logger-name prefix overrides, consulted after path overrides
    pub logger_rates: Vec<LoggerRate>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: SamplingStrategy::Rate,
            rate: 1.0,
            count_interval: 10,
            always_sample_above_warn: true,
            high_load_threshold: 1000,
            critical_load_threshold: 5000,
            path_rates: Vec::new(),
            logger_rates: Vec::new(),
        }
    }
}

/// Rate override for request paths matching `pattern`
///
/// Patterns: `/api/**` (prefix), `/api/*` (one segment), `*.json` (suffix),
/// anything else is an exact match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathRate {
    pub pattern: String,
    pub rate: f64,
}

/// Rate override for loggers whose name starts with `prefix`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggerRate {
    pub prefix: String,
    pub rate: f64,
}

/// Buffer and backpressure settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferConfig {
    /// Maximum number of buffered events
    pub capacity: usize,

    pub backpressure_policy: BackpressureStrategy,

    /// Utilization percentage that triggers the first warning
    pub warning_threshold: u8,

    /// Utilization percentage that triggers the critical warning
    pub critical_threshold: u8,

    /// SAMPLE policy keeps every Nth event under pressure
    pub sample_rate_under_pressure: u64,

    /// DROP_LOW_PRIORITY bounded wait for WARN and above
    pub low_priority_wait_ms: u64,

    /// Spill destination for DROP_LOW_PRIORITY and OVERFLOW_TO_FILE
    pub overflow_path: PathBuf,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 8192,
            backpressure_policy: BackpressureStrategy::DropLowPriority,
            warning_threshold: 80,
            critical_threshold: 95,
            sample_rate_under_pressure: 10,
            low_priority_wait_ms: 100,
            overflow_path: PathBuf::from("logs/overflow.log"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to JSON5 string (with pretty formatting)
    pub fn to_json5(&self) -> String {
        // Plain JSON is valid JSON5; json5 has no pretty printer
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5();
        std::fs::write(path, content)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampling.validate()?;
        self.buffer.validate()
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_rate("sampling.rate", self.rate)?;

        if self.count_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sampling.countInterval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.high_load_threshold > self.critical_load_threshold {
            return Err(ConfigError::InvalidValue {
                field: "sampling.highLoadThreshold".to_string(),
                reason: format!(
                    "{} exceeds criticalLoadThreshold {}",
                    self.high_load_threshold, self.critical_load_threshold
                ),
            });
        }

        for (idx, entry) in self.path_rates.iter().enumerate() {
            let field = format!("sampling.pathRates[{}]", idx);
            if entry.pattern.is_empty() {
                return Err(ConfigError::EmptyPattern { field });
            }
            validate_rate(&field, entry.rate)?;
        }

        for (idx, entry) in self.logger_rates.iter().enumerate() {
            let field = format!("sampling.loggerRates[{}]", idx);
            if entry.prefix.is_empty() {
                return Err(ConfigError::EmptyPattern { field });
            }
            validate_rate(&field, entry.rate)?;
        }

        Ok(())
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "buffer.capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.critical_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                field: "buffer.criticalThreshold".to_string(),
                reason: format!("{} is not a percentage", self.critical_threshold),
            });
        }

        if self.warning_threshold > self.critical_threshold {
            return Err(ConfigError::InvalidValue {
                field: "buffer.warningThreshold".to_string(),
                reason: format!(
                    "{} exceeds criticalThreshold {}",
                    self.warning_threshold, self.critical_threshold
                ),
            });
        }

        if self.sample_rate_under_pressure == 0 {
            return Err(ConfigError::InvalidValue {
                field: "buffer.sampleRateUnderPressure".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.low_priority_wait_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "buffer.lowPriorityWaitMs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.overflow_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "buffer.overflowPath".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_rate(field: &str, rate: f64) -> Result<(), ConfigError> {
    // Also rejects NaN
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::InvalidRate {
            field: field.to_string(),
            rate,
        });
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(PathBuf, String),
    ParseError(String),
    InvalidRate { field: String, rate: f64 },
    InvalidValue { field: String, reason: String },
    EmptyPattern { field: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to read config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::InvalidRate { field, rate } => {
                write!(f, "invalid rate {} for {}: must be within [0, 1]", rate, field)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for {}: {}", field, reason)
            }
            ConfigError::EmptyPattern { field } => {
                write!(f, "empty pattern in {}", field)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.sampling.enabled);
        assert_eq!(config.sampling.strategy, SamplingStrategy::Rate);
        assert_eq!(config.sampling.rate, 1.0);
        assert_eq!(config.buffer.capacity, 8192);
        assert_eq!(
            config.buffer.backpressure_policy,
            BackpressureStrategy::DropLowPriority
        );
        assert_eq!(config.buffer.overflow_path, PathBuf::from("logs/overflow.log"));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let json5 = r#"{
            sampling: {
                strategy: "ADAPTIVE",
                rate: 0.25,
                countInterval: 5,
                alwaysSampleAboveWarn: false,
                highLoadThreshold: 200,
                criticalLoadThreshold: 800,
                pathRates: [
                    { pattern: "/health/**", rate: 0.01 },
                    { pattern: "*.css", rate: 0 },
                ],
                loggerRates: [
                    { prefix: "com.noisy", rate: 0.1 },
                ],
            },
            buffer: {
                capacity: 256,
                backpressurePolicy: "OVERFLOW_TO_FILE",
                warningThreshold: 70,
                criticalThreshold: 90,
                sampleRateUnderPressure: 4,
                lowPriorityWaitMs: 250,
                overflowPath: "/var/log/app/overflow.log",
            },
        }"#;

        let config = Config::parse(json5).unwrap();
        assert_eq!(config.sampling.strategy, SamplingStrategy::Adaptive);
        assert_eq!(config.sampling.rate, 0.25);
        assert!(!config.sampling.always_sample_above_warn);
        assert_eq!(config.sampling.path_rates.len(), 2);
        assert_eq!(config.sampling.path_rates[1].rate, 0.0);
        assert_eq!(config.sampling.logger_rates[0].prefix, "com.noisy");
        assert_eq!(config.buffer.capacity, 256);
        assert_eq!(
            config.buffer.backpressure_policy,
            BackpressureStrategy::OverflowToFile
        );
        assert_eq!(config.buffer.low_priority_wait_ms, 250);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_config_with_comments() {
        let json5 = r#"{
            // Shed debug noise
            sampling: { strategy: "PRIORITY", rate: 0.5, },
        }"#;

        let config = Config::parse(json5).unwrap();
        assert_eq!(config.sampling.strategy, SamplingStrategy::Priority);
        // Untouched section keeps its defaults
        assert_eq!(config.buffer, BufferConfig::default());
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let err = Config::parse(r#"{ sampling: { strategy: "RANDOM" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));

        let err = Config::parse(r#"{ buffer: { backpressurePolicy: "drop_oldest" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validate_rate_bounds() {
        let mut config = Config::default();
        config.sampling.rate = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRate {
                field: "sampling.rate".to_string(),
                rate: 1.5
            })
        );

        config.sampling.rate = f64::NAN;
        assert!(config.validate().is_err());

        config.sampling.rate = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_override_rates() {
        let mut config = Config::default();
        config.sampling.path_rates.push(PathRate {
            pattern: "/api/**".to_string(),
            rate: -0.1,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sampling.pathRates[0]"));

        let mut config = Config::default();
        config.sampling.logger_rates.push(LoggerRate {
            prefix: String::new(),
            rate: 0.5,
        });
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyPattern {
                field: "sampling.loggerRates[0]".to_string()
            })
        );
    }

    #[test]
    fn test_validate_count_interval() {
        let mut config = Config::default();
        config.sampling.count_interval = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_load_thresholds() {
        let mut config = Config::default();
        config.sampling.high_load_threshold = 6000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("criticalLoadThreshold"));
    }

    #[test]
    fn test_validate_buffer() {
        let mut config = Config::default();
        config.buffer.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.warning_threshold = 96;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.critical_threshold = 101;
        config.buffer.warning_threshold = 50;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.sample_rate_under_pressure = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.overflow_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from_file(Path::new("/nonexistent/logflow.json5")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
        assert!(err.to_string().contains("/nonexistent/logflow.json5"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.sampling.strategy = SamplingStrategy::HeadBased;
        config.sampling.rate = 0.3;
        config.sampling.path_rates.push(PathRate {
            pattern: "/api/*".to_string(),
            rate: 0.75,
        });
        config.buffer.backpressure_policy = BackpressureStrategy::Sample;

        // Serialize to JSON5 and parse back
        let json5 = config.to_json5();
        assert!(json5.contains("\"HEAD_BASED\""));
        assert!(json5.contains("\"pathRates\""));
        let parsed = Config::parse(&json5).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logflow.json5");

        let mut config = Config::default();
        config.buffer.capacity = 64;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
