//! Runtime configuration.
//!
//! Loaded from `~/.calmline/config.toml`, or from the path in `CALMLINE_CONFIG`.
//! A missing file yields the defaults. Every section and field is optional.
//!
//! ```toml
//! [detector]
//! text_weight = 0.6
//! audio_weight = 0.4
//! enable_audio = false
//! confirmation_window = 1
//! escalation_timeout_seconds = 120
//! idle_timeout_seconds = 1800
//!
//! [safety]
//! max_response_words = 18
//!
//! [daemon]
//! sweep_interval_seconds = 60
//!
//! [[thresholds]]
//! state = "calm"
//! min = 0.0
//! max = 0.2
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::state::ThresholdTable;

pub const CONFIG_ENV_VAR: &str = "CALMLINE_CONFIG";

const CONFIG_DIR: &str = ".calmline";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalmlineConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub thresholds: ThresholdTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,
    #[serde(default = "default_audio_weight")]
    pub audio_weight: f64,
    #[serde(default)]
    pub enable_audio: bool,
    /// Consecutive inputs a new candidate state must persist for.
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window: u32,
    #[serde(default = "default_escalation_timeout_seconds")]
    pub escalation_timeout_seconds: u64,
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            text_weight: default_text_weight(),
            audio_weight: default_audio_weight(),
            enable_audio: false,
            confirmation_window: default_confirmation_window(),
            escalation_timeout_seconds: default_escalation_timeout_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_max_response_words")]
    pub max_response_words: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_response_words: default_max_response_words(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_text_weight() -> f64 {
    0.6
}

fn default_audio_weight() -> f64 {
    0.4
}

fn default_confirmation_window() -> u32 {
    1
}

fn default_escalation_timeout_seconds() -> u64 {
    120
}

fn default_idle_timeout_seconds() -> u64 {
    30 * 60
}

fn default_max_response_words() -> usize {
    18
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

impl CalmlineConfig {
    /// Rejects configurations the engine cannot run with.
    ///
    /// Weights summing above 1 only warn; fusion clamps the result.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let detector = &self.detector;
        for (name, weight) in [
            ("text_weight", detector.text_weight),
            ("audio_weight", detector.audio_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::MalformedWeights(format!(
                    "{name} must be a finite non-negative number (got {weight})"
                )));
            }
        }
        if detector.text_weight == 0.0 && detector.audio_weight == 0.0 {
            return Err(ConfigError::MalformedWeights(
                "text_weight and audio_weight cannot both be zero".to_string(),
            ));
        }
        let weight_sum = detector.text_weight + detector.audio_weight;
        if weight_sum > 1.0 {
            warn!(
                text_weight = detector.text_weight,
                audio_weight = detector.audio_weight,
                "Detector weights sum above 1; fused scores will be clamped"
            );
        }

        if detector.confirmation_window < 1 {
            return Err(ConfigError::InvalidValue {
                field: "detector.confirmation_window",
                reason: "must be at least 1".to_string(),
            });
        }
        if detector.escalation_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detector.escalation_timeout_seconds",
                reason: "must be positive".to_string(),
            });
        }
        if detector.idle_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detector.idle_timeout_seconds",
                reason: "must be positive".to_string(),
            });
        }
        if self.safety.max_response_words == 0 {
            return Err(ConfigError::InvalidValue {
                field: "safety.max_response_words",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.daemon.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "daemon.sweep_interval_seconds",
                reason: "must be positive".to_string(),
            });
        }

        self.thresholds.validate()
    }
}

/// `~/.calmline/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Resolution order: explicit path, then `CALMLINE_CONFIG`, then the default path.
pub fn config_path(path: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path);
    }
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => default_config_path(),
    }
}

/// Loads and validates the configuration. A missing file yields validated defaults.
pub fn load_config(path: Option<PathBuf>) -> Result<CalmlineConfig, ConfigError> {
    let config_path = config_path(path)?;

    let config = if config_path.exists() {
        let content =
            fs_err::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;
        toml::from_str::<CalmlineConfig>(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?
    } else {
        CalmlineConfig::default()
    };

    config.validate()?;
    Ok(config)
}
