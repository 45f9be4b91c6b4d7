//! Error types for calmline-core.
//!
//! Only configuration errors are fatal, and only at startup. Detection and
//! generator failures are recovered inside the engine and never reach callers.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Request Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors surfaced to the caller of a request.
#[derive(Debug, thiserror::Error)]
pub enum CalmlineError {
    #[error("No active session for conversation: {0}")]
    NoActiveSession(String),

    #[error("No escalation offer is pending for conversation: {0}")]
    NoPendingEscalation(String),

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience type alias for Results using CalmlineError.
pub type Result<T> = std::result::Result<T, CalmlineError>;

impl From<CalmlineError> for String {
    fn from(err: CalmlineError) -> String {
        err.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Detector weights malformed: {0}")]
    MalformedWeights(String),

    #[error("Threshold table malformed: {0}")]
    InvalidThresholds(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Recoverable Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// A detector could not produce a probability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("Matcher {matcher} failed: {reason}")]
    Matcher { matcher: String, reason: String },

    #[error("Audio feature {feature} is invalid: {value}")]
    InvalidAudioFeature { feature: &'static str, value: f64 },
}

/// The external response generator failed. Only triggers the scripted fallback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeneratorError {
    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("Generator returned an empty reply")]
    Empty,
}
