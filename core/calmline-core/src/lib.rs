//! # calmline-core
//!
//! Distress classification and intervention sequencing for Calmline.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The daemon runs one thread per request.
//! - **Deterministic**: Every time-dependent decision takes an explicit `now`.
//! - **Safety first**: Crisis and stop signals bypass fusion, thresholds and hysteresis.
//! - **Backend agnostic**: Reply text comes from a [`ResponseGenerator`]; the state
//!   machine behaves identically whether or not the generator succeeds.
//!
//! ## Pipeline
//!
//! ```text
//! message → sanitize → detector → fusion → state machine → sequencer → OutputEvent
//!                                      ↑                ↑
//!                                      └── SessionStore ┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use calmline_core::{CalmlineConfig, DistressEngine};
//!
//! let engine = DistressEngine::new(CalmlineConfig::default())?;
//! let event = engine.handle_message("chat-1", "I'm having a panic attack", None, chrono::Utc::now())?;
//! assert_eq!(event.state, calmline_core::DistressState::Panic);
//! ```

pub mod checkin;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod generator;
pub mod interventions;
pub mod patterns;
pub mod safety;
pub mod state;
pub mod types;

pub use checkin::{apply_check_in, apply_escalation_choice, CheckInOutcome};
pub use config::{
    load_config, CalmlineConfig, DaemonConfig, DetectorConfig, SafetyConfig, CONFIG_ENV_VAR,
};
pub use detector::{
    AudioDetector, AudioFeatures, Category, CategoryMatch, Detection, Matcher, PatternMatcher,
    TextDetector,
};
pub use engine::{DistressEngine, OutputEvent};
pub use error::{CalmlineError, ConfigError, DetectionError, GeneratorError, Result};
pub use fusion::{fuse, ChannelWeights};
pub use generator::{GenerationRequest, PromptGenerator, ResponseGenerator};
pub use interventions::{InterventionSequencer, StepPrompt, Technique};
pub use safety::{normalize_user_input, sanitize_user_input, SafetyFilter};
pub use state::{
    BandEntry, EvaluationInput, Session, SessionStore, StateMachine, ThresholdBand,
    ThresholdTable, Transition, TransitionReason,
};
pub use types::{
    CheckInResponse, ConfidenceScore, DistressState, EscalationChoice, InterventionType, Trend,
};
