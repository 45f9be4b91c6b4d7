//! Reply generation seam.
//!
//! A backend may phrase the reply freely. The engine only accepts non-empty
//! text that passes the [`crate::SafetyFilter`]; anything else falls back to
//! the step's scripted prompt. The state machine never depends on the outcome.

use crate::error::GeneratorError;
use crate::interventions::StepPrompt;
use crate::types::{ConfidenceScore, DistressState, InterventionType};

const CALM_PROMPT: &str = "How are you feeling right now?";

/// Context handed to a generator for one reply.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub state: DistressState,
    pub step: Option<StepPrompt>,
    pub user_message: &'a str,
    pub confidence: ConfidenceScore,
}

impl GenerationRequest<'_> {
    pub fn intervention(&self) -> Option<InterventionType> {
        self.step.map(|step| step.kind)
    }

    /// The fixed reply used when no generator output is acceptable.
    pub fn scripted_reply(&self) -> &'static str {
        self.step.map(|step| step.prompt).unwrap_or(CALM_PROMPT)
    }
}

pub trait ResponseGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GeneratorError>;
}

/// Returns the scripted prompt unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptGenerator;

impl ResponseGenerator for PromptGenerator {
    fn name(&self) -> &'static str {
        "prompt"
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GeneratorError> {
        Ok(request.scripted_reply().to_string())
    }
}
