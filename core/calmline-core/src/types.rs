//! Core domain types shared by the detector, state machine and sequencer.

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Distress State
// ═══════════════════════════════════════════════════════════════════════════════

/// The user's current distress state. Exactly one per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistressState {
    Calm,
    Rising,
    Panic,
    Overwhelmed,
    Recovery,
    CrisisRisk,
}

impl Default for DistressState {
    fn default() -> Self {
        Self::Calm
    }
}

impl DistressState {
    pub const ALL: [DistressState; 6] = [
        DistressState::Calm,
        DistressState::Rising,
        DistressState::Panic,
        DistressState::Overwhelmed,
        DistressState::Recovery,
        DistressState::CrisisRisk,
    ];

    /// Severity rank used for overlap resolution and one-notch escalation.
    pub fn severity(&self) -> u8 {
        match self {
            DistressState::Calm => 0,
            DistressState::Recovery => 1,
            DistressState::Rising => 2,
            DistressState::Panic => 3,
            DistressState::Overwhelmed => 4,
            DistressState::CrisisRisk => 5,
        }
    }

    /// PANIC and OVERWHELMED count toward the escalation timeout.
    pub fn is_high_distress(&self) -> bool {
        matches!(self, DistressState::Panic | DistressState::Overwhelmed)
    }

    /// States from which a falling score may be read as recovery.
    pub fn is_distressed(&self) -> bool {
        matches!(
            self,
            DistressState::Rising | DistressState::Panic | DistressState::Overwhelmed
        )
    }

    /// Next state up the severity ladder. CRISIS_RISK is the ceiling.
    pub fn escalated(&self) -> DistressState {
        match self {
            DistressState::Calm | DistressState::Recovery => DistressState::Rising,
            DistressState::Rising => DistressState::Panic,
            DistressState::Panic => DistressState::Overwhelmed,
            DistressState::Overwhelmed | DistressState::CrisisRisk => DistressState::CrisisRisk,
        }
    }

    /// Intervention the sequencer runs for this state.
    pub fn intervention(&self) -> Option<InterventionType> {
        match self {
            DistressState::Calm => None,
            DistressState::Rising => Some(InterventionType::PacedBreathing),
            DistressState::Panic => Some(InterventionType::FourSevenEight),
            DistressState::Overwhelmed => Some(InterventionType::Grounding54321),
            DistressState::Recovery => Some(InterventionType::Reinforcement),
            DistressState::CrisisRisk => Some(InterventionType::Escalation),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistressState::Calm => "calm",
            DistressState::Rising => "rising",
            DistressState::Panic => "panic",
            DistressState::Overwhelmed => "overwhelmed",
            DistressState::Recovery => "recovery",
            DistressState::CrisisRisk => "crisis_risk",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calm" => Some(DistressState::Calm),
            "rising" => Some(DistressState::Rising),
            "panic" => Some(DistressState::Panic),
            "overwhelmed" => Some(DistressState::Overwhelmed),
            "recovery" => Some(DistressState::Recovery),
            "crisis_risk" => Some(DistressState::CrisisRisk),
            _ => None,
        }
    }
}

impl fmt::Display for DistressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Confidence
// ═══════════════════════════════════════════════════════════════════════════════

/// Fused distress probability, always within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
    pub const ZERO: ConfidenceScore = ConfidenceScore(0.0);
    pub const MAX: ConfidenceScore = ConfidenceScore(1.0);

    /// Clamps into [0, 1]. NaN maps to 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for ConfidenceScore {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// Direction of the recent confidence history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Steady,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Interventions & Feedback
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    PacedBreathing,
    FourSevenEight,
    BoxBreathing,
    #[serde(rename = "grounding_54321")]
    Grounding54321,
    Reinforcement,
    Escalation,
}

impl InterventionType {
    /// Human-readable technique name.
    pub fn display_name(&self) -> &'static str {
        match self {
            InterventionType::PacedBreathing => "paced breathing",
            InterventionType::FourSevenEight => "four-seven-eight breathing",
            InterventionType::BoxBreathing => "box breathing",
            InterventionType::Grounding54321 => "five-four-three-two-one grounding",
            InterventionType::Reinforcement => "reinforcement",
            InterventionType::Escalation => "escalation offer",
        }
    }
}

impl fmt::Display for InterventionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Feedback to a "How are you feeling now?" check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInResponse {
    Better,
    Same,
    Worse,
}

impl CheckInResponse {
    pub const BUTTONS: [&'static str; 3] = ["better", "same", "worse"];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInResponse::Better => "better",
            CheckInResponse::Same => "same",
            CheckInResponse::Worse => "worse",
        }
    }

    /// Accepts the exact button labels, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "better" => Some(CheckInResponse::Better),
            "same" => Some(CheckInResponse::Same),
            "worse" => Some(CheckInResponse::Worse),
            _ => None,
        }
    }
}

/// Answer to the escalation offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationChoice {
    ContactSupport,
    ContinueAlone,
}

impl EscalationChoice {
    pub const BUTTONS: [&'static str; 2] = ["contact_support", "continue_alone"];

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationChoice::ContactSupport => "contact_support",
            EscalationChoice::ContinueAlone => "continue_alone",
        }
    }
}
