//! Intervention catalog and step sequencing.
//!
//! Each technique is a short, fixed list of prompts. The session's cursor
//! walks it one step per turn and saturates on the last step.

use serde::Serialize;
use tracing::debug;

use crate::state::{ActiveIntervention, Session};
use crate::types::InterventionType;

/// A technique's scripted prompts and pacing.
#[derive(Debug)]
pub struct Technique {
    pub kind: InterventionType,
    pub steps: &'static [&'static str],
    /// Suggested wait before the next turn, per step.
    pub followup_seconds: Option<u64>,
}

static PACED_BREATHING: Technique = Technique {
    kind: InterventionType::PacedBreathing,
    steps: &[
        "Let's slow your breath. In for four, out for four.",
        "Keep that rhythm. In for four, out for four.",
        "You're doing well. Two more slow breaths.",
    ],
    followup_seconds: Some(10),
};

static FOUR_SEVEN_EIGHT: Technique = Technique {
    kind: InterventionType::FourSevenEight,
    steps: &[
        "Your body needs slower breaths. In for four, hold seven, out for eight.",
        "Again. In four, hold seven, out eight.",
        "One more cycle. In four, hold seven, out eight.",
    ],
    followup_seconds: Some(20),
};

static BOX_BREATHING: Technique = Technique {
    kind: InterventionType::BoxBreathing,
    steps: &[
        "Let's try a box. In for four, hold four, out four, hold four.",
        "Continue the box. In, hold, out, hold.",
        "You've got this. One more round.",
    ],
    followup_seconds: Some(20),
};

static GROUNDING_54321: Technique = Technique {
    kind: InterventionType::Grounding54321,
    steps: &[
        "Let's bring you back to now. Name five things you can see.",
        "Name four things you can touch.",
        "Name three things you can hear.",
        "Name two things you can smell.",
        "Name one thing you can taste.",
        "You're here. You're present. Take a slow breath.",
    ],
    followup_seconds: Some(12),
};

static REINFORCEMENT: Technique = Technique {
    kind: InterventionType::Reinforcement,
    steps: &["Your body is settling. Take two slow breaths."],
    followup_seconds: None,
};

static ESCALATION: Technique = Technique {
    kind: InterventionType::Escalation,
    steps: &["I hear you're struggling. Would you like me to contact your support person?"],
    followup_seconds: None,
};

impl Technique {
    pub fn for_kind(kind: InterventionType) -> &'static Technique {
        match kind {
            InterventionType::PacedBreathing => &PACED_BREATHING,
            InterventionType::FourSevenEight => &FOUR_SEVEN_EIGHT,
            InterventionType::BoxBreathing => &BOX_BREATHING,
            InterventionType::Grounding54321 => &GROUNDING_54321,
            InterventionType::Reinforcement => &REINFORCEMENT,
            InterventionType::Escalation => &ESCALATION,
        }
    }

    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn step(&self, index: usize) -> StepPrompt {
        let step_index = index.min(self.last_index());
        StepPrompt {
            kind: self.kind,
            prompt: self.steps[step_index],
            step_index,
            is_final: step_index == self.last_index(),
        }
    }
}

/// One delivered step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepPrompt {
    pub kind: InterventionType,
    pub prompt: &'static str,
    pub step_index: usize,
    pub is_final: bool,
}

impl StepPrompt {
    pub fn followup_seconds(&self) -> Option<u64> {
        Technique::for_kind(self.kind).followup_seconds
    }
}

/// Moves a session through its technique's steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterventionSequencer;

impl InterventionSequencer {
    pub fn new() -> Self {
        Self
    }

    /// Delivers the step at the cursor and moves the cursor forward.
    ///
    /// A different `kind` than the active one starts over at step 0.
    pub fn advance(&self, session: &mut Session, kind: InterventionType) -> StepPrompt {
        let technique = Technique::for_kind(kind);
        let mut active = match session.intervention {
            Some(active) if active.kind == kind => active,
            _ => ActiveIntervention {
                kind,
                cursor: 0,
                last_delivered: None,
            },
        };

        let step = technique.step(active.cursor);
        active.last_delivered = Some(step.step_index);
        active.cursor = (step.step_index + 1).min(technique.last_index());
        session.intervention = Some(active);

        debug!(
            chat_id = %session.chat_id,
            intervention = ?kind,
            step = step.step_index,
            is_final = step.is_final,
            "Intervention step"
        );
        step
    }

    /// Re-delivers the last delivered step without moving the cursor.
    pub fn repeat(&self, session: &Session) -> Option<StepPrompt> {
        let active = session.intervention?;
        let index = active.last_delivered?;
        Some(Technique::for_kind(active.kind).step(index))
    }

    /// Whether the active technique has already delivered its final step.
    pub fn is_finished(&self, session: &Session) -> bool {
        session
            .intervention
            .map(|active| {
                active.last_delivered == Some(Technique::for_kind(active.kind).last_index())
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn session() -> Session {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid time");
        Session::new("chat", now)
    }

    #[test]
    fn grounding_walks_forward_then_saturates() {
        let sequencer = InterventionSequencer::new();
        let mut session = session();
        let indices: Vec<usize> = (0..8)
            .map(|_| {
                sequencer
                    .advance(&mut session, InterventionType::Grounding54321)
                    .step_index
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 5, 5]);

        let last = sequencer.advance(&mut session, InterventionType::Grounding54321);
        assert!(last.is_final);
        assert_eq!(last.prompt, "You're here. You're present. Take a slow breath.");
    }

    #[test]
    fn switching_technique_resets_cursor() {
        let sequencer = InterventionSequencer::new();
        let mut session = session();
        sequencer.advance(&mut session, InterventionType::PacedBreathing);
        sequencer.advance(&mut session, InterventionType::PacedBreathing);
        let step = sequencer.advance(&mut session, InterventionType::FourSevenEight);
        assert_eq!(step.step_index, 0);
        assert_eq!(session.step_cursor(), 1);
    }

    #[test]
    fn single_step_techniques_are_always_final() {
        let sequencer = InterventionSequencer::new();
        let mut session = session();
        for _ in 0..3 {
            let step = sequencer.advance(&mut session, InterventionType::Reinforcement);
            assert_eq!(step.step_index, 0);
            assert!(step.is_final);
        }
        assert_eq!(session.step_cursor(), 0);
    }

    #[test]
    fn repeat_does_not_move_cursor() {
        let sequencer = InterventionSequencer::new();
        let mut session = session();
        assert!(sequencer.repeat(&session).is_none());
        sequencer.advance(&mut session, InterventionType::Grounding54321);
        sequencer.advance(&mut session, InterventionType::Grounding54321);
        let repeated = sequencer.repeat(&session).expect("repeat");
        assert_eq!(repeated.step_index, 1);
        assert_eq!(session.step_cursor(), 2);
    }

    #[test]
    fn finished_after_final_breathing_step() {
        let sequencer = InterventionSequencer::new();
        let mut session = session();
        for _ in 0..2 {
            sequencer.advance(&mut session, InterventionType::FourSevenEight);
            assert!(!sequencer.is_finished(&session));
        }
        sequencer.advance(&mut session, InterventionType::FourSevenEight);
        assert!(sequencer.is_finished(&session));
    }

    #[test]
    fn followup_pacing_per_technique() {
        assert_eq!(Technique::for_kind(InterventionType::PacedBreathing).followup_seconds, Some(10));
        assert_eq!(Technique::for_kind(InterventionType::FourSevenEight).followup_seconds, Some(20));
        assert_eq!(Technique::for_kind(InterventionType::BoxBreathing).followup_seconds, Some(20));
        assert_eq!(Technique::for_kind(InterventionType::Grounding54321).followup_seconds, Some(12));
        assert_eq!(Technique::for_kind(InterventionType::Escalation).followup_seconds, None);
    }
}
