//! Check-in feedback and escalation-choice handling.
//!
//! These run alongside the confidence path: explicit user feedback moves the
//! state directly, without fusion or hysteresis.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{CalmlineError, Result};
use crate::interventions::{InterventionSequencer, StepPrompt};
use crate::state::{enter_state, Session, StateMachine, Transition, TransitionReason};
use crate::types::{CheckInResponse, DistressState, EscalationChoice, InterventionType};

/// Result of feedback applied to a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckInOutcome {
    pub transition: Transition,
    /// Step to deliver, if the new state has one.
    pub step: Option<StepPrompt>,
}

pub fn apply_check_in(
    machine: &StateMachine,
    sequencer: &InterventionSequencer,
    session: &mut Session,
    response: CheckInResponse,
    now: DateTime<Utc>,
) -> CheckInOutcome {
    let from = session.state;
    session.checkin_pending = false;

    let step = match response {
        CheckInResponse::Better => {
            if from == DistressState::Calm {
                None
            } else {
                enter_state(session, DistressState::Recovery, now);
                Some(sequencer.advance(session, InterventionType::Reinforcement))
            }
        }
        CheckInResponse::Same => continue_technique(sequencer, session),
        CheckInResponse::Worse => worsen(machine, sequencer, session, now),
    };

    info!(
        chat_id = %session.chat_id,
        response = ?response,
        from = %from,
        to = %session.state,
        "Check-in applied"
    );

    CheckInOutcome {
        transition: Transition {
            from,
            to: session.state,
            reason: TransitionReason::CheckIn,
            confidence: session.last_confidence(),
            trend: session.trend(),
        },
        step,
    }
}

/// "same": keep going. A finished four-seven-eight run moves on to box breathing.
fn continue_technique(
    sequencer: &InterventionSequencer,
    session: &mut Session,
) -> Option<StepPrompt> {
    let kind = session
        .active_intervention()
        .or_else(|| session.state.intervention())?;
    let kind = if kind == InterventionType::FourSevenEight && sequencer.is_finished(session) {
        InterventionType::BoxBreathing
    } else {
        kind
    };
    Some(sequencer.advance(session, kind))
}

fn worsen(
    machine: &StateMachine,
    sequencer: &InterventionSequencer,
    session: &mut Session,
    now: DateTime<Utc>,
) -> Option<StepPrompt> {
    if session.state == DistressState::Overwhelmed
        && session.active_intervention() == Some(InterventionType::Grounding54321)
    {
        if let Some(step) = sequencer.repeat(session) {
            return Some(step);
        }
    }

    let episode_elapsed = session
        .high_distress_since
        .map(|since| now - since >= machine.escalation_timeout())
        .unwrap_or(false);
    let to = if session.state.is_high_distress() && !session.escalation_offered && episode_elapsed
    {
        DistressState::CrisisRisk
    } else {
        session.state.escalated()
    };

    enter_state(session, to, now);
    if to == DistressState::CrisisRisk {
        session.escalation_offered = true;
    }
    to.intervention()
        .map(|kind| sequencer.advance(session, kind))
}

/// Answer to the escalation offer.
///
/// `contact_support` keeps CRISIS_RISK and flags the request. `continue_alone`
/// drops to OVERWHELMED and restarts grounding. Outside CRISIS_RISK there is no
/// offer to answer, and the session is left untouched.
pub fn apply_escalation_choice(
    sequencer: &InterventionSequencer,
    session: &mut Session,
    choice: EscalationChoice,
    now: DateTime<Utc>,
) -> Result<CheckInOutcome> {
    let from = session.state;
    if from != DistressState::CrisisRisk {
        warn!(
            chat_id = %session.chat_id,
            choice = ?choice,
            state = %from,
            "Escalation choice without a pending offer"
        );
        return Err(CalmlineError::NoPendingEscalation(session.chat_id.clone()));
    }
    session.checkin_pending = false;

    let step = match choice {
        EscalationChoice::ContactSupport => {
            enter_state(session, DistressState::CrisisRisk, now);
            session.escalation_offered = true;
            session.support_requested = true;
            None
        }
        EscalationChoice::ContinueAlone => {
            enter_state(session, DistressState::Overwhelmed, now);
            session.support_requested = false;
            session.intervention = None;
            Some(sequencer.advance(session, InterventionType::Grounding54321))
        }
    };

    info!(
        chat_id = %session.chat_id,
        choice = ?choice,
        to = %session.state,
        "Escalation choice applied"
    );

    Ok(CheckInOutcome {
        transition: Transition {
            from,
            to: session.state,
            reason: TransitionReason::EscalationChoice,
            confidence: session.last_confidence(),
            trend: session.trend(),
        },
        step,
    })
}
