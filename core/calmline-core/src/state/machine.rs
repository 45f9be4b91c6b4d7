//! Distress state transitions.
//!
//! One call to [`StateMachine::evaluate`] per input, in this order:
//! stop override, crisis override, threshold candidate, hysteresis,
//! escalation timeout. Overrides skip everything after them.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::session::{PendingCandidate, Session};
use super::thresholds::ThresholdTable;
use crate::config::CalmlineConfig;
use crate::types::{ConfidenceScore, DistressState, Trend};

/// What the machine is asked to evaluate for one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluationInput {
    Stop,
    Crisis,
    Scored {
        confidence: ConfidenceScore,
        /// State named by the strongest detector category, for overlap resolution.
        hint: Option<DistressState>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Stop,
    Crisis,
    Confidence,
    /// Candidate seen but not yet confirmed.
    Pending,
    EscalationTimeout,
    CheckIn,
    EscalationChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub from: DistressState,
    pub to: DistressState,
    pub reason: TransitionReason,
    pub confidence: ConfidenceScore,
    pub trend: Trend,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    thresholds: ThresholdTable,
    confirmation_window: u32,
    escalation_timeout: Duration,
}

impl StateMachine {
    pub fn new(
        thresholds: ThresholdTable,
        confirmation_window: u32,
        escalation_timeout: Duration,
    ) -> Self {
        Self {
            thresholds,
            confirmation_window: confirmation_window.max(1),
            escalation_timeout,
        }
    }

    pub fn from_config(config: &CalmlineConfig) -> Self {
        Self::new(
            config.thresholds.clone(),
            config.detector.confirmation_window,
            Duration::seconds(config.detector.escalation_timeout_seconds as i64),
        )
    }

    pub fn escalation_timeout(&self) -> Duration {
        self.escalation_timeout
    }

    pub fn evaluate(
        &self,
        session: &mut Session,
        input: EvaluationInput,
        now: DateTime<Utc>,
    ) -> Transition {
        let from = session.state;

        match input {
            EvaluationInput::Stop => {
                session.reset(now);
                info!(chat_id = %session.chat_id, from = %from, "Session stopped by user");
                Transition {
                    from,
                    to: DistressState::Calm,
                    reason: TransitionReason::Stop,
                    confidence: ConfidenceScore::ZERO,
                    trend: Trend::Steady,
                }
            }
            EvaluationInput::Crisis => {
                session.record_confidence(ConfidenceScore::MAX);
                session.pending = None;
                enter_state(session, DistressState::CrisisRisk, now);
                Transition {
                    from,
                    to: DistressState::CrisisRisk,
                    reason: TransitionReason::Crisis,
                    confidence: ConfidenceScore::MAX,
                    trend: session.trend(),
                }
            }
            EvaluationInput::Scored { confidence, hint } => {
                session.record_confidence(confidence);
                let trend = session.trend();
                let candidate =
                    self.thresholds
                        .candidate(confidence.value(), session.state, trend, hint);
                let mut reason = self.apply_hysteresis(session, candidate, now);

                if self.escalation_due(session, now) {
                    session.escalation_offered = true;
                    enter_state(session, DistressState::CrisisRisk, now);
                    info!(
                        chat_id = %session.chat_id,
                        timeout_secs = self.escalation_timeout.num_seconds(),
                        "High distress persisted; offering escalation"
                    );
                    reason = TransitionReason::EscalationTimeout;
                }

                Transition {
                    from,
                    to: session.state,
                    reason,
                    confidence,
                    trend,
                }
            }
        }
    }

    /// A candidate equal to the current state clears any pending change.
    fn apply_hysteresis(
        &self,
        session: &mut Session,
        candidate: DistressState,
        now: DateTime<Utc>,
    ) -> TransitionReason {
        if candidate == session.state {
            session.pending = None;
            return TransitionReason::Confidence;
        }

        let count = match session.pending {
            Some(pending) if pending.state == candidate => pending.count + 1,
            _ => 1,
        };

        if count >= self.confirmation_window {
            enter_state(session, candidate, now);
            TransitionReason::Confidence
        } else {
            debug!(
                chat_id = %session.chat_id,
                candidate = %candidate,
                count,
                window = self.confirmation_window,
                "Candidate state pending confirmation"
            );
            session.pending = Some(PendingCandidate {
                state: candidate,
                count,
            });
            TransitionReason::Pending
        }
    }

    /// Fires at most once per high-distress episode.
    pub fn escalation_due(&self, session: &Session, now: DateTime<Utc>) -> bool {
        if !session.state.is_high_distress() || session.escalation_offered {
            return false;
        }
        session
            .high_distress_since
            .map(|since| now - since > self.escalation_timeout)
            .unwrap_or(false)
    }
}

/// Moves the session to `to` with all per-state bookkeeping. Returns whether the state changed.
///
/// Entering a state clears the active intervention and any pending candidate.
/// RECOVERY restarts the trend. RECOVERY and CALM end the high-distress episode.
pub(crate) fn enter_state(session: &mut Session, to: DistressState, now: DateTime<Utc>) -> bool {
    let from = session.state;
    if from == to {
        return false;
    }

    session.state = to;
    session.state_entered_at = now;
    session.intervention = None;
    session.pending = None;

    if to.is_high_distress() {
        if !from.is_high_distress() || session.high_distress_since.is_none() {
            session.high_distress_since = Some(now);
        }
    } else {
        session.high_distress_since = None;
    }

    if to == DistressState::Recovery {
        session.restart_trend();
    }
    if matches!(to, DistressState::Recovery | DistressState::Calm) {
        session.escalation_offered = false;
        session.support_requested = false;
    }

    info!(chat_id = %session.chat_id, from = %from, to = %to, "State transition");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn machine(window: u32) -> StateMachine {
        StateMachine::new(ThresholdTable::default(), window, Duration::seconds(120))
    }

    fn scored(value: f64, hint: Option<DistressState>) -> EvaluationInput {
        EvaluationInput::Scored {
            confidence: ConfidenceScore::new(value),
            hint,
        }
    }

    #[test]
    fn crisis_from_calm_is_immediate() {
        let machine = machine(3);
        let mut session = Session::new("chat", t0());
        let transition = machine.evaluate(&mut session, EvaluationInput::Crisis, t0());
        assert_eq!(transition.to, DistressState::CrisisRisk);
        assert_eq!(transition.reason, TransitionReason::Crisis);
        assert_eq!(session.state, DistressState::CrisisRisk);
    }

    #[test]
    fn stop_resets_from_any_state() {
        let machine = machine(1);
        for state in DistressState::ALL {
            let mut session = Session::new("chat", t0());
            session.state = state;
            session.escalation_offered = true;
            let transition = machine.evaluate(&mut session, EvaluationInput::Stop, t0());
            assert_eq!(transition.to, DistressState::Calm);
            assert_eq!(session.state, DistressState::Calm);
            assert!(session.intervention.is_none());
            assert!(!session.escalation_offered);
        }
    }

    #[test]
    fn window_of_two_delays_entry() {
        let machine = machine(2);
        let mut session = Session::new("chat", t0());
        let states: Vec<DistressState> = [0.4, 0.4, 0.4]
            .into_iter()
            .map(|score| {
                machine
                    .evaluate(&mut session, scored(score, Some(DistressState::Rising)), t0())
                    .to
            })
            .collect();
        assert_eq!(
            states,
            vec![DistressState::Calm, DistressState::Rising, DistressState::Rising]
        );
    }

    #[test]
    fn interrupted_candidate_restarts_count() {
        let machine = machine(2);
        let mut session = Session::new("chat", t0());
        machine.evaluate(&mut session, scored(0.4, None), t0());
        machine.evaluate(&mut session, scored(0.0, None), t0());
        assert!(session.pending.is_none());
        let transition = machine.evaluate(&mut session, scored(0.4, None), t0());
        assert_eq!(transition.to, DistressState::Calm);
        assert_eq!(transition.reason, TransitionReason::Pending);
    }

    #[test]
    fn escalation_after_sustained_panic_fires_once() {
        let machine = machine(1);
        let mut session = Session::new("chat", t0());
        machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), t0());
        assert_eq!(session.state, DistressState::Panic);

        let later = t0() + Duration::seconds(121);
        let transition =
            machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), later);
        assert_eq!(transition.to, DistressState::CrisisRisk);
        assert_eq!(transition.reason, TransitionReason::EscalationTimeout);
        assert!(session.escalation_offered);

        let again = later + Duration::seconds(5);
        machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), again);
        assert_eq!(session.state, DistressState::Panic);
        assert!(!machine.escalation_due(&session, again + Duration::seconds(600)));
    }

    #[test]
    fn no_escalation_at_exact_timeout() {
        let machine = machine(1);
        let mut session = Session::new("chat", t0());
        machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), t0());
        let transition = machine.evaluate(
            &mut session,
            scored(0.85, Some(DistressState::Panic)),
            t0() + Duration::seconds(120),
        );
        assert_eq!(transition.to, DistressState::Panic);
    }

    #[test]
    fn panic_to_overwhelmed_keeps_episode_clock() {
        let machine = machine(1);
        let mut session = Session::new("chat", t0());
        machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), t0());
        machine.evaluate(
            &mut session,
            scored(0.8, Some(DistressState::Overwhelmed)),
            t0() + Duration::seconds(60),
        );
        assert_eq!(session.state, DistressState::Overwhelmed);
        assert_eq!(session.high_distress_since, Some(t0()));
    }

    #[test]
    fn recovery_after_panic_ends_episode() {
        let machine = machine(1);
        let mut session = Session::new("chat", t0());
        machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), t0());
        session.escalation_offered = true;
        let transition = machine.evaluate(
            &mut session,
            scored(0.1, Some(DistressState::Recovery)),
            t0() + Duration::seconds(30),
        );
        assert_eq!(transition.to, DistressState::Recovery);
        assert!(!session.escalation_offered);
        assert!(session.high_distress_since.is_none());
        assert_eq!(session.confidence_history.len(), 1);
    }

    #[test]
    fn transition_clears_intervention() {
        let machine = machine(1);
        let mut session = Session::new("chat", t0());
        machine.evaluate(&mut session, scored(0.4, None), t0());
        session.intervention = Some(crate::state::ActiveIntervention {
            kind: crate::types::InterventionType::PacedBreathing,
            cursor: 2,
            last_delivered: Some(1),
        });
        machine.evaluate(&mut session, scored(0.85, Some(DistressState::Panic)), t0());
        assert!(session.intervention.is_none());
        assert_eq!(session.step_cursor(), 0);
    }
}
