//! DistressEngine - the entry point for Calmline clients.
//!
//! The engine is:
//! - **Synchronous**: no async runtime required
//! - **Shareable**: `Send + Sync`, meant to be wrapped in an `Arc` by the daemon
//! - **Total**: detection and generator failures degrade the reply, never the request
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use calmline_core::{CalmlineConfig, CheckInResponse, DistressEngine};
//!
//! let engine = DistressEngine::new(CalmlineConfig::default())?;
//! let event = engine.handle_message("chat-1", "I can't breathe", None, Utc::now())?;
//! let next = engine.handle_check_in("chat-1", CheckInResponse::Same, Utc::now())?;
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checkin::{apply_check_in, apply_escalation_choice, CheckInOutcome};
use crate::config::CalmlineConfig;
use crate::detector::{AudioDetector, AudioFeatures, Detection, TextDetector};
use crate::error::{CalmlineError, Result};
use crate::fusion::{fuse, ChannelWeights};
use crate::generator::{GenerationRequest, PromptGenerator, ResponseGenerator};
use crate::interventions::{InterventionSequencer, StepPrompt};
use crate::safety::{normalize_user_input, sanitize_user_input, SafetyFilter};
use crate::state::{EvaluationInput, Session, SessionStore, StateMachine};
use crate::types::{
    CheckInResponse, ConfidenceScore, DistressState, EscalationChoice, InterventionType, Trend,
};

const STOP_REPLY: &str = "Understood. I'm here if you need me.";
const SUPPORT_REPLY: &str = "Okay. Your support person will be contacted. I'm here with you.";

/// What a client shows after one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub chat_id: String,
    pub state: DistressState,
    pub confidence: ConfidenceScore,
    pub intervention_type: Option<InterventionType>,
    pub step_index: usize,
    pub expect_followup: bool,
    pub followup_after_seconds: Option<u64>,
    pub buttons: Vec<String>,
    pub reply_text: String,
    pub trend: Trend,
    /// Detection failed and the last known confidence was used instead.
    pub degraded: bool,
    pub stopped: bool,
    pub support_requested: bool,
    /// Seconds since the session was created.
    pub session_duration_seconds: i64,
}

pub struct DistressEngine {
    config: CalmlineConfig,
    text_detector: TextDetector,
    audio_detector: AudioDetector,
    machine: StateMachine,
    sequencer: InterventionSequencer,
    safety: SafetyFilter,
    generator: Box<dyn ResponseGenerator>,
    store: SessionStore,
}

impl DistressEngine {
    /// Validates `config` and builds an engine with the scripted [`PromptGenerator`].
    pub fn new(config: CalmlineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            text_detector: TextDetector::new(),
            audio_detector: AudioDetector::new(config.detector.enable_audio),
            machine: StateMachine::from_config(&config),
            sequencer: InterventionSequencer::new(),
            safety: SafetyFilter::new(config.safety.max_response_words),
            generator: Box::new(PromptGenerator),
            store: SessionStore::new(Duration::seconds(
                config.detector.idle_timeout_seconds as i64,
            )),
            config,
        })
    }

    pub fn with_generator(mut self, generator: Box<dyn ResponseGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_text_detector(mut self, detector: TextDetector) -> Self {
        self.text_detector = detector;
        self
    }

    pub fn config(&self) -> &CalmlineConfig {
        &self.config
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    pub fn session(&self, chat_id: &str) -> Option<Session> {
        self.store.snapshot(chat_id)
    }

    /// Classifies one message and returns the next intervention step.
    ///
    /// While a check-in is pending, a message that is exactly better/same/worse
    /// is treated as the check-in answer.
    pub fn handle_message(
        &self,
        chat_id: &str,
        message: &str,
        audio: Option<&AudioFeatures>,
        now: DateTime<Utc>,
    ) -> Result<OutputEvent> {
        let text = normalize_user_input(message);
        if text.is_empty() {
            return Err(CalmlineError::EmptyMessage);
        }

        Ok(self.store.with_session(chat_id, now, |session| {
            if session.checkin_pending {
                if let Some(response) = CheckInResponse::parse(&text) {
                    let outcome =
                        apply_check_in(&self.machine, &self.sequencer, session, response, now);
                    return self.render_outcome(session, outcome, &text, now);
                }
            }
            self.process_message(session, &text, audio, now)
        }))
    }

    /// Applies a check-in answer. The conversation must have a live session.
    pub fn handle_check_in(
        &self,
        chat_id: &str,
        response: CheckInResponse,
        now: DateTime<Utc>,
    ) -> Result<OutputEvent> {
        self.store.with_existing(chat_id, now, |session| {
            let outcome = apply_check_in(&self.machine, &self.sequencer, session, response, now);
            self.render_outcome(session, outcome, response.as_str(), now)
        })
    }

    /// Answers an escalation offer. Fails with [`CalmlineError::NoPendingEscalation`]
    /// outside CRISIS_RISK.
    pub fn handle_escalation_choice(
        &self,
        chat_id: &str,
        choice: EscalationChoice,
        now: DateTime<Utc>,
    ) -> Result<OutputEvent> {
        self.store.with_existing(chat_id, now, |session| {
            let outcome = apply_escalation_choice(&self.sequencer, session, choice, now)?;
            Ok(self.render_outcome(session, outcome, choice.as_str(), now))
        })?
    }

    /// Drops the conversation's session. Returns whether one existed.
    pub fn end_session(&self, chat_id: &str) -> bool {
        self.store.remove(chat_id)
    }

    /// Removes idle sessions. Called periodically by the daemon.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.sweep_expired(now);
        if removed > 0 {
            debug!(removed, remaining = self.store.len(), "Idle sessions swept");
        }
        removed
    }

    fn process_message(
        &self,
        session: &mut Session,
        text: &str,
        audio: Option<&AudioFeatures>,
        now: DateTime<Utc>,
    ) -> OutputEvent {
        let (input, degraded) = self.evaluation_input(session, text, audio);
        let transition = self.machine.evaluate(session, input, now);

        if input == EvaluationInput::Stop {
            return stopped_event(session, now);
        }

        debug!(
            chat_id = %session.chat_id,
            confidence = transition.confidence.value(),
            reason = ?transition.reason,
            state = %session.state,
            "Message evaluated"
        );

        let step = self.next_step(session);
        let mut event = self.render(session, step, text, now);
        event.degraded = degraded;
        event
    }

    /// Runs detection and fusion. Any detector failure falls back to the last known score.
    fn evaluation_input(
        &self,
        session: &Session,
        text: &str,
        audio: Option<&AudioFeatures>,
    ) -> (EvaluationInput, bool) {
        let detection = match self.text_detector.detect(text) {
            Ok(detection) => detection,
            Err(err) => {
                warn!(
                    chat_id = %session.chat_id,
                    error = %err,
                    "Text detection failed; using last known confidence"
                );
                return (
                    EvaluationInput::Scored {
                        confidence: session.last_confidence(),
                        hint: None,
                    },
                    true,
                );
            }
        };

        let (probability, category) = match detection {
            Detection::Stop => return (EvaluationInput::Stop, false),
            Detection::Crisis => return (EvaluationInput::Crisis, false),
            Detection::Scored {
                probability,
                category,
                ..
            } => (probability, category),
        };

        let (audio_probability, audio_active, degraded) = match self.audio_detector.detect(audio)
        {
            Ok(score) => (score, self.audio_detector.is_active(audio), false),
            Err(err) => {
                warn!(
                    chat_id = %session.chat_id,
                    error = %err,
                    "Audio detection failed; fusing text only"
                );
                (0.0, false, true)
            }
        };

        let weights = ChannelWeights::for_channels(
            self.config.detector.text_weight,
            self.config.detector.audio_weight,
            audio_active,
        );
        let confidence = fuse(probability, audio_probability, weights.text, weights.audio);
        (
            EvaluationInput::Scored {
                confidence,
                hint: category.and_then(|category| category.state_hint()),
            },
            degraded,
        )
    }

    /// Continues the technique already running for this state, or starts the state's default.
    fn next_step(&self, session: &mut Session) -> Option<StepPrompt> {
        if session.state == DistressState::Calm {
            session.intervention = None;
            return None;
        }
        let kind = session
            .active_intervention()
            .or_else(|| session.state.intervention())?;
        Some(self.sequencer.advance(session, kind))
    }

    fn render_outcome(
        &self,
        session: &mut Session,
        outcome: CheckInOutcome,
        user_message: &str,
        now: DateTime<Utc>,
    ) -> OutputEvent {
        self.render(session, outcome.step, user_message, now)
    }

    fn render(
        &self,
        session: &mut Session,
        step: Option<StepPrompt>,
        user_message: &str,
        now: DateTime<Utc>,
    ) -> OutputEvent {
        let state = session.state;
        let support_requested = session.support_requested && state == DistressState::CrisisRisk;

        let buttons: Vec<String> = if support_requested {
            Vec::new()
        } else if state == DistressState::CrisisRisk {
            EscalationChoice::BUTTONS.iter().map(|b| b.to_string()).collect()
        } else if state.is_distressed() {
            CheckInResponse::BUTTONS.iter().map(|b| b.to_string()).collect()
        } else {
            Vec::new()
        };
        session.checkin_pending = state.is_distressed();

        let expect_followup =
            !matches!(state, DistressState::Calm | DistressState::Recovery) && !support_requested;
        let confidence = session.last_confidence();
        let reply_text = if support_requested {
            SUPPORT_REPLY.to_string()
        } else {
            self.reply_text(session, step, user_message, confidence)
        };

        OutputEvent {
            chat_id: session.chat_id.clone(),
            state,
            confidence,
            intervention_type: step.map(|step| step.kind),
            step_index: step.map(|step| step.step_index).unwrap_or(0),
            expect_followup,
            // Steps without a pacing interval, like the escalation offer, await the user now.
            followup_after_seconds: expect_followup
                .then(|| step.and_then(|step| step.followup_seconds()).unwrap_or(0)),
            buttons,
            reply_text,
            trend: session.trend(),
            degraded: false,
            stopped: false,
            support_requested,
            session_duration_seconds: session.duration_seconds(now),
        }
    }

    fn reply_text(
        &self,
        session: &Session,
        step: Option<StepPrompt>,
        user_message: &str,
        confidence: ConfidenceScore,
    ) -> String {
        let user_message = sanitize_user_input(user_message);
        let request = GenerationRequest {
            state: session.state,
            step,
            user_message: &user_message,
            confidence,
        };

        match self.generator.generate(&request) {
            Ok(text) if !text.trim().is_empty() => {
                let (filtered, safe) = self.safety.filter(&text);
                if safe {
                    return filtered;
                }
                warn!(
                    chat_id = %session.chat_id,
                    generator = self.generator.name(),
                    "Generated reply failed safety filter; using scripted prompt"
                );
            }
            Ok(_) => {
                warn!(
                    chat_id = %session.chat_id,
                    generator = self.generator.name(),
                    "Generator returned empty reply; using scripted prompt"
                );
            }
            Err(err) => {
                warn!(
                    chat_id = %session.chat_id,
                    generator = self.generator.name(),
                    error = %err,
                    "Generator failed; using scripted prompt"
                );
            }
        }
        request.scripted_reply().to_string()
    }
}

fn stopped_event(session: &Session, now: DateTime<Utc>) -> OutputEvent {
    OutputEvent {
        chat_id: session.chat_id.clone(),
        state: DistressState::Calm,
        confidence: ConfidenceScore::ZERO,
        intervention_type: None,
        step_index: 0,
        expect_followup: false,
        followup_after_seconds: None,
        buttons: Vec::new(),
        reply_text: STOP_REPLY.to_string(),
        trend: Trend::Steady,
        degraded: false,
        stopped: true,
        support_requested: false,
        session_duration_seconds: session.duration_seconds(now),
    }
}
