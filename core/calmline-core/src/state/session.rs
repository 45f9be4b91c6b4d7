use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::{ConfidenceScore, DistressState, InterventionType, Trend};

/// Bounded history used only for trend computation.
pub const CONFIDENCE_HISTORY_LEN: usize = 5;

/// Difference between the newest score and the mean of the older ones that counts as movement.
const TREND_EPSILON: f64 = 0.05;

/// A candidate state waiting out the confirmation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingCandidate {
    pub state: DistressState,
    pub count: u32,
}

/// The technique in progress and where its cursor sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveIntervention {
    pub kind: InterventionType,
    /// Next step to deliver.
    pub cursor: usize,
    pub last_delivered: Option<usize>,
}

/// Per-conversation state. Owned by the [`super::SessionStore`].
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub chat_id: String,
    pub state: DistressState,
    pub state_entered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub confidence_history: VecDeque<f64>,
    pub pending: Option<PendingCandidate>,
    pub intervention: Option<ActiveIntervention>,
    /// Start of the current continuous PANIC/OVERWHELMED stretch.
    pub high_distress_since: Option<DateTime<Utc>>,
    pub escalation_offered: bool,
    pub checkin_pending: bool,
    pub support_requested: bool,
    #[serde(skip)]
    pub(crate) retired: bool,
}

impl Session {
    pub fn new(chat_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.into(),
            state: DistressState::Calm,
            state_entered_at: now,
            created_at: now,
            last_activity_at: now,
            confidence_history: VecDeque::with_capacity(CONFIDENCE_HISTORY_LEN),
            pending: None,
            intervention: None,
            high_distress_since: None,
            escalation_offered: false,
            checkin_pending: false,
            support_requested: false,
            retired: false,
        }
    }

    /// Back to CALM with nothing in flight. Keeps identity and creation time.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        let chat_id = std::mem::take(&mut self.chat_id);
        let created_at = self.created_at;
        *self = Session::new(chat_id, now);
        self.created_at = created_at;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - self.last_activity_at > idle_timeout
    }

    pub fn record_confidence(&mut self, score: ConfidenceScore) {
        if self.confidence_history.len() == CONFIDENCE_HISTORY_LEN {
            self.confidence_history.pop_front();
        }
        self.confidence_history.push_back(score.value());
    }

    /// Last fused score, or zero for a session that has seen none.
    pub fn last_confidence(&self) -> ConfidenceScore {
        self.confidence_history
            .back()
            .copied()
            .map(ConfidenceScore::new)
            .unwrap_or(ConfidenceScore::ZERO)
    }

    /// Keeps only the newest score so the trend starts over.
    pub fn restart_trend(&mut self) {
        let last = self.confidence_history.back().copied();
        self.confidence_history.clear();
        if let Some(last) = last {
            self.confidence_history.push_back(last);
        }
    }

    /// Compares the newest score against the mean of the earlier ones.
    pub fn trend(&self) -> Trend {
        let len = self.confidence_history.len();
        if len < 2 {
            return Trend::Steady;
        }
        let latest = self.confidence_history[len - 1];
        let mean = self.confidence_history.iter().take(len - 1).sum::<f64>() / (len - 1) as f64;
        let delta = latest - mean;
        if delta > TREND_EPSILON {
            Trend::Rising
        } else if delta < -TREND_EPSILON {
            Trend::Falling
        } else {
            Trend::Steady
        }
    }

    pub fn active_intervention(&self) -> Option<InterventionType> {
        self.intervention.map(|active| active.kind)
    }

    pub fn step_cursor(&self) -> usize {
        self.intervention.map(|active| active.cursor).unwrap_or(0)
    }

    /// Whole seconds since the session was created.
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }
}
