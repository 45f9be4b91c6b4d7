//! Probability bands that map a fused score to a candidate state.
//!
//! Bands may overlap. Resolution is deterministic:
//! 1. keep bands that contain the score and admit the current state,
//! 2. prefer the band whose state matches the detector's dominant category,
//! 3. otherwise take the highest priority (defaults to severity rank),
//! 4. ties keep the earlier band in table order.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DistressState, Trend};

/// Which current states may enter a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandEntry {
    #[default]
    Any,
    /// Only from RISING, PANIC or OVERWHELMED, and only while confidence is not climbing.
    AfterDistress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub state: DistressState,
    pub min: f64,
    /// Exclusive, except that a band ending at 1.0 includes 1.0.
    pub max: f64,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub entry: BandEntry,
}

impl ThresholdBand {
    pub fn new(state: DistressState, min: f64, max: f64) -> Self {
        Self {
            state,
            min,
            max,
            priority: None,
            entry: BandEntry::Any,
        }
    }

    pub fn after_distress(mut self) -> Self {
        self.entry = BandEntry::AfterDistress;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && (score < self.max || (self.max >= 1.0 && score <= self.max))
    }

    pub fn priority(&self) -> u8 {
        self.priority.unwrap_or_else(|| self.state.severity())
    }

    fn admits(&self, current: DistressState, trend: Trend) -> bool {
        match self.entry {
            BandEntry::Any => true,
            BandEntry::AfterDistress => current.is_distressed() && trend != Trend::Rising,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    bands: Vec<ThresholdBand>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            bands: vec![
                ThresholdBand::new(DistressState::Calm, 0.0, 0.2),
                ThresholdBand::new(DistressState::Recovery, 0.1, 0.35).after_distress(),
                ThresholdBand::new(DistressState::Rising, 0.2, 0.5),
                ThresholdBand::new(DistressState::Overwhelmed, 0.5, 0.85),
                // Outranks OVERWHELMED so an unhinted score of 0.6 or more reads as PANIC.
                ThresholdBand::new(DistressState::Panic, 0.6, 1.0)
                    .with_priority(DistressState::Overwhelmed.severity() + 1),
            ],
        }
    }
}

impl ThresholdTable {
    pub fn new(bands: Vec<ThresholdBand>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[ThresholdBand] {
        &self.bands
    }

    /// Candidate state for `score`. Falls back to `current` if no band applies,
    /// which a validated table rules out.
    pub fn candidate(
        &self,
        score: f64,
        current: DistressState,
        trend: Trend,
        hint: Option<DistressState>,
    ) -> DistressState {
        let matching: Vec<&ThresholdBand> = self
            .bands
            .iter()
            .filter(|band| band.contains(score) && band.admits(current, trend))
            .collect();

        if let Some(hint) = hint {
            if matching.iter().any(|band| band.state == hint) {
                return hint;
            }
        }

        let mut best: Option<&ThresholdBand> = None;
        for band in matching {
            if best
                .map(|current_best| band.priority() > current_best.priority())
                .unwrap_or(true)
            {
                best = Some(band);
            }
        }
        best.map(|band| band.state).unwrap_or(current)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bands.is_empty() {
            return Err(ConfigError::InvalidThresholds(
                "at least one band is required".to_string(),
            ));
        }

        for band in &self.bands {
            if !band.min.is_finite() || !band.max.is_finite() {
                return Err(ConfigError::InvalidThresholds(format!(
                    "{} band bounds must be finite",
                    band.state
                )));
            }
            if band.min < 0.0 || band.max > 1.0 || band.min >= band.max {
                return Err(ConfigError::InvalidThresholds(format!(
                    "{} band must satisfy 0 <= min < max <= 1 (got {}..{})",
                    band.state, band.min, band.max
                )));
            }
            if band.state == DistressState::CrisisRisk {
                return Err(ConfigError::InvalidThresholds(
                    "crisis_risk is entered only through crisis detection or escalation"
                        .to_string(),
                ));
            }
        }

        let mut open: Vec<&ThresholdBand> = self
            .bands
            .iter()
            .filter(|band| band.entry == BandEntry::Any)
            .collect();
        if !open.iter().any(|band| band.state == DistressState::Calm) {
            return Err(ConfigError::InvalidThresholds(
                "calm needs a band open from any state".to_string(),
            ));
        }

        open.sort_by(|left, right| left.min.total_cmp(&right.min));
        let mut reach = 0.0_f64;
        for band in open {
            if band.min > reach {
                return Err(ConfigError::InvalidThresholds(format!(
                    "scores in {}..{} map to no state",
                    reach, band.min
                )));
            }
            reach = reach.max(band.max);
        }
        if reach < 1.0 {
            return Err(ConfigError::InvalidThresholds(format!(
                "scores in {}..1 map to no state",
                reach
            )));
        }

        Ok(())
    }
}
