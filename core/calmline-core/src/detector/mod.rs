//! Signal detectors.
//!
//! The text detector is the primary signal. It runs an ordered list of
//! independent [`Matcher`]s and reports a tagged [`Detection`]:
//!
//! - [`Detection::Crisis`] and [`Detection::Stop`] are overrides, checked before
//!   any scoring. Crisis wins when both match.
//! - [`Detection::Scored`] carries the probability of the strongest matching
//!   category. Categories never add up.
//!
//! The audio detector is a placeholder with the same contract shape so fusion
//! does not care whether it is real.

mod audio;
mod text;

pub use audio::{AudioDetector, AudioFeatures};
pub use text::{Matcher, PatternMatcher, TextDetector};

use serde::{Deserialize, Serialize};

use crate::types::DistressState;

/// Pattern category a matcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Crisis,
    Stop,
    Panic,
    Overwhelmed,
    Rising,
    Recovery,
}

impl Category {
    /// The distress state this category points at, used to break threshold overlaps.
    pub fn state_hint(&self) -> Option<DistressState> {
        match self {
            Category::Crisis => Some(DistressState::CrisisRisk),
            Category::Stop => None,
            Category::Panic => Some(DistressState::Panic),
            Category::Overwhelmed => Some(DistressState::Overwhelmed),
            Category::Rising => Some(DistressState::Rising),
            Category::Recovery => Some(DistressState::Recovery),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Crisis => "crisis",
            Category::Stop => "stop",
            Category::Panic => "panic",
            Category::Overwhelmed => "overwhelmed",
            Category::Rising => "rising",
            Category::Recovery => "recovery",
        }
    }
}

/// One matcher's verdict for a message.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch {
    pub category: Category,
    pub probability: f64,
    pub hits: usize,
}

/// Result of text detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Immediate session reset. Not a probability.
    Stop,
    /// Crisis language. Probability is 1.0 by definition.
    Crisis,
    Scored {
        probability: f64,
        /// Strongest matching category, if any.
        category: Option<Category>,
        /// Every category that matched, in matcher order.
        matched: Vec<Category>,
    },
}

impl Detection {
    pub fn none() -> Self {
        Detection::Scored {
            probability: 0.0,
            category: None,
            matched: Vec::new(),
        }
    }

    pub fn probability(&self) -> Option<f64> {
        match self {
            Detection::Stop => None,
            Detection::Crisis => Some(1.0),
            Detection::Scored { probability, .. } => Some(*probability),
        }
    }

    pub fn tags(&self) -> Vec<&'static str> {
        match self {
            Detection::Stop => vec![Category::Stop.as_str()],
            Detection::Crisis => vec![Category::Crisis.as_str()],
            Detection::Scored { matched, .. } => matched.iter().map(Category::as_str).collect(),
        }
    }
}
