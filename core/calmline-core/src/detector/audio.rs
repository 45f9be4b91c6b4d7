use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// Normalized prosody features, each expected in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    #[serde(default)]
    pub pitch_variance: f64,
    #[serde(default)]
    pub loudness: f64,
    #[serde(default)]
    pub speech_rate: f64,
    #[serde(default)]
    pub pause_ratio: f64,
}

/// Placeholder prosody detector.
///
/// Not real signal processing: a fixed linear blend of pre-computed features,
/// present so fusion has a second channel with the real contract shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioDetector {
    enabled: bool,
}

impl AudioDetector {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether this input contributes an audio channel to fusion.
    pub fn is_active(&self, features: Option<&AudioFeatures>) -> bool {
        self.enabled && features.is_some()
    }

    pub fn detect(&self, features: Option<&AudioFeatures>) -> Result<f64, DetectionError> {
        let Some(features) = features.filter(|_| self.enabled) else {
            return Ok(0.0);
        };

        let pitch_variance = check_feature("pitch_variance", features.pitch_variance)?;
        let loudness = check_feature("loudness", features.loudness)?;
        let speech_rate = check_feature("speech_rate", features.speech_rate)?;
        let pause_ratio = check_feature("pause_ratio", features.pause_ratio)?;

        // Short pauses read as rapid, pressured speech.
        let score = 0.35 * pitch_variance
            + 0.25 * loudness
            + 0.25 * speech_rate
            + 0.15 * (1.0 - pause_ratio);
        Ok(score.clamp(0.0, 1.0))
    }
}

fn check_feature(feature: &'static str, value: f64) -> Result<f64, DetectionError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DetectionError::InvalidAudioFeature { feature, value });
    }
    Ok(value)
}
