//! Weighted fusion of detector probabilities.
//!
//! Weights are expected to sum to at most 1. That is checked at config load
//! and only warned about; the clamp here is what guarantees the range.

use crate::types::ConfidenceScore;

/// Effective weights for one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelWeights {
    pub text: f64,
    pub audio: f64,
}

impl ChannelWeights {
    /// Normalizes over the channels that actually produced a signal.
    ///
    /// With audio inactive the text channel carries the whole signal, so a
    /// strong text detection is not diluted by a channel that never spoke.
    pub fn for_channels(text_weight: f64, audio_weight: f64, audio_active: bool) -> Self {
        if audio_active {
            return Self {
                text: text_weight,
                audio: audio_weight,
            };
        }
        Self {
            text: if text_weight > 0.0 { 1.0 } else { 0.0 },
            audio: 0.0,
        }
    }
}

pub fn fuse(
    text_probability: f64,
    audio_probability: f64,
    text_weight: f64,
    audio_weight: f64,
) -> ConfidenceScore {
    ConfidenceScore::new(text_weight * text_probability + audio_weight * audio_probability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fused_score_stays_in_unit_range() {
        let samples = [0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0];
        let weights = [(0.6, 0.4), (1.0, 1.0), (0.9, 0.9), (0.0, 0.0), (2.0, 0.5)];
        for text in samples {
            for audio in samples {
                for (tw, aw) in weights {
                    let score = fuse(text, audio, tw, aw).value();
                    assert!((0.0..=1.0).contains(&score), "{text} {audio} {tw} {aw}");
                }
            }
        }
    }

    #[test]
    fn fuse_is_a_weighted_sum() {
        let score = fuse(0.5, 1.0, 0.6, 0.4).value();
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn inactive_audio_gives_text_full_weight() {
        let weights = ChannelWeights::for_channels(0.6, 0.4, false);
        assert_eq!(weights, ChannelWeights { text: 1.0, audio: 0.0 });
        let score = fuse(0.85, 0.0, weights.text, weights.audio).value();
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn active_audio_uses_configured_weights() {
        let weights = ChannelWeights::for_channels(0.6, 0.4, true);
        assert_eq!(weights, ChannelWeights { text: 0.6, audio: 0.4 });
    }
}
