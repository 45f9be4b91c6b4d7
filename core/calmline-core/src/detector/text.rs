use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{Category, CategoryMatch, Detection};
use crate::error::DetectionError;
use crate::patterns::{RE_CRISIS, RE_OVERWHELMED, RE_PANIC, RE_RECOVERY, RE_RISING, RE_STOP};

const PANIC_PROBABILITY: f64 = 0.85;
const OVERWHELMED_PROBABILITY: f64 = 0.80;
const RISING_PROBABILITY: f64 = 0.40;
const RECOVERY_PROBABILITY: f64 = 0.10;

/// An independent category detector.
pub trait Matcher: Send + Sync {
    fn category(&self) -> Category;

    /// `Ok(None)` when the category does not apply to `text`.
    fn evaluate(&self, text: &str) -> Result<Option<CategoryMatch>, DetectionError>;
}

/// Regex-backed matcher with a fixed base probability.
pub struct PatternMatcher {
    category: Category,
    regex: &'static Lazy<Regex>,
    base_probability: f64,
}

impl PatternMatcher {
    pub fn new(category: Category, regex: &'static Lazy<Regex>, base_probability: f64) -> Self {
        Self {
            category,
            regex,
            base_probability,
        }
    }
}

impl Matcher for PatternMatcher {
    fn category(&self) -> Category {
        self.category
    }

    fn evaluate(&self, text: &str) -> Result<Option<CategoryMatch>, DetectionError> {
        let hits = self.regex.find_iter(text).count();
        if hits == 0 {
            return Ok(None);
        }
        Ok(Some(CategoryMatch {
            category: self.category,
            probability: self.base_probability,
            hits,
        }))
    }
}

pub struct TextDetector {
    crisis: Box<dyn Matcher>,
    stop: Box<dyn Matcher>,
    scored: Vec<Box<dyn Matcher>>,
}

impl Default for TextDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TextDetector {
    pub fn new() -> Self {
        Self {
            crisis: Box::new(PatternMatcher::new(Category::Crisis, &RE_CRISIS, 1.0)),
            stop: Box::new(PatternMatcher::new(Category::Stop, &RE_STOP, 0.0)),
            scored: vec![
                Box::new(PatternMatcher::new(
                    Category::Panic,
                    &RE_PANIC,
                    PANIC_PROBABILITY,
                )),
                Box::new(PatternMatcher::new(
                    Category::Overwhelmed,
                    &RE_OVERWHELMED,
                    OVERWHELMED_PROBABILITY,
                )),
                Box::new(PatternMatcher::new(
                    Category::Rising,
                    &RE_RISING,
                    RISING_PROBABILITY,
                )),
                Box::new(PatternMatcher::new(
                    Category::Recovery,
                    &RE_RECOVERY,
                    RECOVERY_PROBABILITY,
                )),
            ],
        }
    }

    /// Appends a scored matcher after the built-in ones.
    pub fn with_matcher(mut self, matcher: Box<dyn Matcher>) -> Self {
        self.scored.push(matcher);
        self
    }

    pub fn detect(&self, text: &str) -> Result<Detection, DetectionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Detection::none());
        }

        if self.crisis.evaluate(text)?.is_some() {
            return Ok(Detection::Crisis);
        }
        if self.stop.evaluate(text)?.is_some() {
            return Ok(Detection::Stop);
        }

        let mut matched = Vec::new();
        let mut best: Option<CategoryMatch> = None;
        for matcher in &self.scored {
            let Some(found) = matcher.evaluate(text)? else {
                continue;
            };
            matched.push(found.category);
            // Strictly greater keeps the earlier matcher on ties.
            if best
                .as_ref()
                .map(|current| found.probability > current.probability)
                .unwrap_or(true)
            {
                best = Some(found);
            }
        }

        let detection = match best {
            Some(best) => Detection::Scored {
                probability: best.probability.clamp(0.0, 1.0),
                category: Some(best.category),
                matched,
            },
            None => Detection::none(),
        };
        debug!(detection = ?detection, "Text detection");
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingMatcher;

    impl Matcher for FailingMatcher {
        fn category(&self) -> Category {
            Category::Rising
        }

        fn evaluate(&self, _text: &str) -> Result<Option<CategoryMatch>, DetectionError> {
            Err(DetectionError::Matcher {
                matcher: "failing".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    fn scored(detection: &Detection) -> (f64, Option<Category>, Vec<Category>) {
        match detection {
            Detection::Scored {
                probability,
                category,
                matched,
            } => (*probability, *category, matched.clone()),
            other => panic!("expected scored detection, got {:?}", other),
        }
    }

    #[test]
    fn crisis_short_circuits_other_categories() {
        let detector = TextDetector::new();
        let detection = detector
            .detect("I'm having a panic attack and I want to die")
            .expect("detect");
        assert_eq!(detection, Detection::Crisis);
        assert_eq!(detection.probability(), Some(1.0));
        assert_eq!(detection.tags(), vec!["crisis"]);
    }

    #[test]
    fn crisis_wins_over_stop() {
        let detector = TextDetector::new();
        let detection = detector
            .detect("stop, I don't want to live anymore")
            .expect("detect");
        assert_eq!(detection, Detection::Crisis);
    }

    #[test]
    fn stop_is_a_sentinel() {
        let detector = TextDetector::new();
        let detection = detector.detect("stop").expect("detect");
        assert_eq!(detection, Detection::Stop);
        assert_eq!(detection.probability(), None);
    }

    #[test]
    fn highest_category_wins_without_summing() {
        let detector = TextDetector::new();
        let detection = detector
            .detect("I'm anxious and my heart is racing, I can't breathe")
            .expect("detect");
        let (probability, category, matched) = scored(&detection);
        assert_eq!(probability, PANIC_PROBABILITY);
        assert_eq!(category, Some(Category::Panic));
        assert_eq!(matched, vec![Category::Panic, Category::Rising]);
    }

    #[test]
    fn overwhelm_scores_below_panic() {
        let detector = TextDetector::new();
        let detection = detector
            .detect("Everything is too much, I'm shutting down")
            .expect("detect");
        let (probability, category, _) = scored(&detection);
        assert_eq!(probability, OVERWHELMED_PROBABILITY);
        assert_eq!(category, Some(Category::Overwhelmed));
    }

    #[test]
    fn recovery_has_low_probability() {
        let detector = TextDetector::new();
        let detection = detector.detect("I'm feeling better now").expect("detect");
        let (probability, category, _) = scored(&detection);
        assert_eq!(probability, RECOVERY_PROBABILITY);
        assert_eq!(category, Some(Category::Recovery));
    }

    #[test]
    fn neutral_text_scores_zero() {
        let detector = TextDetector::new();
        let detection = detector.detect("what time is it").expect("detect");
        assert_eq!(detection, Detection::none());
        assert!(detection.tags().is_empty());
    }

    #[test]
    fn empty_text_scores_zero() {
        let detector = TextDetector::new();
        assert_eq!(detector.detect("   ").expect("detect"), Detection::none());
    }

    #[test]
    fn failing_matcher_surfaces_error() {
        let detector = TextDetector::new().with_matcher(Box::new(FailingMatcher));
        let result = detector.detect("I feel fine");
        assert!(matches!(result, Err(DetectionError::Matcher { .. })));
    }
}
