//! Confidence scoring shared by every matching path.
//!
//! Four factors, each in `[0, 1]`, are combined by a weighted sum into one score.
//! A separate mapping turns the score into an action tier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfidenceError;

/// Tolerance on the weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFactors {
    /// How well the detected problem matched (similarity or resolver score)
    pub pattern_match: f64,
    /// Inverse size of the change, see [`assess_change_magnitude`]
    pub change_magnitude: f64,
    /// Inverse risk of the change category
    pub risk_assessment: f64,
    /// Past success rate for this kind of change
    pub historical_accuracy: f64,
}

impl ConfidenceFactors {
    /// Build factors, rejecting any value outside `[0, 1]`.
    pub fn new(
        pattern_match: f64,
        change_magnitude: f64,
        risk_assessment: f64,
        historical_accuracy: f64,
    ) -> Result<Self, ConfidenceError> {
        let factors = Self {
            pattern_match,
            change_magnitude,
            risk_assessment,
            historical_accuracy,
        };
        factors.validate()?;
        Ok(factors)
    }

    fn validate(&self) -> Result<(), ConfidenceError> {
        for (name, value) in [
            ("pattern_match", self.pattern_match),
            ("change_magnitude", self.change_magnitude),
            ("risk_assessment", self.risk_assessment),
            ("historical_accuracy", self.historical_accuracy),
        ] {
            check_unit(name, value)?;
        }
        Ok(())
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfidenceError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfidenceError::FactorOutOfRange { name, value })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub pattern: f64,
    pub magnitude: f64,
    pub risk: f64,
    pub history: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            pattern: 0.40,
            magnitude: 0.30,
            risk: 0.20,
            history: 0.10,
        }
    }
}

impl ConfidenceWeights {
    pub fn sum(&self) -> f64 {
        self.pattern + self.magnitude + self.risk + self.history
    }

    /// Each weight must be in `[0, 1]` and the four must sum to 1.0 within tolerance.
    pub fn validate(&self) -> Result<(), ConfidenceError> {
        check_unit("pattern", self.pattern)?;
        check_unit("magnitude", self.magnitude)?;
        check_unit("risk", self.risk)?;
        check_unit("history", self.history)?;

        let total = self.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfidenceError::WeightSum(total));
        }
        Ok(())
    }
}

/// Weighted confidence, clamped to `[0, 1]`.
///
/// ```
/// use docheal::confidence::{calculate_confidence, ConfidenceFactors, ConfidenceWeights};
///
/// let factors = ConfidenceFactors::new(0.95, 0.90, 0.85, 0.92).unwrap();
/// let score = calculate_confidence(&factors, &ConfidenceWeights::default()).unwrap();
/// assert!((score - 0.912).abs() < 1e-9);
/// ```
pub fn calculate_confidence(
    factors: &ConfidenceFactors,
    weights: &ConfidenceWeights,
) -> Result<f64, ConfidenceError> {
    factors.validate()?;
    weights.validate()?;

    let score = factors.pattern_match * weights.pattern
        + factors.change_magnitude * weights.magnitude
        + factors.risk_assessment * weights.risk
        + factors.historical_accuracy * weights.history;

    Ok(score.clamp(0.0, 1.0))
}

/// What may be done automatically with a change of a given confidence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionTier {
    ReportOnly,
    AutoStage,
    AutoCommit,
}

impl ActionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTier::ReportOnly => "report_only",
            ActionTier::AutoStage => "auto_stage",
            ActionTier::AutoCommit => "auto_commit",
        }
    }
}

impl fmt::Display for ActionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionThresholds {
    pub auto_commit: f64,
    pub auto_stage: f64,
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            auto_commit: 0.90,
            auto_stage: 0.80,
        }
    }
}

impl ActionThresholds {
    pub fn tier(&self, confidence: f64) -> ActionTier {
        if confidence >= self.auto_commit {
            ActionTier::AutoCommit
        } else if confidence >= self.auto_stage {
            ActionTier::AutoStage
        } else {
            ActionTier::ReportOnly
        }
    }
}

/// Kind of change, used for the risk factor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    TypoFix,
    BrokenLinkFix,
    FormattingFix,
    SyncCanonical,
    DuplicateConsolidation,
    StructuralChange,
    CodeChange,
}

impl ChangeCategory {
    /// Risk score; higher means safer.
    pub fn risk_score(self) -> f64 {
        match self {
            ChangeCategory::TypoFix => 1.0,
            ChangeCategory::BrokenLinkFix => 0.9,
            ChangeCategory::FormattingFix => 0.85,
            ChangeCategory::SyncCanonical => 0.8,
            ChangeCategory::DuplicateConsolidation => 0.8,
            ChangeCategory::StructuralChange => 0.5,
            ChangeCategory::CodeChange => 0.3,
        }
    }
}

fn line_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.lines().count().max(1)
    }
}

/// Magnitude score from the number of lines an edit spans; smaller edits score higher.
pub fn assess_change_magnitude(old_text: &str, new_text: &str) -> f64 {
    let span = line_count(old_text).max(line_count(new_text));
    match span {
        0..=5 => 1.0,
        6..=10 => 0.9,
        11..=20 => 0.8,
        21..=50 => 0.6,
        51..=100 => 0.4,
        _ => 0.2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = ConfidenceWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-12);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_weights() {
        let weights = ConfidenceWeights {
            pattern: 0.5,
            magnitude: 0.5,
            risk: 0.5,
            history: 0.0,
        };
        assert!(matches!(weights.validate(), Err(ConfidenceError::WeightSum(_))));

        let within_tolerance = ConfidenceWeights {
            pattern: 0.405,
            ..ConfidenceWeights::default()
        };
        assert!(within_tolerance.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_factor() {
        let err = ConfidenceFactors::new(1.2, 1.0, 1.0, 1.0).unwrap_err();
        assert_eq!(
            err,
            ConfidenceError::FactorOutOfRange {
                name: "pattern_match",
                value: 1.2
            }
        );
    }

    #[test]
    fn test_tiers() {
        let thresholds = ActionThresholds::default();
        assert_eq!(thresholds.tier(0.95), ActionTier::AutoCommit);
        assert_eq!(thresholds.tier(0.90), ActionTier::AutoCommit);
        assert_eq!(thresholds.tier(0.85), ActionTier::AutoStage);
        assert_eq!(thresholds.tier(0.80), ActionTier::AutoStage);
        assert_eq!(thresholds.tier(0.75), ActionTier::ReportOnly);
        assert_eq!(ActionTier::AutoStage.to_string(), "auto_stage");
    }

    #[test]
    fn test_change_magnitude_steps() {
        let lines = |n: usize| vec!["x"; n].join("\n");
        assert_eq!(assess_change_magnitude("a", "b"), 1.0);
        assert_eq!(assess_change_magnitude(&lines(5), "b"), 1.0);
        assert_eq!(assess_change_magnitude(&lines(6), "b"), 0.9);
        assert_eq!(assess_change_magnitude(&lines(20), ""), 0.8);
        assert_eq!(assess_change_magnitude(&lines(40), "b"), 0.6);
        assert_eq!(assess_change_magnitude("a", &lines(100)), 0.4);
        assert_eq!(assess_change_magnitude(&lines(101), "b"), 0.2);
    }

    #[test]
    fn test_risk_lookup() {
        assert_eq!(ChangeCategory::TypoFix.risk_score(), 1.0);
        assert_eq!(ChangeCategory::BrokenLinkFix.risk_score(), 0.9);
        assert_eq!(ChangeCategory::StructuralChange.risk_score(), 0.5);
    }

    fn weights_strategy() -> impl Strategy<Value = ConfidenceWeights> {
        (1u32..100, 1u32..100, 1u32..100, 1u32..100).prop_map(|(a, b, c, d)| {
            let total = f64::from(a + b + c + d);
            ConfidenceWeights {
                pattern: f64::from(a) / total,
                magnitude: f64::from(b) / total,
                risk: f64::from(c) / total,
                history: f64::from(d) / total,
            }
        })
    }

    proptest! {
        #[test]
        fn prop_confidence_is_bounded(
            p in 0.0f64..=1.0,
            m in 0.0f64..=1.0,
            r in 0.0f64..=1.0,
            h in 0.0f64..=1.0,
            weights in weights_strategy(),
        ) {
            let factors = ConfidenceFactors::new(p, m, r, h).unwrap();
            let score = calculate_confidence(&factors, &weights).unwrap();
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_different_weights_give_different_bounded_scores() {
        let factors = ConfidenceFactors::new(1.0, 0.2, 0.5, 0.9).unwrap();
        let a = calculate_confidence(&factors, &ConfidenceWeights::default()).unwrap();
        let b = calculate_confidence(
            &factors,
            &ConfidenceWeights {
                pattern: 0.10,
                magnitude: 0.40,
                risk: 0.40,
                history: 0.10,
            },
        )
        .unwrap();
        assert!((a - b).abs() > 1e-6);
        assert!((0.0..=1.0).contains(&a) && (0.0..=1.0).contains(&b));
    }
}
