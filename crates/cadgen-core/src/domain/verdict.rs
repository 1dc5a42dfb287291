//! Visual critic verdicts.

use serde::{Deserialize, Serialize};

/// Lowest confidence at which a matching verdict counts as valid.
pub const PASSING_CONFIDENCE: u8 = 7;

/// Confidence assumed when the critic does not report one.
pub const DEFAULT_CONFIDENCE: u8 = 1;

/// Structured verdict from the visual critic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualVerdict {
    /// `confidence >= 7 && matches`.
    pub valid: bool,
    #[serde(rename = "match")]
    pub matches: bool,
    /// 1–10.
    pub confidence: u8,
    pub category: Option<String>,
    pub missing: Option<String>,
    pub proportions_issue: Option<String>,
    pub critique: Option<String>,
}

impl VisualVerdict {
    /// Build a verdict, clamping confidence into 1–10 and deriving `valid`.
    pub fn new(matches: bool, confidence: u8) -> Self {
        let confidence = confidence.clamp(1, 10);
        Self {
            valid: matches && confidence >= PASSING_CONFIDENCE,
            matches,
            confidence,
            category: None,
            missing: None,
            proportions_issue: None,
            critique: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_missing(mut self, missing: impl Into<String>) -> Self {
        self.missing = Some(missing.into());
        self
    }

    pub fn with_proportions_issue(mut self, issue: impl Into<String>) -> Self {
        self.proportions_issue = Some(issue.into());
        self
    }

    pub fn with_critique(mut self, critique: impl Into<String>) -> Self {
        self.critique = Some(critique.into());
        self
    }
}

/// What the visual stage reports on the run result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualCheck {
    pub verdict: Option<VisualVerdict>,
    /// `Some(true)` when a critique-driven repair replaced the artifact,
    /// `Some(false)` when it was attempted and the original was kept.
    pub retried: Option<bool>,
    /// Critic failure; the stage is fail-open so this never fails the run.
    pub error: Option<String>,
    /// Why the critique-driven repair was discarded.
    pub retry_error: Option<String>,
}

impl VisualCheck {
    pub fn from_verdict(verdict: VisualVerdict) -> Self {
        Self {
            verdict: Some(verdict),
            ..Default::default()
        }
    }

    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_requires_match_and_confidence() {
        assert!(VisualVerdict::new(true, 7).valid);
        assert!(!VisualVerdict::new(true, 6).valid);
        assert!(!VisualVerdict::new(false, 10).valid);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(VisualVerdict::new(true, 0).confidence, 1);
        assert_eq!(VisualVerdict::new(true, 42).confidence, 10);
    }

    #[test]
    fn test_match_field_serializes_as_match() {
        let json = serde_json::to_value(VisualVerdict::new(true, 8)).unwrap();
        assert_eq!(json["match"], serde_json::json!(true));
        assert_eq!(json["valid"], serde_json::json!(true));
    }

    #[test]
    fn test_visual_check_from_error_is_not_valid() {
        let check = VisualCheck::from_error("critic timed out");
        assert!(!check.is_valid());
        assert_eq!(check.retried, None);
    }
}
