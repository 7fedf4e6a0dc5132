//! Grading engine configuration.
//!
//! Every section carries `#[serde(default)]`, so a config file only needs to
//! name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Placeholder written to a submission when the AI scorer fails.
pub const AI_FALLBACK_FEEDBACK: &str =
    "AI feedback generation failed. Please provide manual feedback.";

/// Main configuration for the grading engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    /// Share code issuance.
    pub share_codes: ShareCodeConfig,
    /// Pre-submission preview feedback.
    pub preview: PreviewConfig,
    /// External AI scorer behavior.
    pub scorer: ScorerConfig,
    /// Background auto-grading of new submissions.
    pub auto_grade: AutoGradeConfig,
}

impl GradingConfig {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Share code issuance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareCodeConfig {
    /// Days a freshly issued code stays resolvable.
    pub ttl_days: u32,
    /// Candidates tried before giving up with `CodeExhaustion`.
    pub max_attempts: u32,
}

impl Default for ShareCodeConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            max_attempts: 10,
        }
    }
}

/// Preview feedback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Whether students may request preview feedback at all.
    pub enabled: bool,
    /// Preview requests allowed per student and assessment before submitting.
    pub max_requests: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 3,
        }
    }
}

/// AI scorer call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Upper bound on a single scorer call; expiry counts as a scorer failure.
    pub timeout_seconds: u64,
    /// Feedback stored when the scorer fails.
    pub fallback_feedback: String,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            fallback_feedback: AI_FALLBACK_FEEDBACK.to_string(),
        }
    }
}

/// Background auto-grading settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoGradeConfig {
    /// Whether new teacher-assessment submissions are queued for AI grading.
    pub enabled: bool,
    /// Grader recorded when no owning teacher can be resolved.
    pub system_grader_id: UserId,
}

impl Default for AutoGradeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            system_grader_id: UserId(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_business_rules() {
        let config = GradingConfig::default();
        assert_eq!(config.share_codes.ttl_days, 7);
        assert_eq!(config.share_codes.max_attempts, 10);
        assert_eq!(config.preview.max_requests, 3);
        assert_eq!(config.scorer.fallback_feedback, AI_FALLBACK_FEEDBACK);
        assert!(config.auto_grade.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GradingConfig::from_toml(
            r#"
[share_codes]
ttl_days = 14

[preview]
max_requests = 5
"#,
        )
        .unwrap();
        assert_eq!(config.share_codes.ttl_days, 14);
        assert_eq!(config.share_codes.max_attempts, 10);
        assert_eq!(config.preview.max_requests, 5);
        assert!(config.preview.enabled);
        assert_eq!(config.scorer.timeout_seconds, 60);
    }

    #[test]
    fn test_config_serialization() {
        let config = GradingConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed = GradingConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed, config);
    }
}
