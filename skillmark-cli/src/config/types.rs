use serde::Deserialize;

/// Grading configuration as stored in TOML files (optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawGradingConfig {
    #[serde(default)]
    pub share_codes: RawShareCodeConfig,

    #[serde(default)]
    pub preview: RawPreviewConfig,

    #[serde(default)]
    pub scorer: RawScorerConfig,

    #[serde(default)]
    pub auto_grade: RawAutoGradeConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawShareCodeConfig {
    /// Days a new share code stays valid
    pub ttl_days: Option<u32>,

    /// Candidate codes tried before giving up
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPreviewConfig {
    pub enabled: Option<bool>,

    /// Preview requests per student and assessment
    pub max_requests: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawScorerConfig {
    pub timeout_seconds: Option<u64>,
    pub fallback_feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAutoGradeConfig {
    pub enabled: Option<bool>,
    pub system_grader_id: Option<i64>,
}
