//! AI scoring and reference-document extraction seams.
//!
//! The engine never talks to a model directly. Hosts plug an [`AiScorer`] and a
//! [`DocumentExtractor`] into the orchestrator; the no-op implementations are
//! the defaults when AI grading is not configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Assessment, ComponentSkill, ComponentSkillId, Grade, RubricLevel, Submission};

/// Errors from an AI scorer call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScorerError {
    #[error("AI scorer unavailable: {0}")]
    Unavailable(String),

    #[error("AI scorer timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("AI scorer returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// One skill judgement produced by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSkill {
    pub component_skill_id: ComponentSkillId,
    pub rubric_level: RubricLevel,
    /// 0–4 scale. Omitted scores are recorded as 0.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// External AI scoring service.
#[async_trait]
pub trait AiScorer: Send + Sync {
    /// Judge a submission against the given skills.
    ///
    /// `reference_text` is the extracted rubric or exemplar document, if any.
    async fn score_skills(
        &self,
        submission: &Submission,
        assessment: &Assessment,
        skills: &[ComponentSkill],
        reference_text: Option<&str>,
    ) -> Result<Vec<ScoredSkill>, ScorerError>;

    /// Overall narrative feedback from the persisted grades.
    async fn summarize(
        &self,
        submission: &Submission,
        grades: &[Grade],
    ) -> Result<String, ScorerError>;

    /// Feedback on a single answer, pitched at `level`.
    async fn score_single_question(
        &self,
        question_text: &str,
        response_text: &str,
        level: RubricLevel,
    ) -> Result<String, ScorerError>;
}

/// Best-effort text extraction from reference documents.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extracted text, or `None` when the document cannot be read.
    async fn extract_text(&self, url: &str) -> Option<String>;
}

/// Scorer used when no AI service is configured. Every call is `Unavailable`.
pub struct NoOpScorer;

#[async_trait]
impl AiScorer for NoOpScorer {
    async fn score_skills(
        &self,
        _submission: &Submission,
        _assessment: &Assessment,
        _skills: &[ComponentSkill],
        _reference_text: Option<&str>,
    ) -> Result<Vec<ScoredSkill>, ScorerError> {
        Err(ScorerError::Unavailable("no scorer configured".into()))
    }

    async fn summarize(
        &self,
        _submission: &Submission,
        _grades: &[Grade],
    ) -> Result<String, ScorerError> {
        Err(ScorerError::Unavailable("no scorer configured".into()))
    }

    async fn score_single_question(
        &self,
        _question_text: &str,
        _response_text: &str,
        _level: RubricLevel,
    ) -> Result<String, ScorerError> {
        Err(ScorerError::Unavailable("no scorer configured".into()))
    }
}

/// Extractor that never finds any text.
pub struct NoOpExtractor;

#[async_trait]
impl DocumentExtractor for NoOpExtractor {
    async fn extract_text(&self, _url: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_scorer_is_unavailable() {
        let submission = Submission::new(1, 1, 9);
        let assessment = Assessment::new(1, "Quiz");

        let result = NoOpScorer
            .score_skills(&submission, &assessment, &[], None)
            .await;
        assert!(matches!(result, Err(ScorerError::Unavailable(_))));
        assert!(NoOpScorer.summarize(&submission, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_noop_extractor_finds_nothing() {
        assert_eq!(NoOpExtractor.extract_text("https://example.org/rubric.pdf").await, None);
    }

    #[test]
    fn test_scored_skill_score_is_optional() {
        let parsed: ScoredSkill =
            serde_json::from_str(r#"{"component_skill_id": 4, "rubric_level": "proficient"}"#)
                .unwrap();
        assert_eq!(parsed.score, None);
        assert_eq!(parsed.rubric_level, RubricLevel::Proficient);
    }
}
