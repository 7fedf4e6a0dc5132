//! Rate-limited feedback on drafts before a student submits.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::GradingOrchestrator;
use crate::error::{GradingError, Result};
use crate::scorer::ScoredSkill;
use crate::types::{Actor, AssessmentId, AssessmentType, Submission, SubmissionId, UserId};

/// Per `(student, assessment)` preview counter.
///
/// Process-local: counts are lost on restart and are not shared between
/// processes.
pub struct PreviewLimiter {
    max_requests: u32,
    counts: RwLock<HashMap<(UserId, AssessmentId), u32>>,
}

impl PreviewLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self {
            max_requests,
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Count one request, returning how many remain afterwards.
    ///
    /// Fails with `RateLimited` once the cap is reached; rejected requests
    /// are not counted.
    pub async fn try_acquire(
        &self,
        student_id: UserId,
        assessment_id: AssessmentId,
    ) -> Result<u32> {
        let mut counts = self.counts.write().await;
        let used = counts.entry((student_id, assessment_id)).or_insert(0);
        if *used >= self.max_requests {
            return Err(GradingError::RateLimited {
                limit: self.max_requests,
            });
        }
        *used += 1;
        Ok(self.max_requests - *used)
    }

    /// Forget a student's count for an assessment.
    pub async fn reset(&self, student_id: UserId, assessment_id: AssessmentId) {
        if self
            .counts
            .write()
            .await
            .remove(&(student_id, assessment_id))
            .is_some()
        {
            debug!(%student_id, %assessment_id, "Preview counter cleared");
        }
    }

    pub async fn used(&self, student_id: UserId, assessment_id: AssessmentId) -> u32 {
        self.counts
            .read()
            .await
            .get(&(student_id, assessment_id))
            .copied()
            .unwrap_or(0)
    }
}

/// Feedback returned for a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewFeedback {
    pub assessment_id: AssessmentId,
    /// Per-skill judgements; empty when the scorer failed.
    pub skills: Vec<ScoredSkill>,
    pub feedback: String,
    /// Preview requests left before the student must submit.
    pub remaining_requests: u32,
}

impl GradingOrchestrator {
    /// Score a student's draft answers without persisting anything.
    ///
    /// Only teacher assessments the student can attempt qualify, and only
    /// while the student has not submitted. Each call counts toward the
    /// preview cap, which resets when the student submits.
    pub async fn preview_feedback(
        &self,
        student_id: UserId,
        assessment_id: AssessmentId,
        responses: Vec<String>,
    ) -> Result<PreviewFeedback> {
        let core = &self.core;
        if !core.config().preview.enabled {
            return Err(GradingError::InvalidState(
                "preview feedback is disabled".into(),
            ));
        }

        let assessment = core
            .assessments
            .get_assessment(assessment_id)
            .await?
            .ok_or_else(|| GradingError::not_found("assessment", assessment_id))?;
        if assessment.assessment_type != AssessmentType::Teacher {
            return Err(GradingError::InvalidState(format!(
                "preview feedback is only available for teacher assessments, not {}",
                assessment.assessment_type.as_str()
            )));
        }
        if !core
            .access()
            .can_attempt(&Actor::student(student_id), &assessment)
            .await
        {
            return Err(GradingError::AccessDenied);
        }

        let existing = core
            .submissions
            .find_submission(assessment_id, student_id)
            .await?;
        if existing.as_ref().is_some_and(|s| !s.is_draft()) {
            return Err(GradingError::InvalidState(
                "assessment already submitted".into(),
            ));
        }

        let remaining_requests = self.preview.try_acquire(student_id, assessment_id).await?;

        let mut draft = existing.unwrap_or_else(|| Submission {
            id: SubmissionId(0),
            assessment_id: Some(assessment_id),
            student_id,
            responses: Vec::new(),
            submitted_at: None,
            graded_at: None,
            feedback: None,
            ai_generated_feedback: false,
        });
        draft.responses = responses;

        let skills = core.target_skills(&assessment, &HashSet::new()).await?;
        let reference = core.reference_text(&assessment).await;

        let scored = core
            .call_scorer(
                core.scorer
                    .score_skills(&draft, &assessment, &skills, reference.as_deref()),
            )
            .await;

        let (skills_scored, feedback) = match scored {
            Ok(scored) => {
                let names: HashMap<_, _> = skills.iter().map(|s| (s.id, s.name.as_str())).collect();
                let feedback = scored
                    .iter()
                    .map(|s| {
                        let name = names.get(&s.component_skill_id).copied().unwrap_or("Skill");
                        match &s.feedback {
                            Some(text) => format!("{}: {}. {}", name, s.rubric_level.label(), text),
                            None => format!("{}: {}", name, s.rubric_level.label()),
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                (scored, feedback)
            }
            Err(e) => {
                warn!(%student_id, %assessment_id, error = %e, "Preview scoring failed");
                (Vec::new(), core.fallback_feedback())
            }
        };

        Ok(PreviewFeedback {
            assessment_id,
            skills: skills_scored,
            feedback,
            remaining_requests,
        })
    }

    /// Preview requests a student has used for an assessment.
    pub async fn preview_requests_used(
        &self,
        student_id: UserId,
        assessment_id: AssessmentId,
    ) -> u32 {
        self.preview.used(student_id, assessment_id).await
    }
}
