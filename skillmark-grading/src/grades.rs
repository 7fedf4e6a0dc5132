//! Per-skill grade upserts.
//!
//! [`GradeRecorder::upsert`] is the idempotency backbone of grading: whatever
//! path writes a grade (manual entry, AI scoring, a retried background job),
//! a submission converges to one grade per component skill, and re-grading
//! overwrites the existing row in place with the same identity.
//!
//! The lookup-then-branch sequence has a race window between two writers
//! creating the same pair. The store's unique constraint closes it: the loser
//! gets `Conflict`, re-reads the winner's row and overwrites it, so the
//! outcome is last-write-wins per skill rather than a duplicate.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::error::{GradingError, Result};
use crate::store::GradeStore;
use crate::types::{
    ComponentSkillId, Grade, GradeValues, MAX_SCORE, RubricLevel, SubmissionId, UserId,
};

/// One grade to record.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeInput {
    pub component_skill_id: ComponentSkillId,
    pub rubric_level: RubricLevel,
    /// `None` is stored as-is ("not scored yet").
    pub score: Option<f64>,
    pub feedback: Option<String>,
}

impl GradeInput {
    pub fn new(
        component_skill_id: impl Into<ComponentSkillId>,
        rubric_level: RubricLevel,
        score: Option<f64>,
    ) -> Self {
        Self {
            component_skill_id: component_skill_id.into(),
            rubric_level,
            score,
            feedback: None,
        }
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// Clamp a score into the 0–4 scale. Non-finite values become `None`.
pub fn normalize_score(score: Option<f64>) -> Option<f64> {
    score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, MAX_SCORE))
}

/// Writes grades with upsert semantics.
pub struct GradeRecorder {
    store: Arc<dyn GradeStore>,
}

impl GradeRecorder {
    pub fn new(store: Arc<dyn GradeStore>) -> Self {
        Self { store }
    }

    /// Create or overwrite the grade for `(submission_id, input.component_skill_id)`.
    pub async fn upsert(
        &self,
        submission_id: SubmissionId,
        input: &GradeInput,
        grader_id: UserId,
    ) -> Result<Grade> {
        let values = GradeValues {
            rubric_level: input.rubric_level,
            score: normalize_score(input.score),
            feedback: input.feedback.clone(),
            graded_by: grader_id,
            graded_at: Utc::now(),
        };
        let skill = input.component_skill_id;

        if let Some(existing) = self.store.find_grade(submission_id, skill).await? {
            trace!(grade_id = %existing.id, "Updating grade in place");
            return self.store.update_grade(existing.id, &values).await;
        }

        match self.store.insert_grade(submission_id, skill, &values).await {
            Ok(grade) => {
                trace!(grade_id = %grade.id, "Created grade");
                Ok(grade)
            }
            Err(GradingError::Conflict(reason)) => {
                debug!(
                    submission_id = %submission_id,
                    component_skill_id = %skill,
                    %reason,
                    "Concurrent grade insert, overwriting winner"
                );
                let winner = self
                    .store
                    .find_grade(submission_id, skill)
                    .await?
                    .ok_or_else(|| GradingError::Conflict(reason))?;
                self.store.update_grade(winner.id, &values).await
            }
            Err(e) => Err(e),
        }
    }

    /// Create the grade only if the pair has none yet.
    ///
    /// Returns `None` when a grade already exists, including one that lands
    /// between the lookup and the insert. Existing grades are never touched.
    pub async fn record_if_ungraded(
        &self,
        submission_id: SubmissionId,
        input: &GradeInput,
        grader_id: UserId,
    ) -> Result<Option<Grade>> {
        let skill = input.component_skill_id;
        if self.store.find_grade(submission_id, skill).await?.is_some() {
            return Ok(None);
        }

        let values = GradeValues {
            rubric_level: input.rubric_level,
            score: normalize_score(input.score),
            feedback: input.feedback.clone(),
            graded_by: grader_id,
            graded_at: Utc::now(),
        };
        match self.store.insert_grade(submission_id, skill, &values).await {
            Ok(grade) => Ok(Some(grade)),
            Err(GradingError::Conflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upsert several grades for one submission, stopping at the first error.
    pub async fn upsert_all(
        &self,
        submission_id: SubmissionId,
        inputs: &[GradeInput],
        grader_id: UserId,
    ) -> Result<Vec<Grade>> {
        let mut grades = Vec::with_capacity(inputs.len());
        for input in inputs {
            grades.push(self.upsert(submission_id, input, grader_id).await?);
        }
        Ok(grades)
    }

    /// All grades currently stored for a submission.
    pub async fn grades_for(&self, submission_id: SubmissionId) -> Result<Vec<Grade>> {
        self.store.grades_for_submission(submission_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Submission, SubmissionId};

    async fn recorder() -> (GradeRecorder, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.put_submission(Submission::new(1, 1, 9)).await;
        (GradeRecorder::new(store.clone()), store)
    }

    #[tokio::test]
    async fn creates_then_updates_in_place() {
        let (recorder, store) = recorder().await;

        let first = recorder
            .upsert(
                SubmissionId(1),
                &GradeInput::new(5, RubricLevel::Developing, Some(2.0)),
                UserId(2),
            )
            .await
            .unwrap();
        let second = recorder
            .upsert(
                SubmissionId(1),
                &GradeInput::new(5, RubricLevel::Applying, Some(4.0)).with_feedback("Great"),
                UserId(3),
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.rubric_level, RubricLevel::Applying);
        assert_eq!(second.score, Some(4.0));
        assert_eq!(second.feedback.as_deref(), Some("Great"));
        assert_eq!(second.graded_by, UserId(3));
        assert!(second.graded_at >= first.graded_at);
        assert_eq!(store.grade_count().await, 1);
    }

    #[tokio::test]
    async fn one_grade_per_skill() {
        let (recorder, _store) = recorder().await;
        let inputs = vec![
            GradeInput::new(5, RubricLevel::Emerging, Some(1.0)),
            GradeInput::new(6, RubricLevel::Proficient, Some(3.0)),
        ];
        recorder.upsert_all(SubmissionId(1), &inputs, UserId(2)).await.unwrap();
        recorder.upsert_all(SubmissionId(1), &inputs, UserId(2)).await.unwrap();

        let grades = recorder.grades_for(SubmissionId(1)).await.unwrap();
        assert_eq!(grades.len(), 2);
    }

    #[tokio::test]
    async fn null_score_is_preserved() {
        let (recorder, _store) = recorder().await;
        let grade = recorder
            .upsert(SubmissionId(1), &GradeInput::new(5, RubricLevel::Emerging, None), UserId(2))
            .await
            .unwrap();
        assert_eq!(grade.score, None);
    }

    #[tokio::test]
    async fn concurrent_upserts_converge_to_one_row() {
        let (recorder, store) = recorder().await;
        let recorder = Arc::new(recorder);

        let mut handles = Vec::new();
        for level in RubricLevel::ALL {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                recorder
                    .upsert(SubmissionId(1), &GradeInput::new(5, level, Some(1.0)), UserId(2))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.grade_count().await, 1);
    }

    #[tokio::test]
    async fn record_if_ungraded_leaves_existing_grade_alone() {
        let (recorder, store) = recorder().await;
        recorder
            .upsert(
                SubmissionId(1),
                &GradeInput::new(5, RubricLevel::Applying, Some(4.0)),
                UserId(2),
            )
            .await
            .unwrap();

        let skipped = recorder
            .record_if_ungraded(
                SubmissionId(1),
                &GradeInput::new(5, RubricLevel::Emerging, Some(1.0)),
                UserId(3),
            )
            .await
            .unwrap();
        assert!(skipped.is_none());

        let created = recorder
            .record_if_ungraded(
                SubmissionId(1),
                &GradeInput::new(6, RubricLevel::Emerging, Some(1.0)),
                UserId(3),
            )
            .await
            .unwrap();
        assert_eq!(created.unwrap().component_skill_id, ComponentSkillId(6));

        let kept = store
            .find_grade(SubmissionId(1), ComponentSkillId(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.rubric_level, RubricLevel::Applying);
        assert_eq!(kept.graded_by, UserId(2));
    }

    #[test]
    fn scores_are_clamped_to_scale() {
        assert_eq!(normalize_score(Some(7.5)), Some(4.0));
        assert_eq!(normalize_score(Some(-1.0)), Some(0.0));
        assert_eq!(normalize_score(Some(2.5)), Some(2.5));
        assert_eq!(normalize_score(Some(f64::NAN)), None);
        assert_eq!(normalize_score(None), None);
    }
}
