//! Background AI grading of new submissions.
//!
//! Submissions are handed to a worker task over an unbounded channel so the
//! intake path never waits on the scorer. The worker re-checks each submission
//! before acting and backs off if a human got there first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use super::grading::{Conclusion, GradingCore, RunOrigin};
use crate::error::{GradingError, Result};
use crate::types::{AssessmentType, SubmissionId};

/// Why the auto-grader left a submission alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyGraded,
    HasGrades,
    GradingInProgress,
    NotTeacherAssessment,
    Draft,
}

/// What the auto-grader did with one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum AutoGradeDecision {
    Graded,
    Skipped(SkipReason),
}

#[derive(Debug)]
enum WorkerMessage {
    Grade(SubmissionId),
    Shutdown,
}

/// Handle to the background auto-grading worker.
pub(super) struct AutoGrader {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl AutoGrader {
    pub(super) fn spawn(core: Arc<GradingCore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            Self::worker_task(core, rx).await;
        });
        Self { tx }
    }

    async fn worker_task(core: Arc<GradingCore>, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
        debug!("Auto-grade worker started");

        while let Some(msg) = rx.recv().await {
            match msg {
                WorkerMessage::Grade(submission_id) => {
                    trace!(%submission_id, "Auto-grading submission");
                    // Failures stay inside the worker; the submission stays ungraded.
                    if let Err(e) = core.auto_grade(submission_id).await {
                        error!(%submission_id, error = %e, "Auto-grading failed");
                    }
                }
                WorkerMessage::Shutdown => {
                    debug!("Auto-grade worker received shutdown signal");
                    break;
                }
            }
        }

        debug!("Auto-grade worker stopped");
    }

    /// Queue a submission. Never blocks.
    pub(super) fn enqueue(&self, submission_id: SubmissionId) {
        if let Err(e) = self.tx.send(WorkerMessage::Grade(submission_id)) {
            error!(error = %e, "Failed to queue auto-grading - worker stopped");
        }
    }

    pub(super) fn shutdown(&self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
    }
}

impl GradingCore {
    /// Grade a submission with AI on behalf of its owning teacher, unless
    /// anyone has already graded it or is grading it now.
    pub(super) async fn auto_grade(
        &self,
        submission_id: SubmissionId,
    ) -> Result<AutoGradeDecision> {
        let Some(_run) = self.in_flight.try_enter(submission_id) else {
            return Ok(skipped(submission_id, SkipReason::GradingInProgress));
        };

        let (submission, assessment) = self.load_pair(submission_id).await?;
        if submission.is_graded() {
            return Ok(skipped(submission_id, SkipReason::AlreadyGraded));
        }
        if submission.is_draft() {
            return Ok(skipped(submission_id, SkipReason::Draft));
        }
        if assessment.assessment_type != AssessmentType::Teacher {
            return Ok(skipped(submission_id, SkipReason::NotTeacherAssessment));
        }
        if !self.recorder.grades_for(submission_id).await?.is_empty() {
            return Ok(skipped(submission_id, SkipReason::HasGrades));
        }

        let grader = match self.access().owner_of(&assessment).await {
            Ok(Some(owner)) => owner,
            Ok(None) => self.config().auto_grade.system_grader_id,
            Err(e) => {
                debug!(%submission_id, error = %e, "Owner lookup failed, grading as system");
                self.config().auto_grade.system_grader_id
            }
        };

        let scoring = self
            .score_remaining(&submission, &assessment, grader, RunOrigin::Background)
            .await;
        let grades = self.recorder.grades_for(submission_id).await?;
        let (feedback, ai_generated) = self
            .ai_feedback(&submission, &grades, scoring.failure.is_some())
            .await;

        // A teacher may have graded while the scorer was running. Their
        // feedback and grading time stand; only the skills they left
        // ungraded keep the AI grades written above.
        let current = self
            .submissions
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::not_found("submission", submission_id))?;
        if current.is_graded() {
            let credentials = self.award(&current, &scoring.grades).await;
            self.publish_credentials(&credentials);
            info!(
                %submission_id,
                grades = scoring.grades.len(),
                credentials = credentials.len(),
                "Submission graded by a teacher meanwhile, leaving their feedback"
            );
            return Ok(skipped(submission_id, SkipReason::AlreadyGraded));
        }

        let outcome = self
            .conclude(
                current,
                &assessment,
                grader,
                Conclusion {
                    grades,
                    upserted: scoring.grades,
                    feedback,
                    ai_generated,
                },
            )
            .await?;
        info!(
            %submission_id,
            grades = outcome.grades.len(),
            credentials = outcome.credentials.len(),
            "Auto-graded submission"
        );
        Ok(AutoGradeDecision::Graded)
    }
}

fn skipped(submission_id: SubmissionId, reason: SkipReason) -> AutoGradeDecision {
    debug!(%submission_id, ?reason, "Auto-grading skipped");
    AutoGradeDecision::Skipped(reason)
}
