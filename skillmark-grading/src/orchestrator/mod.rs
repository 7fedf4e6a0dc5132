//! Grading orchestration.
//!
//! [`GradingOrchestrator`] is the entry point the host calls when a teacher
//! grades, a student asks for preview feedback, or a new submission arrives.
//! It owns the grading pipeline, the preview rate limiter and the background
//! auto-grading worker, and broadcasts [`GradingEvent`]s as work completes.
//!
//! Per submission the pipeline moves `Ungraded → Grading → Graded`. A failed
//! run falls back to `Ungraded`, keeping whatever grades it already wrote.

mod auto_grade;
mod grading;
mod preview;

pub use auto_grade::{AutoGradeDecision, SkipReason};
pub use preview::{PreviewFeedback, PreviewLimiter};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::access::SubmissionAccessGuard;
use crate::config::GradingConfig;
use crate::error::Result;
use crate::events::GradingEvent;
use crate::grades::GradeInput;
use crate::scorer::{AiScorer, DocumentExtractor};
use crate::store::GradingStore;
use crate::types::{Credential, Grade, Submission, SubmissionId, UserId};

use auto_grade::AutoGrader;
use grading::GradingCore;

/// Lifecycle of one submission through grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingState {
    Ungraded,
    Grading,
    Graded,
}

/// A request to grade one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRequest {
    pub submission_id: SubmissionId,
    pub grader_id: UserId,
    /// Teacher-entered grades. Non-empty disables AI scoring for this call.
    pub manual_grades: Vec<GradeInput>,
    pub generate_ai_feedback: bool,
    /// Teacher feedback, used when AI feedback is not requested.
    pub feedback: Option<String>,
}

impl GradeRequest {
    pub fn manual(
        submission_id: impl Into<SubmissionId>,
        grader_id: impl Into<UserId>,
        grades: Vec<GradeInput>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            grader_id: grader_id.into(),
            manual_grades: grades,
            generate_ai_feedback: false,
            feedback: None,
        }
    }

    pub fn ai(submission_id: impl Into<SubmissionId>, grader_id: impl Into<UserId>) -> Self {
        Self {
            submission_id: submission_id.into(),
            grader_id: grader_id.into(),
            manual_grades: Vec::new(),
            generate_ai_feedback: true,
            feedback: None,
        }
    }

    #[must_use]
    pub fn with_ai_feedback(mut self, enabled: bool) -> Self {
        self.generate_ai_feedback = enabled;
        self
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// Result of a completed grading run.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingOutcome {
    /// Every grade now stored for the submission.
    pub grades: Vec<Grade>,
    pub feedback: Option<String>,
    pub submission: Submission,
    /// Credentials created by this run only.
    pub credentials: Vec<Credential>,
}

/// Coordinates grading, preview feedback and background auto-grading.
pub struct GradingOrchestrator {
    core: Arc<GradingCore>,
    preview: PreviewLimiter,
    auto_grader: AutoGrader,
}

impl GradingOrchestrator {
    /// Wire the orchestrator to a store and AI collaborators.
    ///
    /// Spawns the auto-grading worker, so this must run inside a Tokio runtime.
    pub fn new<S>(
        store: Arc<S>,
        scorer: Arc<dyn AiScorer>,
        extractor: Arc<dyn DocumentExtractor>,
        config: GradingConfig,
    ) -> Self
    where
        S: GradingStore + 'static,
    {
        let preview = PreviewLimiter::new(config.preview.max_requests);
        let core = Arc::new(GradingCore::new(store, scorer, extractor, config));
        let auto_grader = AutoGrader::spawn(core.clone());
        Self {
            core,
            preview,
            auto_grader,
        }
    }

    /// Grade a submission, manually, with AI assistance, or both.
    pub async fn grade_submission(&self, request: GradeRequest) -> Result<GradingOutcome> {
        self.core.grade(request).await
    }

    /// Feedback on a single answer of a submission.
    pub async fn question_feedback(
        &self,
        submission_id: SubmissionId,
        question_index: usize,
    ) -> Result<String> {
        self.core.question_feedback(submission_id, question_index).await
    }

    /// Intake hook for a newly submitted submission.
    ///
    /// Clears the student's preview counter for the assessment and queues the
    /// submission for background AI grading. Returns immediately.
    pub async fn submission_created(&self, submission: &Submission) {
        if let Some(assessment_id) = submission.assessment_id {
            self.preview.reset(submission.student_id, assessment_id).await;
        }
        if self.core.config().auto_grade.enabled {
            self.auto_grader.enqueue(submission.id);
        } else {
            debug!(submission_id = %submission.id, "Auto-grading disabled, not queueing");
        }
    }

    /// Run the background auto-grading check for one submission and wait for it.
    pub async fn auto_grade_now(&self, submission_id: SubmissionId) -> Result<AutoGradeDecision> {
        self.core.auto_grade(submission_id).await
    }

    /// Where a submission currently is in its grading lifecycle.
    pub async fn state_of(&self, submission_id: SubmissionId) -> Result<GradingState> {
        self.core.state_of(submission_id).await
    }

    /// Subscribe to grading events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GradingEvent> {
        self.core.subscribe()
    }

    /// The access guard wired to the same store.
    pub fn access(&self) -> &SubmissionAccessGuard {
        self.core.access()
    }

    pub fn config(&self) -> &GradingConfig {
        self.core.config()
    }

    /// Stop the auto-grading worker after it drains queued submissions.
    pub fn shutdown(&self) {
        self.auto_grader.shutdown();
    }
}

impl Drop for GradingOrchestrator {
    fn drop(&mut self) {
        self.auto_grader.shutdown();
    }
}
