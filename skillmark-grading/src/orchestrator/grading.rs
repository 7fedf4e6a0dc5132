//! The grading pipeline shared by foreground requests and the auto-grader.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{GradeRequest, GradingOutcome, GradingState};
use crate::access::SubmissionAccessGuard;
use crate::config::GradingConfig;
use crate::credentials::CredentialAwarder;
use crate::error::{GradingError, Result};
use crate::events::{EventId, GradingEvent};
use crate::grades::{GradeInput, GradeRecorder};
use crate::scorer::{AiScorer, DocumentExtractor, ScorerError};
use crate::store::{AssessmentStore, GradingStore, SubmissionStore, TaxonomyStore};
use crate::types::{
    Assessment, ComponentSkill, ComponentSkillId, Credential, Grade, RubricLevel, Submission,
    SubmissionId, UserId,
};

/// Submissions with a grading run in progress, counted so overlapping
/// foreground runs keep the submission in `Grading` until the last one ends.
#[derive(Default)]
pub(super) struct InFlight {
    runs: Mutex<HashMap<SubmissionId, usize>>,
}

impl InFlight {
    /// Mark a run as started.
    pub(super) fn enter(self: &Arc<Self>, id: SubmissionId) -> InFlightGuard {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        *runs.entry(id).or_default() += 1;
        InFlightGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Mark a run as started only if no other run is active.
    pub(super) fn try_enter(self: &Arc<Self>, id: SubmissionId) -> Option<InFlightGuard> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(&id) {
            return None;
        }
        runs.insert(id, 1);
        Some(InFlightGuard {
            registry: self.clone(),
            id,
        })
    }

    pub(super) fn contains(&self, id: SubmissionId) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }
}

/// Ends a run on drop, including when the grading future is cancelled.
pub(super) struct InFlightGuard {
    registry: Arc<InFlight>,
    id: SubmissionId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut runs = self
            .registry
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = runs.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                runs.remove(&self.id);
            }
        }
    }
}

/// Everything the pipeline needs, shared with the auto-grading worker.
pub(super) struct GradingCore {
    pub(super) assessments: Arc<dyn AssessmentStore>,
    pub(super) submissions: Arc<dyn SubmissionStore>,
    pub(super) taxonomy: Arc<dyn TaxonomyStore>,
    pub(super) recorder: GradeRecorder,
    awarder: CredentialAwarder,
    access: SubmissionAccessGuard,
    pub(super) scorer: Arc<dyn AiScorer>,
    extractor: Arc<dyn DocumentExtractor>,
    config: GradingConfig,
    pub(super) in_flight: Arc<InFlight>,
    events: broadcast::Sender<GradingEvent>,
}

impl GradingCore {
    pub(super) fn new<S>(
        store: Arc<S>,
        scorer: Arc<dyn AiScorer>,
        extractor: Arc<dyn DocumentExtractor>,
        config: GradingConfig,
    ) -> Self
    where
        S: GradingStore + 'static,
    {
        let (events, _) = broadcast::channel(256);
        Self {
            assessments: store.clone(),
            submissions: store.clone(),
            taxonomy: store.clone(),
            recorder: GradeRecorder::new(store.clone()),
            awarder: CredentialAwarder::new(store.clone(), store.clone()),
            access: SubmissionAccessGuard::new(store),
            scorer,
            extractor,
            config,
            in_flight: Arc::new(InFlight::default()),
            events,
        }
    }

    pub(super) fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub(super) fn access(&self) -> &SubmissionAccessGuard {
        &self.access
    }

    pub(super) fn subscribe(&self) -> broadcast::Receiver<GradingEvent> {
        self.events.subscribe()
    }

    /// Run a scorer call under the configured timeout.
    pub(super) async fn call_scorer<T, F>(&self, call: F) -> std::result::Result<T, ScorerError>
    where
        F: Future<Output = std::result::Result<T, ScorerError>>,
    {
        let seconds = self.config.scorer.timeout_seconds;
        match tokio::time::timeout(Duration::from_secs(seconds), call).await {
            Ok(result) => result,
            Err(_) => Err(ScorerError::Timeout { seconds }),
        }
    }

    pub(super) fn fallback_feedback(&self) -> String {
        self.config.scorer.fallback_feedback.clone()
    }

    /// Load a submission together with the assessment it belongs to.
    pub(super) async fn load_pair(
        &self,
        submission_id: SubmissionId,
    ) -> Result<(Submission, Assessment)> {
        let submission = self
            .submissions
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::not_found("submission", submission_id))?;
        let assessment_id = submission.assessment_id.ok_or_else(|| {
            GradingError::InvalidState(format!(
                "submission {} is not linked to an assessment",
                submission_id
            ))
        })?;
        let assessment = self
            .assessments
            .get_assessment(assessment_id)
            .await?
            .ok_or_else(|| GradingError::not_found("assessment", assessment_id))?;
        Ok((submission, assessment))
    }

    /// Resolve the assessment's target skills, skipping any in `exclude`.
    pub(super) async fn target_skills(
        &self,
        assessment: &Assessment,
        exclude: &HashSet<ComponentSkillId>,
    ) -> Result<Vec<ComponentSkill>> {
        let mut seen = HashSet::new();
        let mut skills = Vec::new();
        for &skill_id in &assessment.component_skill_ids {
            if exclude.contains(&skill_id) || !seen.insert(skill_id) {
                continue;
            }
            match self.taxonomy.get_component_skill(skill_id).await? {
                Some(skill) => skills.push(skill),
                None => warn!(
                    assessment_id = %assessment.id,
                    component_skill_id = %skill_id,
                    "Target skill missing from taxonomy, not scoring it"
                ),
            }
        }
        Ok(skills)
    }

    /// Extract the assessment's reference document, if it has one.
    pub(super) async fn reference_text(&self, assessment: &Assessment) -> Option<String> {
        let url = assessment.reference_document_url.as_deref()?;
        let text = self.extractor.extract_text(url).await;
        if text.is_none() {
            debug!(assessment_id = %assessment.id, "Reference document yielded no text");
        }
        text
    }

    pub(super) async fn grade(&self, request: GradeRequest) -> Result<GradingOutcome> {
        let _run = self.in_flight.enter(request.submission_id);
        self.grade_in_flight(request).await
    }

    /// The pipeline proper. The caller holds an in-flight marker for the submission.
    async fn grade_in_flight(&self, request: GradeRequest) -> Result<GradingOutcome> {
        let (submission, assessment) = self.load_pair(request.submission_id).await?;
        let grader = request.grader_id;

        let mut upserted = self
            .recorder
            .upsert_all(submission.id, &request.manual_grades, grader)
            .await?;

        let mut scoring_failed = false;
        if request.generate_ai_feedback && request.manual_grades.is_empty() {
            let scoring = self
                .score_remaining(&submission, &assessment, grader, RunOrigin::Request)
                .await;
            upserted.extend(scoring.grades);
            scoring_failed = scoring.failure.is_some();
        }

        let grades = self.recorder.grades_for(submission.id).await?;
        let (feedback, ai_generated) = if request.generate_ai_feedback {
            self.ai_feedback(&submission, &grades, scoring_failed).await
        } else {
            (request.feedback.or_else(|| submission.feedback.clone()), false)
        };

        self.conclude(
            submission,
            &assessment,
            grader,
            Conclusion {
                grades,
                upserted,
                feedback,
                ai_generated,
            },
        )
        .await
    }

    /// Ask the scorer for every target skill without a grade and record the results.
    ///
    /// Grades written before a failure are returned alongside it. Background
    /// runs only create grades, so a skill a human graded meanwhile keeps the
    /// human's grade.
    pub(super) async fn score_remaining(
        &self,
        submission: &Submission,
        assessment: &Assessment,
        grader: UserId,
        origin: RunOrigin,
    ) -> AiScoring {
        let mut scoring = AiScoring::default();

        let graded: HashSet<_> = match self.recorder.grades_for(submission.id).await {
            Ok(grades) => grades.into_iter().map(|g| g.component_skill_id).collect(),
            Err(e) => return scoring.fail(submission.id, storage_failure(e)),
        };
        let skills = match self.target_skills(assessment, &graded).await {
            Ok(skills) => skills,
            Err(e) => return scoring.fail(submission.id, storage_failure(e)),
        };
        if skills.is_empty() {
            debug!(submission_id = %submission.id, "No ungraded target skills to score");
            return scoring;
        }

        let reference = self.reference_text(assessment).await;
        let scored = match self
            .call_scorer(self.scorer.score_skills(
                submission,
                assessment,
                &skills,
                reference.as_deref(),
            ))
            .await
        {
            Ok(scored) => scored,
            Err(e) => return scoring.fail(submission.id, e),
        };

        let wanted: HashSet<_> = skills.iter().map(|s| s.id).collect();
        for result in scored {
            if !wanted.contains(&result.component_skill_id) {
                warn!(
                    component_skill_id = %result.component_skill_id,
                    "Scorer returned a skill that was not requested, ignoring"
                );
                continue;
            }
            let input = GradeInput {
                component_skill_id: result.component_skill_id,
                rubric_level: result.rubric_level,
                score: Some(result.score.unwrap_or(0.0)),
                feedback: result.feedback,
            };
            let written = match origin {
                RunOrigin::Request => self
                    .recorder
                    .upsert(submission.id, &input, grader)
                    .await
                    .map(Some),
                RunOrigin::Background => {
                    self.recorder
                        .record_if_ungraded(submission.id, &input, grader)
                        .await
                }
            };
            match written {
                Ok(Some(grade)) => scoring.grades.push(grade),
                Ok(None) => debug!(
                    submission_id = %submission.id,
                    component_skill_id = %input.component_skill_id,
                    "Skill graded by someone else meanwhile, keeping their grade"
                ),
                Err(e) => return scoring.fail(submission.id, storage_failure(e)),
            }
        }
        scoring
    }

    /// Narrative feedback over the stored grades, or the placeholder.
    ///
    /// The summary is requested even when scoring failed, so the student still
    /// gets a narrative over whatever grades exist.
    pub(super) async fn ai_feedback(
        &self,
        submission: &Submission,
        grades: &[Grade],
        scoring_failed: bool,
    ) -> (Option<String>, bool) {
        match self
            .call_scorer(self.scorer.summarize(submission, grades))
            .await
        {
            Ok(summary) => (Some(summary), true),
            Err(e) => {
                warn!(
                    submission_id = %submission.id,
                    scoring_failed,
                    error = %e,
                    "AI summary failed, using placeholder feedback"
                );
                (Some(self.fallback_feedback()), false)
            }
        }
    }

    /// Mark the submission graded, award credentials and announce the result.
    pub(super) async fn conclude(
        &self,
        mut submission: Submission,
        assessment: &Assessment,
        grader: UserId,
        conclusion: Conclusion,
    ) -> Result<GradingOutcome> {
        submission.graded_at = Some(Utc::now());
        submission.feedback = conclusion.feedback.clone();
        submission.ai_generated_feedback = conclusion.ai_generated;
        let submission = self.submissions.update_submission(&submission).await?;

        let credentials = self.award(&submission, &conclusion.upserted).await;

        info!(
            submission_id = %submission.id,
            grades = conclusion.grades.len(),
            credentials = credentials.len(),
            ai_generated_feedback = conclusion.ai_generated,
            "Submission graded"
        );
        self.publish(&submission, assessment, grader, &credentials);

        Ok(GradingOutcome {
            grades: conclusion.grades,
            feedback: conclusion.feedback,
            submission,
            credentials,
        })
    }

    /// Award stickers for `upserted` without touching the submission record.
    pub(super) async fn award(
        &self,
        submission: &Submission,
        upserted: &[Grade],
    ) -> Vec<Credential> {
        self.awarder
            .award_for_grades(submission.student_id, upserted)
            .await
    }

    fn publish(
        &self,
        submission: &Submission,
        assessment: &Assessment,
        grader: UserId,
        credentials: &[Credential],
    ) {
        // No subscribers is fine.
        let _ = self.events.send(GradingEvent::SubmissionGraded {
            event_id: EventId::new(),
            submission_id: submission.id,
            assessment_id: assessment.id,
            student_id: submission.student_id,
            graded_by: grader,
            ai_generated_feedback: submission.ai_generated_feedback,
            graded_at: submission.graded_at.unwrap_or_else(Utc::now),
        });
        self.publish_credentials(credentials);
    }

    pub(super) fn publish_credentials(&self, credentials: &[Credential]) {
        for credential in credentials {
            let _ = self.events.send(GradingEvent::CredentialAwarded {
                event_id: EventId::new(),
                credential: credential.clone(),
            });
        }
    }

    pub(super) async fn question_feedback(
        &self,
        submission_id: SubmissionId,
        question_index: usize,
    ) -> Result<String> {
        let (submission, assessment) = self.load_pair(submission_id).await?;
        let question = assessment.questions.get(question_index).ok_or_else(|| {
            GradingError::InvalidState(format!(
                "question index {} out of range for assessment {} ({} questions)",
                question_index,
                assessment.id,
                assessment.questions.len()
            ))
        })?;
        let response = submission
            .responses
            .get(question_index)
            .map(String::as_str)
            .unwrap_or_default();

        let level = self
            .recorder
            .grades_for(submission_id)
            .await?
            .iter()
            .map(|g| g.rubric_level)
            .max()
            .unwrap_or(RubricLevel::Developing);

        match self
            .call_scorer(
                self.scorer
                    .score_single_question(&question.text, response, level),
            )
            .await
        {
            Ok(feedback) => Ok(feedback),
            Err(e) => {
                warn!(%submission_id, question_index, error = %e, "Question feedback failed");
                Ok(self.fallback_feedback())
            }
        }
    }

    pub(super) async fn state_of(&self, submission_id: SubmissionId) -> Result<GradingState> {
        if self.in_flight.contains(submission_id) {
            return Ok(GradingState::Grading);
        }
        let submission = self
            .submissions
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::not_found("submission", submission_id))?;
        Ok(if submission.is_graded() {
            GradingState::Graded
        } else {
            GradingState::Ungraded
        })
    }
}

/// Who started a grading run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RunOrigin {
    /// A teacher or host request. Last write wins per skill.
    Request,
    /// The auto-grader. Yields to grades written by anyone else.
    Background,
}

/// Grades written by an AI scoring pass, and what stopped it early.
#[derive(Debug, Default)]
pub(super) struct AiScoring {
    pub(super) grades: Vec<Grade>,
    pub(super) failure: Option<ScorerError>,
}

impl AiScoring {
    fn fail(mut self, submission_id: SubmissionId, error: ScorerError) -> Self {
        warn!(
            %submission_id,
            persisted = self.grades.len(),
            error = %error,
            "AI scoring failed, keeping grades written so far"
        );
        self.failure = Some(error);
        self
    }
}

/// Everything decided about a run before the submission is marked graded.
pub(super) struct Conclusion {
    /// Every grade stored for the submission.
    pub(super) grades: Vec<Grade>,
    /// Grades written by this run, the only ones considered for stickers.
    pub(super) upserted: Vec<Grade>,
    pub(super) feedback: Option<String>,
    pub(super) ai_generated: bool,
}

fn storage_failure(e: GradingError) -> ScorerError {
    ScorerError::Unavailable(e.to_string())
}
