//! Persistence gateway traits.
//!
//! Raw persistence is owned by the host application. The engine talks to it
//! through one narrow trait per aggregate so each component depends only on
//! what it reads and writes:
//!
//! - [`AssessmentStore`] - assessments, share codes, ownership chain, enrollment
//! - [`SubmissionStore`] - student submissions
//! - [`GradeStore`] - per-skill grades, unique on `(submission, skill)`
//! - [`CredentialStore`] - credentials, stickers unique on `(student, skill)`
//! - [`TaxonomyStore`] - read-only skill/competency lookups
//!
//! Implementations are expected to back the two uniqueness rules with real
//! unique constraints and report violations as
//! [`GradingError::Conflict`](crate::GradingError::Conflict). The engine's own
//! lookups only narrow the race window. [`InMemoryStore`] is the reference
//! implementation.

mod memory;

pub use memory::{InMemoryStore, StoreSnapshot};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Assessment, AssessmentId, Competency, CompetencyId, ComponentSkill, ComponentSkillId,
    Credential, Grade, GradeId, GradeValues, Milestone, MilestoneId, NewCredential, Project,
    ProjectId, Submission, SubmissionId, UserId,
};

/// Assessments and the lookups hanging off them.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    /// Get an assessment by ID
    async fn get_assessment(&self, id: AssessmentId) -> Result<Option<Assessment>>;

    /// Find the assessment holding `code`, expired or not.
    ///
    /// If an expired holder and a live one share the code, the live one wins.
    async fn find_by_share_code(&self, code: &str) -> Result<Option<Assessment>>;

    /// Whether any assessment holds `code` unexpired at `now`
    async fn share_code_in_use(&self, code: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Overwrite an assessment's share code and expiry.
    ///
    /// Fails with `Conflict` if another assessment holds the same code unexpired.
    async fn set_share_code(
        &self,
        id: AssessmentId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Assessment>;

    /// Get a milestone by ID
    async fn get_milestone(&self, id: MilestoneId) -> Result<Option<Milestone>>;

    /// Get a project by ID
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Whether the student is enrolled in (or has redeemed a code for) the assessment
    async fn student_has_access(&self, student_id: UserId, assessment_id: AssessmentId)
    -> Result<bool>;
}

/// Student submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Get a submission by ID
    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>>;

    /// Find a student's submission (draft or submitted) for an assessment
    async fn find_submission(
        &self,
        assessment_id: AssessmentId,
        student_id: UserId,
    ) -> Result<Option<Submission>>;

    /// All submissions owned by a student
    async fn submissions_for_student(&self, student_id: UserId) -> Result<Vec<Submission>>;

    /// Persist changed submission fields, returning the stored record
    async fn update_submission(&self, submission: &Submission) -> Result<Submission>;
}

/// Per-skill grades.
#[async_trait]
pub trait GradeStore: Send + Sync {
    /// Find the grade for a `(submission, skill)` pair
    async fn find_grade(
        &self,
        submission_id: SubmissionId,
        component_skill_id: ComponentSkillId,
    ) -> Result<Option<Grade>>;

    /// All grades of a submission
    async fn grades_for_submission(&self, submission_id: SubmissionId) -> Result<Vec<Grade>>;

    /// Create a grade. Fails with `Conflict` if the pair already has one.
    async fn insert_grade(
        &self,
        submission_id: SubmissionId,
        component_skill_id: ComponentSkillId,
        values: &GradeValues,
    ) -> Result<Grade>;

    /// Overwrite a grade in place, keeping its identity
    async fn update_grade(&self, id: GradeId, values: &GradeValues) -> Result<Grade>;
}

/// Awarded credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the sticker a student holds for a skill
    async fn find_sticker(
        &self,
        student_id: UserId,
        component_skill_id: ComponentSkillId,
    ) -> Result<Option<Credential>>;

    /// All credentials of a student
    async fn credentials_for_student(&self, student_id: UserId) -> Result<Vec<Credential>>;

    /// Create a credential. Fails with `Conflict` on a duplicate sticker.
    async fn insert_credential(&self, credential: NewCredential) -> Result<Credential>;
}

/// Read-only competency taxonomy.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    /// Get a component skill by ID
    async fn get_component_skill(&self, id: ComponentSkillId) -> Result<Option<ComponentSkill>>;

    /// Get a competency by ID
    async fn get_competency(&self, id: CompetencyId) -> Result<Option<Competency>>;
}

/// Every gateway trait in one bound, for wiring the orchestrator.
pub trait GradingStore:
    AssessmentStore + SubmissionStore + GradeStore + CredentialStore + TaxonomyStore
{
}

impl<T> GradingStore for T where
    T: AssessmentStore + SubmissionStore + GradeStore + CredentialStore + TaxonomyStore
{
}
