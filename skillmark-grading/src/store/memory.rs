//! In-memory persistence gateway.
//!
//! Backs every gateway trait with maps behind one `tokio::sync::RwLock`, so
//! each call is atomic and the uniqueness rules hold even under concurrent
//! callers. Used by tests and by the CLI, which loads and saves its state as
//! a JSON [`StoreSnapshot`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::{AssessmentStore, CredentialStore, GradeStore, SubmissionStore, TaxonomyStore};
use crate::error::{GradingError, Result};
use crate::types::{
    Assessment, AssessmentId, Competency, CompetencyId, ComponentSkill, ComponentSkillId,
    Credential, CredentialId, Grade, GradeId, GradeValues, LearnerOutcome, Milestone, MilestoneId,
    NewCredential, Project, ProjectId, Submission, SubmissionId, UserId,
};

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub assessments: Vec<Assessment>,
    pub submissions: Vec<Submission>,
    pub grades: Vec<Grade>,
    pub credentials: Vec<Credential>,
    pub component_skills: Vec<ComponentSkill>,
    pub competencies: Vec<Competency>,
    pub learner_outcomes: Vec<LearnerOutcome>,
    pub milestones: Vec<Milestone>,
    pub projects: Vec<Project>,
    /// `(student, assessment)` enrollment pairs
    pub enrollments: Vec<(UserId, AssessmentId)>,
}

#[derive(Debug)]
struct Tables {
    assessments: BTreeMap<AssessmentId, Assessment>,
    submissions: BTreeMap<SubmissionId, Submission>,
    grades: BTreeMap<GradeId, Grade>,
    credentials: BTreeMap<CredentialId, Credential>,
    skills: BTreeMap<ComponentSkillId, ComponentSkill>,
    competencies: BTreeMap<CompetencyId, Competency>,
    outcomes: Vec<LearnerOutcome>,
    milestones: BTreeMap<MilestoneId, Milestone>,
    projects: BTreeMap<ProjectId, Project>,
    enrollments: BTreeSet<(UserId, AssessmentId)>,
    next_grade_id: i64,
    next_credential_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }
}

impl Tables {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let next_grade_id = snapshot.grades.iter().map(|g| g.id.get()).max().unwrap_or(0) + 1;
        let next_credential_id = snapshot
            .credentials
            .iter()
            .map(|c| c.id.get())
            .max()
            .unwrap_or(0)
            + 1;

        Self {
            assessments: snapshot.assessments.into_iter().map(|a| (a.id, a)).collect(),
            submissions: snapshot.submissions.into_iter().map(|s| (s.id, s)).collect(),
            grades: snapshot.grades.into_iter().map(|g| (g.id, g)).collect(),
            credentials: snapshot.credentials.into_iter().map(|c| (c.id, c)).collect(),
            skills: snapshot
                .component_skills
                .into_iter()
                .map(|s| (s.id, s))
                .collect(),
            competencies: snapshot
                .competencies
                .into_iter()
                .map(|c| (c.id, c))
                .collect(),
            outcomes: snapshot.learner_outcomes,
            milestones: snapshot.milestones.into_iter().map(|m| (m.id, m)).collect(),
            projects: snapshot.projects.into_iter().map(|p| (p.id, p)).collect(),
            enrollments: snapshot.enrollments.into_iter().collect(),
            next_grade_id,
            next_credential_id,
        }
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            assessments: self.assessments.values().cloned().collect(),
            submissions: self.submissions.values().cloned().collect(),
            grades: self.grades.values().cloned().collect(),
            credentials: self.credentials.values().cloned().collect(),
            component_skills: self.skills.values().cloned().collect(),
            competencies: self.competencies.values().cloned().collect(),
            learner_outcomes: self.outcomes.clone(),
            milestones: self.milestones.values().cloned().collect(),
            projects: self.projects.values().cloned().collect(),
            enrollments: self.enrollments.iter().copied().collect(),
        }
    }

    fn grade_for(&self, submission_id: SubmissionId, skill: ComponentSkillId) -> Option<&Grade> {
        self.grades
            .values()
            .find(|g| g.submission_id == submission_id && g.component_skill_id == skill)
    }

    fn sticker_for(&self, student_id: UserId, skill: ComponentSkillId) -> Option<&Credential> {
        self.credentials
            .values()
            .find(|c| c.student_id == student_id && c.kind.sticker_skill() == Some(skill))
    }
}

/// In-memory implementation of every gateway trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            tables: RwLock::new(Tables::from_snapshot(snapshot)),
        }
    }

    /// Load a JSON snapshot from disk; a missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "No snapshot on disk, starting empty");
            return Ok(Self::new());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current state to disk as pretty JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot().await)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.tables.read().await.to_snapshot()
    }

    /// Insert or replace an assessment.
    pub async fn put_assessment(&self, assessment: Assessment) {
        self.tables
            .write()
            .await
            .assessments
            .insert(assessment.id, assessment);
    }

    /// Insert or replace a submission.
    pub async fn put_submission(&self, submission: Submission) {
        self.tables
            .write()
            .await
            .submissions
            .insert(submission.id, submission);
    }

    pub async fn put_component_skill(&self, skill: ComponentSkill) {
        self.tables.write().await.skills.insert(skill.id, skill);
    }

    pub async fn put_competency(&self, competency: Competency) {
        self.tables
            .write()
            .await
            .competencies
            .insert(competency.id, competency);
    }

    pub async fn put_milestone(&self, milestone: Milestone) {
        self.tables
            .write()
            .await
            .milestones
            .insert(milestone.id, milestone);
    }

    pub async fn put_project(&self, project: Project) {
        self.tables.write().await.projects.insert(project.id, project);
    }

    /// Record that a student may work on an assessment.
    pub async fn enroll(&self, student_id: UserId, assessment_id: AssessmentId) {
        self.tables
            .write()
            .await
            .enrollments
            .insert((student_id, assessment_id));
    }

    /// Count of stored grades (for testing)
    pub async fn grade_count(&self) -> usize {
        self.tables.read().await.grades.len()
    }

    /// Count of stored credentials (for testing)
    pub async fn credential_count(&self) -> usize {
        self.tables.read().await.credentials.len()
    }
}

#[async_trait]
impl AssessmentStore for InMemoryStore {
    async fn get_assessment(&self, id: AssessmentId) -> Result<Option<Assessment>> {
        Ok(self.tables.read().await.assessments.get(&id).cloned())
    }

    async fn find_by_share_code(&self, code: &str) -> Result<Option<Assessment>> {
        let tables = self.tables.read().await;
        // A code without an expiry never lapses, so it ranks above any timestamp.
        Ok(tables
            .assessments
            .values()
            .filter(|a| a.share_code.as_deref() == Some(code))
            .max_by_key(|a| (a.share_code_expires_at.is_none(), a.share_code_expires_at))
            .cloned())
    }

    async fn share_code_in_use(&self, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .assessments
            .values()
            .any(|a| a.share_code.as_deref() == Some(code) && a.share_code_active_at(now)))
    }

    async fn set_share_code(
        &self,
        id: AssessmentId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Assessment> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        let taken = tables.assessments.values().any(|a| {
            a.id != id && a.share_code.as_deref() == Some(code) && a.share_code_active_at(now)
        });
        if taken {
            return Err(GradingError::Conflict(format!(
                "share code {} already in use",
                code
            )));
        }

        if !tables.assessments.contains_key(&id) {
            return Err(GradingError::not_found("assessment", id));
        }

        // Expired holders give the code up so it resolves to its new owner.
        for stale in tables
            .assessments
            .values_mut()
            .filter(|a| a.id != id && a.share_code.as_deref() == Some(code))
        {
            debug!(assessment_id = %stale.id, code, "Releasing expired share code");
            stale.share_code = None;
            stale.share_code_expires_at = None;
        }

        let assessment = tables
            .assessments
            .get_mut(&id)
            .ok_or_else(|| GradingError::not_found("assessment", id))?;
        assessment.share_code = Some(code.to_string());
        assessment.share_code_expires_at = Some(expires_at);
        Ok(assessment.clone())
    }

    async fn get_milestone(&self, id: MilestoneId) -> Result<Option<Milestone>> {
        Ok(self.tables.read().await.milestones.get(&id).cloned())
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn student_has_access(
        &self,
        student_id: UserId,
        assessment_id: AssessmentId,
    ) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .contains(&(student_id, assessment_id)))
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn find_submission(
        &self,
        assessment_id: AssessmentId,
        student_id: UserId,
    ) -> Result<Option<Submission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .find(|s| s.assessment_id == Some(assessment_id) && s.student_id == student_id)
            .cloned())
    }

    async fn submissions_for_student(&self, student_id: UserId) -> Result<Vec<Submission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn update_submission(&self, submission: &Submission) -> Result<Submission> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .submissions
            .get_mut(&submission.id)
            .ok_or_else(|| GradingError::not_found("submission", submission.id))?;
        *stored = submission.clone();
        Ok(stored.clone())
    }
}

#[async_trait]
impl GradeStore for InMemoryStore {
    async fn find_grade(
        &self,
        submission_id: SubmissionId,
        component_skill_id: ComponentSkillId,
    ) -> Result<Option<Grade>> {
        Ok(self
            .tables
            .read()
            .await
            .grade_for(submission_id, component_skill_id)
            .cloned())
    }

    async fn grades_for_submission(&self, submission_id: SubmissionId) -> Result<Vec<Grade>> {
        let tables = self.tables.read().await;
        Ok(tables
            .grades
            .values()
            .filter(|g| g.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn insert_grade(
        &self,
        submission_id: SubmissionId,
        component_skill_id: ComponentSkillId,
        values: &GradeValues,
    ) -> Result<Grade> {
        let mut tables = self.tables.write().await;

        if !tables.submissions.contains_key(&submission_id) {
            return Err(GradingError::not_found("submission", submission_id));
        }
        if tables.grade_for(submission_id, component_skill_id).is_some() {
            return Err(GradingError::Conflict(format!(
                "grade already exists for submission {} skill {}",
                submission_id, component_skill_id
            )));
        }

        let id = GradeId(tables.next_grade_id);
        tables.next_grade_id += 1;
        let grade = Grade {
            id,
            submission_id,
            component_skill_id,
            rubric_level: values.rubric_level,
            score: values.score,
            feedback: values.feedback.clone(),
            graded_by: values.graded_by,
            graded_at: values.graded_at,
        };
        tables.grades.insert(id, grade.clone());
        Ok(grade)
    }

    async fn update_grade(&self, id: GradeId, values: &GradeValues) -> Result<Grade> {
        let mut tables = self.tables.write().await;
        let grade = tables
            .grades
            .get_mut(&id)
            .ok_or_else(|| GradingError::not_found("grade", id))?;
        grade.rubric_level = values.rubric_level;
        grade.score = values.score;
        grade.feedback = values.feedback.clone();
        grade.graded_by = values.graded_by;
        grade.graded_at = values.graded_at;
        Ok(grade.clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_sticker(
        &self,
        student_id: UserId,
        component_skill_id: ComponentSkillId,
    ) -> Result<Option<Credential>> {
        Ok(self
            .tables
            .read()
            .await
            .sticker_for(student_id, component_skill_id)
            .cloned())
    }

    async fn credentials_for_student(&self, student_id: UserId) -> Result<Vec<Credential>> {
        let tables = self.tables.read().await;
        Ok(tables
            .credentials
            .values()
            .filter(|c| c.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn insert_credential(&self, credential: NewCredential) -> Result<Credential> {
        let mut tables = self.tables.write().await;

        if let Some(skill) = credential.kind.sticker_skill()
            && tables.sticker_for(credential.student_id, skill).is_some()
        {
            return Err(GradingError::Conflict(format!(
                "student {} already holds a sticker for skill {}",
                credential.student_id, skill
            )));
        }

        let id = CredentialId(tables.next_credential_id);
        tables.next_credential_id += 1;
        let credential = credential.into_credential(id);
        tables.credentials.insert(id, credential.clone());
        Ok(credential)
    }
}

#[async_trait]
impl TaxonomyStore for InMemoryStore {
    async fn get_component_skill(&self, id: ComponentSkillId) -> Result<Option<ComponentSkill>> {
        Ok(self.tables.read().await.skills.get(&id).cloned())
    }

    async fn get_competency(&self, id: CompetencyId) -> Result<Option<Competency>> {
        Ok(self.tables.read().await.competencies.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CredentialKind, RubricLevel};
    use chrono::Duration;
    use tempfile::TempDir;

    fn values(level: RubricLevel, score: Option<f64>) -> GradeValues {
        GradeValues {
            rubric_level: level,
            score,
            feedback: None,
            graded_by: UserId(2),
            graded_at: Utc::now(),
        }
    }

    fn sticker(student: i64, skill: i64) -> NewCredential {
        NewCredential {
            student_id: UserId(student),
            kind: CredentialKind::Sticker {
                component_skill_id: ComponentSkillId(skill),
            },
            title: "Proficient Skill".into(),
            description: None,
            color: None,
            awarded_at: Utc::now(),
            approved_by: UserId(2),
        }
    }

    #[tokio::test]
    async fn insert_grade_enforces_pair_uniqueness() {
        let store = InMemoryStore::new();
        store.put_submission(Submission::new(1, 1, 9)).await;

        let first = store
            .insert_grade(
                SubmissionId(1),
                ComponentSkillId(5),
                &values(RubricLevel::Emerging, None),
            )
            .await
            .unwrap();
        assert_eq!(first.id, GradeId(1));

        let dup = store
            .insert_grade(
                SubmissionId(1),
                ComponentSkillId(5),
                &values(RubricLevel::Applying, None),
            )
            .await;
        assert!(matches!(dup, Err(GradingError::Conflict(_))));
        assert_eq!(store.grade_count().await, 1);
    }

    #[tokio::test]
    async fn insert_grade_requires_submission() {
        let store = InMemoryStore::new();
        let result = store
            .insert_grade(
                SubmissionId(7),
                ComponentSkillId(5),
                &values(RubricLevel::Emerging, None),
            )
            .await;
        assert!(matches!(result, Err(GradingError::NotFound { .. })));
    }

    #[tokio::test]
    async fn duplicate_sticker_is_a_conflict() {
        let store = InMemoryStore::new();
        store.insert_credential(sticker(3, 11)).await.unwrap();
        let dup = store.insert_credential(sticker(3, 11)).await;
        assert!(matches!(dup, Err(GradingError::Conflict(_))));

        // Same skill, other student is fine.
        store.insert_credential(sticker(4, 11)).await.unwrap();
        assert_eq!(store.credential_count().await, 2);
    }

    #[tokio::test]
    async fn set_share_code_rejects_active_duplicates_only() {
        let store = InMemoryStore::new();
        store.put_assessment(Assessment::new(1, "A")).await;
        store.put_assessment(Assessment::new(2, "B")).await;

        let later = Utc::now() + Duration::days(7);
        store.set_share_code(AssessmentId(1), "ABCDE", later).await.unwrap();
        let clash = store.set_share_code(AssessmentId(2), "ABCDE", later).await;
        assert!(matches!(clash, Err(GradingError::Conflict(_))));

        // Once expired, the code can be reused elsewhere.
        store
            .set_share_code(AssessmentId(1), "ABCDE", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        store.set_share_code(AssessmentId(2), "ABCDE", later).await.unwrap();

        let old_holder = store.get_assessment(AssessmentId(1)).await.unwrap().unwrap();
        assert_eq!(old_holder.share_code, None);
        let found = store.find_by_share_code("ABCDE").await.unwrap().unwrap();
        assert_eq!(found.id, AssessmentId(2));
    }

    #[tokio::test]
    async fn find_by_share_code_prefers_live_holder() {
        let mut expired = Assessment::new(1, "Old");
        expired.share_code = Some("QWERT".into());
        expired.share_code_expires_at = Some(Utc::now() - Duration::days(1));
        let mut live = Assessment::new(2, "New");
        live.share_code = Some("QWERT".into());
        live.share_code_expires_at = Some(Utc::now() + Duration::days(6));

        let store = InMemoryStore::from_snapshot(StoreSnapshot {
            assessments: vec![expired, live],
            ..Default::default()
        });

        let found = store.find_by_share_code("QWERT").await.unwrap().unwrap();
        assert_eq!(found.id, AssessmentId(2));
    }

    #[tokio::test]
    async fn snapshot_survives_disk_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = InMemoryStore::new();
        store.put_submission(Submission::new(1, 1, 9)).await;
        store
            .insert_grade(
                SubmissionId(1),
                ComponentSkillId(5),
                &values(RubricLevel::Proficient, Some(3.0)),
            )
            .await
            .unwrap();
        store.save(&path).await.unwrap();

        let loaded = InMemoryStore::load(&path).await.unwrap();
        assert_eq!(loaded.grade_count().await, 1);

        // Ids continue after the highest loaded id.
        loaded.put_submission(Submission::new(2, 1, 10)).await;
        let next = loaded
            .insert_grade(
                SubmissionId(2),
                ComponentSkillId(5),
                &values(RubricLevel::Emerging, None),
            )
            .await
            .unwrap();
        assert_eq!(next.id, GradeId(2));
    }

    #[tokio::test]
    async fn missing_snapshot_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(store.grade_count().await, 0);
    }
}
