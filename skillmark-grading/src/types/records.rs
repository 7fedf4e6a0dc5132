//! Persisted records and taxonomy entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AssessmentId, AssessmentType, CompetencyId, ComponentSkillId, CredentialId, GradeId,
    LearnerOutcomeId, MilestoneId, ProjectId, RubricLevel, StickerColor, SubmissionId, UserId,
};

/// Upper bound of the numeric grade scale.
pub const MAX_SCORE: f64 = 4.0;

/// A single question on an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    /// Skill the question primarily exercises, if tagged.
    #[serde(default)]
    pub component_skill_id: Option<ComponentSkillId>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            component_skill_id: None,
        }
    }
}

/// A teacher-authored assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub title: String,
    /// `None` for standalone assessments.
    #[serde(default)]
    pub milestone_id: Option<MilestoneId>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub component_skill_ids: Vec<ComponentSkillId>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub share_code: Option<String>,
    #[serde(default)]
    pub share_code_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub assessment_type: AssessmentType,
    /// Rubric or exemplar document handed to the scorer as reference text.
    #[serde(default)]
    pub reference_document_url: Option<String>,
}

impl Assessment {
    /// Create a standalone teacher assessment with no questions or skills.
    pub fn new(id: impl Into<AssessmentId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            milestone_id: None,
            questions: Vec::new(),
            component_skill_ids: Vec::new(),
            due_date: None,
            share_code: None,
            share_code_expires_at: None,
            created_by: None,
            assessment_type: AssessmentType::Teacher,
            reference_document_url: None,
        }
    }

    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<UserId>) -> Self {
        self.created_by = Some(creator.into());
        self
    }

    #[must_use]
    pub fn with_milestone(mut self, milestone: impl Into<MilestoneId>) -> Self {
        self.milestone_id = Some(milestone.into());
        self
    }

    #[must_use]
    pub fn with_skills(mut self, skills: impl IntoIterator<Item = ComponentSkillId>) -> Self {
        self.component_skill_ids = skills.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_questions(mut self, questions: impl IntoIterator<Item = Question>) -> Self {
        self.questions = questions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_type(mut self, assessment_type: AssessmentType) -> Self {
        self.assessment_type = assessment_type;
        self
    }

    #[must_use]
    pub fn with_reference_document(mut self, url: impl Into<String>) -> Self {
        self.reference_document_url = Some(url.into());
        self
    }

    /// Whether the share code exists and has not expired at `now`.
    pub fn share_code_active_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.share_code, self.share_code_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// A student's answers to one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    /// Missing links are tolerated on read and rejected by the orchestrator.
    #[serde(default)]
    pub assessment_id: Option<AssessmentId>,
    pub student_id: UserId,
    /// Answers, parallel to the assessment's questions.
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub ai_generated_feedback: bool,
}

impl Submission {
    /// A submitted, ungraded submission.
    pub fn new(
        id: impl Into<SubmissionId>,
        assessment_id: impl Into<AssessmentId>,
        student_id: impl Into<UserId>,
    ) -> Self {
        Self {
            id: id.into(),
            assessment_id: Some(assessment_id.into()),
            student_id: student_id.into(),
            responses: Vec::new(),
            submitted_at: Some(Utc::now()),
            graded_at: None,
            feedback: None,
            ai_generated_feedback: false,
        }
    }

    #[must_use]
    pub fn with_responses<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses = responses.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn as_draft(mut self) -> Self {
        self.submitted_at = None;
        self
    }

    pub fn is_draft(&self) -> bool {
        self.submitted_at.is_none()
    }

    pub fn is_graded(&self) -> bool {
        self.graded_at.is_some()
    }
}

/// A persisted per-skill grade. Unique per `(submission_id, component_skill_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub submission_id: SubmissionId,
    pub component_skill_id: ComponentSkillId,
    pub rubric_level: RubricLevel,
    /// 0–4 scale; `None` means "not scored yet".
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    pub graded_by: UserId,
    pub graded_at: DateTime<Utc>,
}

/// Field values for creating or overwriting a grade.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeValues {
    pub rubric_level: RubricLevel,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub graded_by: UserId,
    pub graded_at: DateTime<Utc>,
}

/// What a credential recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialKind {
    Sticker { component_skill_id: ComponentSkillId },
    Badge { competency_id: CompetencyId },
    Plaque { subject_area: String },
}

impl CredentialKind {
    /// The skill a sticker is tied to.
    pub fn sticker_skill(&self) -> Option<ComponentSkillId> {
        match self {
            Self::Sticker { component_skill_id } => Some(*component_skill_id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sticker { .. } => "sticker",
            Self::Badge { .. } => "badge",
            Self::Plaque { .. } => "plaque",
        }
    }
}

/// An awarded recognition artifact. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub student_id: UserId,
    #[serde(flatten)]
    pub kind: CredentialKind,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<StickerColor>,
    pub awarded_at: DateTime<Utc>,
    pub approved_by: UserId,
}

/// Field values for a credential that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCredential {
    pub student_id: UserId,
    pub kind: CredentialKind,
    pub title: String,
    pub description: Option<String>,
    pub color: Option<StickerColor>,
    pub awarded_at: DateTime<Utc>,
    pub approved_by: UserId,
}

impl NewCredential {
    /// Attach the store-assigned id.
    pub fn into_credential(self, id: CredentialId) -> Credential {
        Credential {
            id,
            student_id: self.student_id,
            kind: self.kind,
            title: self.title,
            description: self.description,
            color: self.color,
            awarded_at: self.awarded_at,
            approved_by: self.approved_by,
        }
    }
}

/// Finest taxonomy level; grades and stickers attach here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSkill {
    pub id: ComponentSkillId,
    pub name: String,
    pub competency_id: CompetencyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub id: CompetencyId,
    pub name: String,
    pub learner_outcome_id: LearnerOutcomeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerOutcome {
    pub id: LearnerOutcomeId,
    pub name: String,
    #[serde(default)]
    pub subject_area: Option<String>,
}

/// A project milestone; links milestone assessments to their project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub title: String,
}

/// A project owned by one teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub teacher_id: UserId,
    #[serde(default)]
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_share_code_activity() {
        let now = Utc::now();
        let mut assessment = Assessment::new(1, "Fractions check-in");
        assert!(!assessment.share_code_active_at(now));

        assessment.share_code = Some("QWERT".into());
        assessment.share_code_expires_at = Some(now + Duration::days(1));
        assert!(assessment.share_code_active_at(now));

        assessment.share_code_expires_at = Some(now - Duration::seconds(1));
        assert!(!assessment.share_code_active_at(now));
    }

    #[test]
    fn test_draft_and_graded_flags() {
        let submission = Submission::new(1, 1, 9);
        assert!(!submission.is_draft());
        assert!(!submission.is_graded());
        assert!(submission.as_draft().is_draft());
    }

    #[test]
    fn test_credential_kind_is_flattened() {
        let credential = NewCredential {
            student_id: UserId(3),
            kind: CredentialKind::Sticker {
                component_skill_id: ComponentSkillId(11),
            },
            title: "Applying Estimation".into(),
            description: None,
            color: Some(StickerColor::Green),
            awarded_at: Utc::now(),
            approved_by: UserId(2),
        }
        .into_credential(CredentialId(1));

        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["kind"], "sticker");
        assert_eq!(json["component_skill_id"], 11);
        assert_eq!(json["color"], "green");

        let back: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind.sticker_skill(), Some(ComponentSkillId(11)));
    }
}
