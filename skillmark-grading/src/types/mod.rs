//! Core domain types for the grading engine.
//!
//! Identifiers are integer newtypes so a submission id can never be passed
//! where a skill id is expected. Records live in [`records`], the
//! authorization context in [`actor`].

pub mod actor;
pub mod records;

use serde::{Deserialize, Serialize};

pub use actor::{Actor, Role, Tier};
pub use records::*;

/// Defines an integer-backed identifier newtype.
macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the underlying integer.
            #[must_use]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// Identifier of a platform user (student, teacher or admin).
    UserId
);
int_id!(
    /// Identifier of an assessment.
    AssessmentId
);
int_id!(
    /// Identifier of a student submission.
    SubmissionId
);
int_id!(
    /// Identifier of a per-skill grade.
    GradeId
);
int_id!(
    /// Identifier of an awarded credential.
    CredentialId
);
int_id!(
    /// Identifier of a component skill, the finest taxonomy level.
    ComponentSkillId
);
int_id!(
    /// Identifier of a competency.
    CompetencyId
);
int_id!(
    /// Identifier of a learner outcome, the top taxonomy level.
    LearnerOutcomeId
);
int_id!(
    /// Identifier of a project milestone.
    MilestoneId
);
int_id!(
    /// Identifier of a project.
    ProjectId
);

/// Ordered mastery tiers, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RubricLevel {
    Emerging,
    Developing,
    Proficient,
    Applying,
}

impl RubricLevel {
    /// All levels in ascending order.
    pub const ALL: [RubricLevel; 4] = [
        Self::Emerging,
        Self::Developing,
        Self::Proficient,
        Self::Applying,
    ];

    /// Whether a grade at this level earns a sticker (the two top tiers).
    pub fn earns_sticker(&self) -> bool {
        matches!(self, Self::Proficient | Self::Applying)
    }

    /// Presentation color of the sticker this level earns, if any.
    pub fn sticker_color(&self) -> Option<StickerColor> {
        match self {
            Self::Applying => Some(StickerColor::Green),
            Self::Proficient => Some(StickerColor::Blue),
            Self::Emerging | Self::Developing => None,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emerging => "emerging",
            Self::Developing => "developing",
            Self::Proficient => "proficient",
            Self::Applying => "applying",
        }
    }

    /// Capitalized label used in credential titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Emerging => "Emerging",
            Self::Developing => "Developing",
            Self::Proficient => "Proficient",
            Self::Applying => "Applying",
        }
    }
}

impl std::fmt::Display for RubricLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RubricLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "emerging" => Ok(Self::Emerging),
            "developing" => Ok(Self::Developing),
            "proficient" => Ok(Self::Proficient),
            "applying" => Ok(Self::Applying),
            _ => Err(format!("unknown rubric level: {}", s)),
        }
    }
}

/// Sticker presentation color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickerColor {
    Green,
    Blue,
}

impl StickerColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

/// Who an assessment is graded by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    /// Teacher-graded; eligible for preview feedback and auto-grading.
    #[default]
    Teacher,
    /// Graded by classmates.
    Peer,
    /// Self-evaluation.
    #[serde(rename = "self")]
    SelfEvaluation,
}

impl AssessmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Peer => "peer",
            Self::SelfEvaluation => "self",
        }
    }
}
