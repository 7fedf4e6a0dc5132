//! Grading events broadcast to subscribers.
//!
//! The orchestrator publishes one event per graded submission and one per new
//! credential. Notification delivery belongs to whoever subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AssessmentId, Credential, SubmissionId, UserId};

/// Unique identifier for a grading event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new time-ordered event ID using UUIDv7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something a student should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GradingEvent {
    SubmissionGraded {
        event_id: EventId,
        submission_id: SubmissionId,
        assessment_id: AssessmentId,
        student_id: UserId,
        graded_by: UserId,
        ai_generated_feedback: bool,
        graded_at: DateTime<Utc>,
    },
    CredentialAwarded {
        event_id: EventId,
        credential: Credential,
    },
}

impl GradingEvent {
    pub fn event_id(&self) -> EventId {
        match self {
            Self::SubmissionGraded { event_id, .. } | Self::CredentialAwarded { event_id, .. } => {
                *event_id
            }
        }
    }

    /// The student the event concerns.
    pub fn student_id(&self) -> UserId {
        match self {
            Self::SubmissionGraded { student_id, .. } => *student_id,
            Self::CredentialAwarded { credential, .. } => credential.student_id,
        }
    }
}
