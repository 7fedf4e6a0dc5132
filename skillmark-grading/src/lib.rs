//! skillmark-grading - Assessment grading and credentialing engine
//!
//! This crate grades student submissions against a competency taxonomy,
//! awards stickers for top-tier rubric outcomes and reports per-skill progress.
//! Persistence and AI scoring are pluggable: the engine talks to the host
//! through the async gateway traits in [`store`] and [`scorer`].

pub mod access;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod grades;
pub mod orchestrator;
pub mod progress;
pub mod scorer;
pub mod sharecode;
pub mod store;
pub mod types;

pub use access::SubmissionAccessGuard;
pub use config::{
    AI_FALLBACK_FEEDBACK, AutoGradeConfig, GradingConfig, PreviewConfig, ScorerConfig,
    ShareCodeConfig,
};
pub use credentials::{CredentialAwarder, sticker_title};
pub use error::{GradingError, Result};
pub use events::{EventId, GradingEvent};
pub use grades::{GradeInput, GradeRecorder, normalize_score};
pub use types::*;

// Orchestration re-exports
pub use orchestrator::{
    AutoGradeDecision, GradeRequest, GradingOrchestrator, GradingOutcome, GradingState,
    PreviewFeedback, PreviewLimiter, SkipReason,
};

// Progress re-exports
pub use progress::{
    CompetencyProgressAnalyzer, CompetencyProgressRecord, CompetencySummary, ProgressDirection,
    ScorePoint, summarize_by_competency,
};

// Collaborator re-exports
pub use scorer::{AiScorer, DocumentExtractor, NoOpExtractor, NoOpScorer, ScoredSkill, ScorerError};
pub use sharecode::{SHARE_CODE_LEN, ShareCodeIssuer, is_valid_share_code};
pub use store::{
    AssessmentStore, CredentialStore, GradeStore, GradingStore, InMemoryStore, StoreSnapshot,
    SubmissionStore, TaxonomyStore,
};
