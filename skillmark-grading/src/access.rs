//! Submission visibility and grading rights.
//!
//! Every check answers with a plain boolean. Lookup failures deny, and the
//! reason for a denial is never exposed to the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{GradingError, Result};
use crate::store::AssessmentStore;
use crate::types::{Actor, Assessment, Role, Submission, UserId};

/// Decides who may view and grade submissions.
pub struct SubmissionAccessGuard {
    store: Arc<dyn AssessmentStore>,
}

impl SubmissionAccessGuard {
    pub fn new(store: Arc<dyn AssessmentStore>) -> Self {
        Self { store }
    }

    /// Resolve the teacher who owns an assessment.
    ///
    /// An explicit creator wins. A milestone assessment without one belongs to
    /// the teacher of the milestone's project. Standalone assessments with no
    /// creator have no owner.
    pub async fn owner_of(&self, assessment: &Assessment) -> Result<Option<UserId>> {
        if let Some(creator) = assessment.created_by {
            return Ok(Some(creator));
        }
        let Some(milestone_id) = assessment.milestone_id else {
            return Ok(None);
        };
        let Some(milestone) = self.store.get_milestone(milestone_id).await? else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_project(milestone.project_id)
            .await?
            .map(|project| project.teacher_id))
    }

    async fn owns(&self, actor: &Actor, assessment: &Assessment) -> bool {
        match self.owner_of(assessment).await {
            Ok(owner) => owner == Some(actor.user_id),
            Err(e) => {
                warn!(assessment_id = %assessment.id, error = %e, "Ownership lookup failed");
                false
            }
        }
    }

    /// Whether `actor` may see `submission`.
    pub async fn can_view(&self, actor: &Actor, submission: &Submission) -> bool {
        match actor.role {
            Role::Student => submission.student_id == actor.user_id,
            Role::Teacher | Role::Admin => {
                if actor.bypasses_ownership() {
                    return true;
                }
                let Some(assessment_id) = submission.assessment_id else {
                    return false;
                };
                match self.store.get_assessment(assessment_id).await {
                    Ok(Some(assessment)) => self.owns(actor, &assessment).await,
                    Ok(None) => false,
                    Err(e) => {
                        warn!(%assessment_id, error = %e, "Assessment lookup failed");
                        false
                    }
                }
            }
        }
    }

    /// Whether `actor` may grade submissions to `assessment`.
    pub async fn can_grade(&self, actor: &Actor, assessment: &Assessment) -> bool {
        if !actor.is_staff() {
            return false;
        }
        actor.bypasses_ownership() || self.owns(actor, assessment).await
    }

    /// Whether a student may work on `assessment`.
    pub async fn can_attempt(&self, actor: &Actor, assessment: &Assessment) -> bool {
        if actor.role != Role::Student {
            return false;
        }
        match self
            .store
            .student_has_access(actor.user_id, assessment.id)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(assessment_id = %assessment.id, error = %e, "Enrollment lookup failed");
                false
            }
        }
    }

    pub async fn ensure_can_view(&self, actor: &Actor, submission: &Submission) -> Result<()> {
        if self.can_view(actor, submission).await {
            Ok(())
        } else {
            debug!(user_id = %actor.user_id, submission_id = %submission.id, "View denied");
            Err(GradingError::AccessDenied)
        }
    }

    pub async fn ensure_can_grade(&self, actor: &Actor, assessment: &Assessment) -> Result<()> {
        if self.can_grade(actor, assessment).await {
            Ok(())
        } else {
            debug!(user_id = %actor.user_id, assessment_id = %assessment.id, "Grading denied");
            Err(GradingError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Milestone, MilestoneId, Project, ProjectId, Tier};

    async fn fixture() -> (SubmissionAccessGuard, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_project(Project {
                id: ProjectId(1),
                teacher_id: UserId(20),
                title: "Bridges".into(),
            })
            .await;
        store
            .put_milestone(Milestone {
                id: MilestoneId(1),
                project_id: ProjectId(1),
                title: "Sketches".into(),
            })
            .await;
        // 1: explicit creator; 2: milestone-owned; 3: orphaned.
        store.put_assessment(Assessment::new(1, "Quiz").with_creator(10)).await;
        store.put_assessment(Assessment::new(2, "Milestone check").with_milestone(1)).await;
        store.put_assessment(Assessment::new(3, "Orphan")).await;
        (SubmissionAccessGuard::new(store.clone()), store)
    }

    #[tokio::test]
    async fn students_see_only_their_own() {
        let (guard, _) = fixture().await;
        let submission = Submission::new(1, 1, 5);

        assert!(guard.can_view(&Actor::student(5), &submission).await);
        assert!(!guard.can_view(&Actor::student(6), &submission).await);
        assert!(guard.ensure_can_view(&Actor::student(6), &submission).await.is_err());
    }

    #[tokio::test]
    async fn teachers_need_ownership() {
        let (guard, _) = fixture().await;

        assert!(guard.can_view(&Actor::teacher(10), &Submission::new(1, 1, 5)).await);
        assert!(!guard.can_view(&Actor::teacher(11), &Submission::new(1, 1, 5)).await);
        assert!(guard.can_view(&Actor::teacher(20), &Submission::new(2, 2, 5)).await);
        assert!(!guard.can_view(&Actor::teacher(10), &Submission::new(3, 3, 5)).await);
    }

    #[tokio::test]
    async fn explicit_creator_overrides_project_owner() {
        let (guard, _) = fixture().await;
        let assessment = Assessment::new(4, "Shared").with_creator(10).with_milestone(1);

        assert!(guard.can_grade(&Actor::teacher(10), &assessment).await);
        assert!(!guard.can_grade(&Actor::teacher(20), &assessment).await);
    }

    #[tokio::test]
    async fn only_platform_admins_bypass() {
        let (guard, _) = fixture().await;
        let orphan = Assessment::new(3, "Orphan");

        assert!(guard.can_grade(&Actor::admin(1, Tier::Platform), &orphan).await);
        assert!(!guard.can_grade(&Actor::admin(1, Tier::Enterprise), &orphan).await);
        assert!(!guard.can_grade(&Actor::admin(1, Tier::Free), &orphan).await);
        assert!(
            guard
                .can_view(&Actor::admin(1, Tier::Platform), &Submission::new(9, 3, 5))
                .await
        );
    }

    #[tokio::test]
    async fn students_never_grade() {
        let (guard, _) = fixture().await;
        let assessment = Assessment::new(5, "Own").with_creator(5);

        assert!(!guard.can_grade(&Actor::student(5), &assessment).await);
        assert!(matches!(
            guard.ensure_can_grade(&Actor::student(5), &assessment).await,
            Err(GradingError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn missing_links_deny() {
        let (guard, _) = fixture().await;
        let mut unlinked = Submission::new(1, 1, 5);
        unlinked.assessment_id = None;

        assert!(!guard.can_view(&Actor::teacher(10), &unlinked).await);
        // Milestone 9 does not exist.
        let dangling = Assessment::new(6, "Dangling").with_milestone(9);
        assert!(!guard.can_grade(&Actor::teacher(20), &dangling).await);
    }

    #[tokio::test]
    async fn attempts_follow_enrollment() {
        let (guard, store) = fixture().await;
        let assessment = Assessment::new(1, "Quiz");
        store.enroll(UserId(5), assessment.id).await;

        assert!(guard.can_attempt(&Actor::student(5), &assessment).await);
        assert!(!guard.can_attempt(&Actor::student(6), &assessment).await);
        assert!(!guard.can_attempt(&Actor::teacher(10), &assessment).await);
    }
}
