//! Sticker awarding from rubric outcomes.
//!
//! A grade at `proficient` or `applying` earns the student a sticker for that
//! component skill, once. Re-grading, retried jobs and duplicate skills in one
//! batch never award a second sticker, and the returned list only ever holds
//! credentials created by this call so the caller notifies the student about
//! new achievements only.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{GradingError, Result};
use crate::store::{CredentialStore, TaxonomyStore};
use crate::types::{
    ComponentSkillId, Credential, CredentialKind, Grade, NewCredential, RubricLevel, UserId,
};

/// Compose the sticker title, e.g. `"Proficient Estimation"`.
pub fn sticker_title(level: RubricLevel, skill_name: &str) -> String {
    format!("{} {}", level.label(), skill_name)
}

/// Awards deduplicated stickers.
pub struct CredentialAwarder {
    credentials: Arc<dyn CredentialStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
}

impl CredentialAwarder {
    pub fn new(credentials: Arc<dyn CredentialStore>, taxonomy: Arc<dyn TaxonomyStore>) -> Self {
        Self {
            credentials,
            taxonomy,
        }
    }

    /// Award stickers for every qualifying grade the student does not already hold.
    ///
    /// Failures are per item: a grade whose award fails is logged and skipped,
    /// the rest of the batch still goes through.
    pub async fn award_for_grades(&self, student_id: UserId, grades: &[Grade]) -> Vec<Credential> {
        let mut awarded = Vec::new();
        let mut seen: HashSet<ComponentSkillId> = HashSet::new();

        for grade in grades.iter().filter(|g| g.rubric_level.earns_sticker()) {
            if !seen.insert(grade.component_skill_id) {
                continue;
            }

            match self.award_one(student_id, grade).await {
                Ok(Some(credential)) => awarded.push(credential),
                Ok(None) => {}
                Err(e) => warn!(
                    student_id = %student_id,
                    component_skill_id = %grade.component_skill_id,
                    error = %e,
                    "Failed to award sticker, continuing with remaining grades"
                ),
            }
        }

        if !awarded.is_empty() {
            info!(
                student_id = %student_id,
                count = awarded.len(),
                "Awarded new stickers"
            );
        }
        awarded
    }

    /// Award a single sticker; `Ok(None)` when the student already holds it.
    async fn award_one(&self, student_id: UserId, grade: &Grade) -> Result<Option<Credential>> {
        let skill_id = grade.component_skill_id;

        if self
            .credentials
            .find_sticker(student_id, skill_id)
            .await?
            .is_some()
        {
            debug!(component_skill_id = %skill_id, "Sticker already held, skipping");
            return Ok(None);
        }

        let skill = self
            .taxonomy
            .get_component_skill(skill_id)
            .await?
            .ok_or_else(|| GradingError::not_found("component skill", skill_id))?;

        let credential = NewCredential {
            student_id,
            kind: CredentialKind::Sticker {
                component_skill_id: skill_id,
            },
            title: sticker_title(grade.rubric_level, &skill.name),
            description: Some(format!(
                "Demonstrated {} mastery of {}",
                grade.rubric_level, skill.name
            )),
            color: grade.rubric_level.sticker_color(),
            awarded_at: Utc::now(),
            approved_by: grade.graded_by,
        };

        match self.credentials.insert_credential(credential).await {
            Ok(created) => Ok(Some(created)),
            // Lost a race with a concurrent award; the student has the sticker.
            Err(GradingError::Conflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{CompetencyId, ComponentSkill, GradeId, StickerColor, SubmissionId};
    use async_trait::async_trait;

    fn grade(skill: i64, level: RubricLevel) -> Grade {
        Grade {
            id: GradeId(skill),
            submission_id: SubmissionId(1),
            component_skill_id: ComponentSkillId(skill),
            rubric_level: level,
            score: Some(3.0),
            feedback: None,
            graded_by: UserId(2),
            graded_at: Utc::now(),
        }
    }

    async fn store_with_skills(skills: &[(i64, &str)]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, name) in skills {
            store
                .put_component_skill(ComponentSkill {
                    id: ComponentSkillId(*id),
                    name: name.to_string(),
                    competency_id: CompetencyId(1),
                })
                .await;
        }
        store
    }

    #[tokio::test]
    async fn awards_only_top_tiers_with_titles_and_colors() {
        let store = store_with_skills(&[(1, "Estimation"), (2, "Modeling"), (3, "Arguing")]).await;
        let awarder = CredentialAwarder::new(store.clone(), store.clone());

        let awarded = awarder
            .award_for_grades(
                UserId(9),
                &[
                    grade(1, RubricLevel::Applying),
                    grade(2, RubricLevel::Proficient),
                    grade(3, RubricLevel::Developing),
                ],
            )
            .await;

        assert_eq!(awarded.len(), 2);
        assert_eq!(awarded[0].title, "Applying Estimation");
        assert_eq!(awarded[0].color, Some(StickerColor::Green));
        assert_eq!(awarded[1].title, "Proficient Modeling");
        assert_eq!(awarded[1].color, Some(StickerColor::Blue));
        assert!(awarded.iter().all(|c| c.approved_by == UserId(2)));
    }

    #[tokio::test]
    async fn second_award_returns_nothing_new() {
        let store = store_with_skills(&[(1, "Estimation")]).await;
        let awarder = CredentialAwarder::new(store.clone(), store.clone());
        let grades = [grade(1, RubricLevel::Proficient)];

        assert_eq!(awarder.award_for_grades(UserId(9), &grades).await.len(), 1);
        assert!(awarder.award_for_grades(UserId(9), &grades).await.is_empty());
        assert_eq!(store.credential_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_skill_in_batch_awards_once() {
        let store = store_with_skills(&[(1, "Estimation")]).await;
        let awarder = CredentialAwarder::new(store.clone(), store.clone());

        let awarded = awarder
            .award_for_grades(
                UserId(9),
                &[grade(1, RubricLevel::Proficient), grade(1, RubricLevel::Applying)],
            )
            .await;
        assert_eq!(awarded.len(), 1);
    }

    #[tokio::test]
    async fn missing_skill_does_not_abort_batch() {
        // Skill 2 is not in the taxonomy.
        let store = store_with_skills(&[(1, "Estimation"), (3, "Arguing")]).await;
        let awarder = CredentialAwarder::new(store.clone(), store.clone());

        let awarded = awarder
            .award_for_grades(
                UserId(9),
                &[
                    grade(1, RubricLevel::Applying),
                    grade(2, RubricLevel::Applying),
                    grade(3, RubricLevel::Proficient),
                ],
            )
            .await;
        let skills: Vec<_> = awarded.iter().filter_map(|c| c.kind.sticker_skill()).collect();
        assert_eq!(skills, vec![ComponentSkillId(1), ComponentSkillId(3)]);
    }

    /// Credential store whose inserts always fail.
    struct BrokenCredentials;

    #[async_trait]
    impl CredentialStore for BrokenCredentials {
        async fn find_sticker(
            &self,
            _s: UserId,
            _k: ComponentSkillId,
        ) -> Result<Option<Credential>> {
            Ok(None)
        }

        async fn credentials_for_student(&self, _s: UserId) -> Result<Vec<Credential>> {
            Ok(Vec::new())
        }

        async fn insert_credential(&self, _c: NewCredential) -> Result<Credential> {
            Err(GradingError::Storage("disk full".into()))
        }
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed_per_item() {
        let taxonomy = store_with_skills(&[(1, "Estimation"), (2, "Modeling")]).await;
        let awarder = CredentialAwarder::new(Arc::new(BrokenCredentials), taxonomy);

        let awarded = awarder
            .award_for_grades(
                UserId(9),
                &[grade(1, RubricLevel::Applying), grade(2, RubricLevel::Applying)],
            )
            .await;
        assert!(awarded.is_empty());
    }
}
