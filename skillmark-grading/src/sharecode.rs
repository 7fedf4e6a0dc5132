//! Share codes: short, time-boxed tokens that let a student open an
//! assessment without prior enrollment.
//!
//! Codes are five letters drawn uniformly from `A..=Z` (about 11.9 million
//! combinations). Issuance checks candidates against the active codes and
//! retries on collision, but only `max_attempts` times: a nearly saturated
//! keyspace surfaces as [`GradingError::CodeExhaustion`] so the caller can
//! retry later instead of spinning.
//!
//! The collision check is check-then-act. The store's `set_share_code`
//! rejects an active duplicate with `Conflict`, which is treated as one more
//! collision.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::ShareCodeConfig;
use crate::error::{GradingError, Result};
use crate::store::AssessmentStore;
use crate::types::{Assessment, AssessmentId};

/// Number of letters in a share code.
pub const SHARE_CODE_LEN: usize = 5;

/// Whether `code` is exactly five ASCII uppercase letters.
pub fn is_valid_share_code(code: &str) -> bool {
    code.len() == SHARE_CODE_LEN && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Issues, regenerates and resolves assessment share codes.
pub struct ShareCodeIssuer {
    store: Arc<dyn AssessmentStore>,
    config: ShareCodeConfig,
    rng: Mutex<StdRng>,
}

impl ShareCodeIssuer {
    pub fn new(store: Arc<dyn AssessmentStore>, config: ShareCodeConfig) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create an issuer with a fixed seed (for reproducible testing).
    pub fn with_seed(store: Arc<dyn AssessmentStore>, config: ShareCodeConfig, seed: u64) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw one candidate code.
    pub fn generate_candidate(&self) -> String {
        // A poisoned lock still holds a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..SHARE_CODE_LEN)
            .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
            .collect()
    }

    /// Give the assessment a fresh code valid for `ttl_days`.
    ///
    /// Any previous code on the assessment is overwritten and stops resolving.
    pub async fn issue(&self, assessment_id: AssessmentId) -> Result<String> {
        if self.store.get_assessment(assessment_id).await?.is_none() {
            return Err(GradingError::not_found("assessment", assessment_id));
        }

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let candidate = self.generate_candidate();
            let now = Utc::now();

            if self.store.share_code_in_use(&candidate, now).await? {
                debug!(attempt, code = %candidate, "Share code collision, retrying");
                continue;
            }

            let expires_at = now + Duration::days(i64::from(self.config.ttl_days));
            match self
                .store
                .set_share_code(assessment_id, &candidate, expires_at)
                .await
            {
                Ok(_) => {
                    info!(
                        assessment_id = %assessment_id,
                        attempt,
                        %expires_at,
                        "Issued share code"
                    );
                    return Ok(candidate);
                }
                Err(GradingError::Conflict(reason)) => {
                    debug!(attempt, %reason, "Share code taken concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            assessment_id = %assessment_id,
            attempts = max_attempts,
            "Share code keyspace exhausted"
        );
        Err(GradingError::CodeExhaustion {
            attempts: max_attempts,
        })
    }

    /// Replace the assessment's code. Same as [`issue`](Self::issue).
    pub async fn regenerate(&self, assessment_id: AssessmentId) -> Result<String> {
        self.issue(assessment_id).await
    }

    /// Return the assessment's unexpired code, issuing one only if needed.
    pub async fn current_or_issue(&self, assessment_id: AssessmentId) -> Result<String> {
        let assessment = self
            .store
            .get_assessment(assessment_id)
            .await?
            .ok_or_else(|| GradingError::not_found("assessment", assessment_id))?;

        match assessment.share_code {
            Some(code)
                if assessment.share_code_active_at(Utc::now()) && is_valid_share_code(&code) =>
            {
                Ok(code)
            }
            _ => self.issue(assessment_id).await,
        }
    }

    /// Resolve a code to its assessment.
    pub async fn resolve(&self, code: &str) -> Result<Assessment> {
        self.resolve_at(code, Utc::now()).await
    }

    /// Resolve a code as of `now`.
    ///
    /// Input is trimmed and upper-cased first; anything that is not then five
    /// letters fails with `InvalidFormat` before the store is consulted.
    pub async fn resolve_at(&self, code: &str, now: DateTime<Utc>) -> Result<Assessment> {
        let normalized = code.trim().to_ascii_uppercase();
        if !is_valid_share_code(&normalized) {
            return Err(GradingError::InvalidFormat(code.to_string()));
        }

        let assessment = self
            .store
            .find_by_share_code(&normalized)
            .await?
            .ok_or_else(|| GradingError::not_found("share code", &normalized))?;

        if let Some(expired_at) = assessment.share_code_expires_at
            && expired_at <= now
        {
            return Err(GradingError::Expired {
                code: normalized,
                expired_at,
            });
        }

        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Milestone, MilestoneId, Project, ProjectId, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn store_with_assessments(ids: &[i64]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for id in ids {
            store.put_assessment(Assessment::new(*id, "Quiz")).await;
        }
        store
    }

    /// Store where every candidate collides.
    #[derive(Default)]
    struct SaturatedStore {
        checks: AtomicU32,
    }

    #[async_trait]
    impl AssessmentStore for SaturatedStore {
        async fn get_assessment(&self, id: AssessmentId) -> Result<Option<Assessment>> {
            Ok(Some(Assessment::new(id, "Quiz")))
        }

        async fn find_by_share_code(&self, _code: &str) -> Result<Option<Assessment>> {
            Ok(None)
        }

        async fn share_code_in_use(&self, _code: &str, _now: DateTime<Utc>) -> Result<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn set_share_code(
            &self,
            _id: AssessmentId,
            _code: &str,
            _expires_at: DateTime<Utc>,
        ) -> Result<Assessment> {
            panic!("saturated store never accepts a code");
        }

        async fn get_milestone(&self, _id: MilestoneId) -> Result<Option<Milestone>> {
            Ok(None)
        }

        async fn get_project(&self, _id: ProjectId) -> Result<Option<Project>> {
            Ok(None)
        }

        async fn student_has_access(&self, _s: UserId, _a: AssessmentId) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn candidates_are_five_uppercase_letters() {
        let issuer = ShareCodeIssuer::with_seed(
            Arc::new(InMemoryStore::new()),
            ShareCodeConfig::default(),
            42,
        );
        for _ in 0..500 {
            let code = issuer.generate_candidate();
            assert!(is_valid_share_code(&code), "bad candidate {code}");
        }
    }

    #[test]
    fn format_check() {
        assert!(is_valid_share_code("QWERT"));
        assert!(!is_valid_share_code("QWER"));
        assert!(!is_valid_share_code("QWERTY"));
        assert!(!is_valid_share_code("qwert"));
        assert!(!is_valid_share_code("QW3RT"));
        assert!(!is_valid_share_code("ÄBCDE"));
    }

    #[tokio::test]
    async fn issue_sets_code_and_seven_day_expiry() {
        let store = store_with_assessments(&[1]).await;
        let issuer = ShareCodeIssuer::new(store.clone(), ShareCodeConfig::default());

        let before = Utc::now();
        let code = issuer.issue(AssessmentId(1)).await.unwrap();
        assert!(is_valid_share_code(&code));

        let stored = store.get_assessment(AssessmentId(1)).await.unwrap().unwrap();
        assert_eq!(stored.share_code.as_deref(), Some(code.as_str()));
        let expires_at = stored.share_code_expires_at.unwrap();
        assert!(expires_at >= before + Duration::days(7));
        assert!(expires_at <= Utc::now() + Duration::days(7));
    }

    #[tokio::test]
    async fn issue_for_missing_assessment_is_not_found() {
        let store = store_with_assessments(&[]).await;
        let issuer = ShareCodeIssuer::new(store, ShareCodeConfig::default());
        let err = issuer.issue(AssessmentId(9)).await.unwrap_err();
        assert!(matches!(err, GradingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn exhaustion_after_ten_collisions() {
        let store = Arc::new(SaturatedStore::default());
        let issuer = ShareCodeIssuer::new(store.clone(), ShareCodeConfig::default());

        let err = issuer.issue(AssessmentId(1)).await.unwrap_err();
        assert!(matches!(err, GradingError::CodeExhaustion { attempts: 10 }));
        assert_eq!(store.checks.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn regenerate_invalidates_old_code() {
        let store = store_with_assessments(&[1]).await;
        let issuer = ShareCodeIssuer::with_seed(store, ShareCodeConfig::default(), 7);

        let old = issuer.issue(AssessmentId(1)).await.unwrap();
        let new = issuer.regenerate(AssessmentId(1)).await.unwrap();
        assert_ne!(old, new);

        let err = issuer.resolve(&old).await.unwrap_err();
        assert!(matches!(err, GradingError::NotFound { .. }));
        assert_eq!(issuer.resolve(&new).await.unwrap().id, AssessmentId(1));
    }

    #[tokio::test]
    async fn resolve_distinguishes_format_missing_and_expired() {
        let store = store_with_assessments(&[1]).await;
        let issuer = ShareCodeIssuer::new(store, ShareCodeConfig::default());
        let code = issuer.issue(AssessmentId(1)).await.unwrap();

        assert!(matches!(
            issuer.resolve("AB1").await,
            Err(GradingError::InvalidFormat(_))
        ));
        assert!(matches!(
            issuer.resolve("ZZZZZZ").await,
            Err(GradingError::InvalidFormat(_))
        ));

        let unused = if code == "AAAAA" { "BBBBB" } else { "AAAAA" };
        assert!(matches!(
            issuer.resolve(unused).await,
            Err(GradingError::NotFound { .. })
        ));

        let later = Utc::now() + Duration::days(8);
        assert!(matches!(
            issuer.resolve_at(&code, later).await,
            Err(GradingError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn resolve_accepts_lowercase_entry() {
        let store = store_with_assessments(&[3]).await;
        let issuer = ShareCodeIssuer::new(store, ShareCodeConfig::default());
        let code = issuer.issue(AssessmentId(3)).await.unwrap();

        let typed = format!("  {} ", code.to_lowercase());
        assert_eq!(issuer.resolve(&typed).await.unwrap().id, AssessmentId(3));
    }

    #[tokio::test]
    async fn reused_code_resolves_to_its_new_holder() {
        let store = store_with_assessments(&[1, 2]).await;
        store
            .set_share_code(AssessmentId(1), "ABCDE", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        store
            .set_share_code(AssessmentId(2), "ABCDE", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        let issuer = ShareCodeIssuer::new(store, ShareCodeConfig::default());
        assert_eq!(issuer.resolve("ABCDE").await.unwrap().id, AssessmentId(2));
    }

    #[tokio::test]
    async fn current_or_issue_reuses_active_code() {
        let store = store_with_assessments(&[1]).await;
        let issuer = ShareCodeIssuer::new(store.clone(), ShareCodeConfig::default());

        let first = issuer.current_or_issue(AssessmentId(1)).await.unwrap();
        let second = issuer.current_or_issue(AssessmentId(1)).await.unwrap();
        assert_eq!(first, second);

        // Expire it; the next call must mint a new one.
        store
            .set_share_code(AssessmentId(1), &first, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        let third = issuer.current_or_issue(AssessmentId(1)).await.unwrap();
        assert!(is_valid_share_code(&third));
        let stored = store.get_assessment(AssessmentId(1)).await.unwrap().unwrap();
        assert!(stored.share_code_active_at(Utc::now()));
    }
}
