//! Per-skill progress over time.
//!
//! Joins every scored grade reachable from a student's submissions to the
//! skill taxonomy and reports, per `(competency, skill)`, the score history on
//! a 0–100 scale together with a trend direction. Nothing here writes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{GradeStore, SubmissionStore, TaxonomyStore};
use crate::types::{Competency, CompetencyId, ComponentSkillId, MAX_SCORE, UserId};

/// Minimum change in percentage points between the two latest scores that
/// counts as movement.
pub const TREND_THRESHOLD: f64 = 5.0;

/// Direction of a skill's most recent change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressDirection {
    Improving,
    #[default]
    Stable,
    Declining,
}

impl ProgressDirection {
    /// Classify the change from `previous` to `latest`.
    pub fn from_delta(latest: f64, previous: f64) -> Self {
        let delta = latest - previous;
        if delta > TREND_THRESHOLD {
            Self::Improving
        } else if delta < -TREND_THRESHOLD {
            Self::Declining
        } else {
            Self::Stable
        }
    }

    /// Classify a history listed oldest first. Fewer than two points is stable.
    pub fn from_chronological(scores: &[f64]) -> Self {
        match scores {
            [.., previous, latest] => Self::from_delta(*latest, *previous),
            _ => Self::Stable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

impl fmt::Display for ProgressDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored grade on the 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub score: f64,
    pub graded_at: DateTime<Utc>,
}

/// Progress on one component skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyProgressRecord {
    pub student_id: UserId,
    pub competency_id: CompetencyId,
    pub competency_name: String,
    pub component_skill_id: ComponentSkillId,
    pub component_skill_name: String,
    /// Most recent first.
    pub scores: Vec<ScorePoint>,
    /// Mean of `scores`, rounded to a whole percentage.
    pub average_score: f64,
    pub last_score: f64,
    pub direction: ProgressDirection,
}

/// Roll-up of all skill records under one competency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencySummary {
    pub competency_id: CompetencyId,
    pub competency_name: String,
    pub skill_count: usize,
    /// Mean of the skills' average scores, rounded.
    pub average_score: f64,
    pub improving: usize,
    pub declining: usize,
}

/// Convert a 0–4 grade score to the 0–100 reporting scale.
pub fn to_percentage(score: f64) -> f64 {
    score / MAX_SCORE * 100.0
}

fn rounded_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).round()
    }
}

/// Computes per-skill progress for a student.
pub struct CompetencyProgressAnalyzer {
    submissions: Arc<dyn SubmissionStore>,
    grades: Arc<dyn GradeStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
}

impl CompetencyProgressAnalyzer {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        grades: Arc<dyn GradeStore>,
        taxonomy: Arc<dyn TaxonomyStore>,
    ) -> Self {
        Self {
            submissions,
            grades,
            taxonomy,
        }
    }

    /// Progress records for every skill the student has a scored grade in,
    /// sorted by competency name and then skill name.
    pub async fn progress_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<CompetencyProgressRecord>> {
        let mut by_skill: BTreeMap<ComponentSkillId, Vec<ScorePoint>> = BTreeMap::new();

        for submission in self.submissions.submissions_for_student(student_id).await? {
            for grade in self.grades.grades_for_submission(submission.id).await? {
                let Some(score) = grade.score else {
                    continue;
                };
                by_skill
                    .entry(grade.component_skill_id)
                    .or_default()
                    .push(ScorePoint {
                        score: to_percentage(score),
                        graded_at: grade.graded_at,
                    });
            }
        }

        let mut competencies: HashMap<CompetencyId, Option<Competency>> = HashMap::new();
        let mut records = Vec::with_capacity(by_skill.len());

        for (skill_id, mut scores) in by_skill {
            let Some(skill) = self.taxonomy.get_component_skill(skill_id).await? else {
                warn!(component_skill_id = %skill_id, "Graded skill missing from taxonomy");
                continue;
            };

            let competency = match competencies.get(&skill.competency_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = self.taxonomy.get_competency(skill.competency_id).await?;
                    competencies.insert(skill.competency_id, found.clone());
                    found
                }
            };
            let Some(competency) = competency else {
                warn!(
                    competency_id = %skill.competency_id,
                    "Competency missing from taxonomy"
                );
                continue;
            };

            scores.sort_by(|a, b| b.graded_at.cmp(&a.graded_at));
            let direction = match scores.as_slice() {
                [latest, previous, ..] => {
                    ProgressDirection::from_delta(latest.score, previous.score)
                }
                _ => ProgressDirection::Stable,
            };

            records.push(CompetencyProgressRecord {
                student_id,
                competency_id: competency.id,
                competency_name: competency.name,
                component_skill_id: skill.id,
                component_skill_name: skill.name,
                average_score: rounded_mean(scores.iter().map(|p| p.score)),
                last_score: scores[0].score,
                scores,
                direction,
            });
        }

        records.sort_by(|a, b| {
            a.competency_name
                .cmp(&b.competency_name)
                .then_with(|| a.component_skill_name.cmp(&b.component_skill_name))
        });

        debug!(student_id = %student_id, skills = records.len(), "Computed progress");
        Ok(records)
    }
}

/// Group skill records into one summary per competency, keeping record order.
pub fn summarize_by_competency(records: &[CompetencyProgressRecord]) -> Vec<CompetencySummary> {
    let mut summaries: Vec<CompetencySummary> = Vec::new();
    let mut averages: Vec<Vec<f64>> = Vec::new();

    for record in records {
        let index = match summaries
            .iter()
            .position(|s| s.competency_id == record.competency_id)
        {
            Some(i) => i,
            None => {
                summaries.push(CompetencySummary {
                    competency_id: record.competency_id,
                    competency_name: record.competency_name.clone(),
                    skill_count: 0,
                    average_score: 0.0,
                    improving: 0,
                    declining: 0,
                });
                averages.push(Vec::new());
                summaries.len() - 1
            }
        };

        let summary = &mut summaries[index];
        summary.skill_count += 1;
        match record.direction {
            ProgressDirection::Improving => summary.improving += 1,
            ProgressDirection::Declining => summary.declining += 1,
            ProgressDirection::Stable => {}
        }
        averages[index].push(record.average_score);
    }

    for (summary, values) in summaries.iter_mut().zip(averages) {
        summary.average_score = rounded_mean(values.into_iter());
    }
    summaries
}
