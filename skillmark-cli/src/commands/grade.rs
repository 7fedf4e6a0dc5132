use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use skillmark_grading::{
    GradeInput, GradeRequest, GradingOrchestrator, NoOpExtractor, NoOpScorer, RubricLevel,
    SubmissionId, UserId,
};

use super::{StoreArgs, save_store};
use crate::config::ConfigLoader;

#[derive(Args)]
pub struct GradeArgs {
    /// Submission ID
    pub submission_id: i64,

    /// User ID recorded as the grader
    #[arg(long)]
    pub grader: i64,

    /// Skill grade as SKILL_ID=LEVEL or SKILL_ID=LEVEL:SCORE (repeatable)
    #[arg(long = "skill", value_name = "GRADE", value_parser = parse_grade)]
    pub grades: Vec<GradeInput>,

    /// Overall feedback for the student
    #[arg(long)]
    pub feedback: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Parse `12=proficient:3` into a grade for skill 12.
fn parse_grade(raw: &str) -> std::result::Result<GradeInput, String> {
    let (skill, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SKILL_ID=LEVEL[:SCORE], got '{}'", raw))?;
    let skill: i64 = skill
        .trim()
        .parse()
        .map_err(|_| format!("invalid skill id '{}'", skill))?;

    let (level, score) = match rest.split_once(':') {
        Some((level, score)) => {
            let score: f64 = score
                .trim()
                .parse()
                .map_err(|_| format!("invalid score '{}'", score))?;
            (level, Some(score))
        }
        None => (rest, None),
    };
    let level: RubricLevel = level.trim().parse()?;

    Ok(GradeInput::new(skill, level, score))
}

pub async fn run(args: GradeArgs) -> Result<()> {
    if args.grades.is_empty() && args.feedback.is_none() {
        bail!("nothing to record: pass at least one --skill or --feedback");
    }

    let mut config = ConfigLoader::load()?;
    // One-shot process: nothing would wait for a background job.
    config.auto_grade.enabled = false;

    let (store, path) = args.store.open().await?;
    let orchestrator = GradingOrchestrator::new(
        store.clone(),
        Arc::new(NoOpScorer),
        Arc::new(NoOpExtractor),
        config,
    );

    let mut request = GradeRequest::manual(
        SubmissionId(args.submission_id),
        UserId(args.grader),
        args.grades,
    );
    request.feedback = args.feedback;

    let outcome = orchestrator.grade_submission(request).await?;
    orchestrator.shutdown();
    save_store(&store, &path).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Skill").fg(Color::Cyan),
        Cell::new("Level").fg(Color::Cyan),
        Cell::new("Score").fg(Color::Cyan),
        Cell::new("Graded by").fg(Color::Cyan),
    ]);
    for grade in &outcome.grades {
        table.add_row(vec![
            Cell::new(grade.component_skill_id),
            Cell::new(grade.rubric_level.label()),
            Cell::new(
                grade
                    .score
                    .map(|s| format!("{:.1}", s))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(grade.graded_by),
        ]);
    }
    println!("{table}");

    if let Some(feedback) = &outcome.feedback {
        println!("Feedback: {}", feedback);
    }
    for credential in &outcome.credentials {
        println!("New {}: {}", credential.kind.as_str(), credential.title);
    }
    Ok(())
}
