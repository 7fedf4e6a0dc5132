use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use skillmark_grading::{
    CompetencyProgressAnalyzer, CompetencyProgressRecord, CompetencySummary, ProgressDirection,
    UserId, summarize_by_competency,
};

use super::StoreArgs;

#[derive(Args)]
pub struct ProgressArgs {
    /// Student user ID
    pub student_id: i64,

    /// Roll skills up into one row per competency
    #[arg(long)]
    pub summary: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: ProgressArgs) -> Result<()> {
    let (store, _) = args.store.open().await?;
    let analyzer = CompetencyProgressAnalyzer::new(store.clone(), store.clone(), store);
    let records = analyzer
        .progress_for_student(UserId(args.student_id))
        .await?;

    if records.is_empty() {
        println!("No graded work for student {}.", args.student_id);
        return Ok(());
    }

    if args.summary {
        let summaries = summarize_by_competency(&records);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            println!("{}", summary_table(&summaries));
        }
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!("{}", skill_table(&records));
    }
    Ok(())
}

fn direction_cell(direction: ProgressDirection) -> Cell {
    let color = match direction {
        ProgressDirection::Improving => Color::Green,
        ProgressDirection::Stable => Color::Reset,
        ProgressDirection::Declining => Color::Red,
    };
    Cell::new(direction.as_str()).fg(color)
}

fn header(table: &mut Table, columns: &[&str]) {
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(columns.iter().map(|c| Cell::new(c).fg(Color::Cyan)));
}

fn skill_table(records: &[CompetencyProgressRecord]) -> Table {
    let mut table = Table::new();
    header(
        &mut table,
        &["Competency", "Skill", "Grades", "Average", "Last", "Trend"],
    );
    for record in records {
        table.add_row(vec![
            Cell::new(&record.competency_name),
            Cell::new(&record.component_skill_name),
            Cell::new(record.scores.len()),
            Cell::new(format!("{:.0}", record.average_score)),
            Cell::new(format!("{:.0}", record.last_score)),
            direction_cell(record.direction),
        ]);
    }
    table
}

fn summary_table(summaries: &[CompetencySummary]) -> Table {
    let mut table = Table::new();
    header(
        &mut table,
        &["Competency", "Skills", "Average", "Improving", "Declining"],
    );
    for summary in summaries {
        table.add_row(vec![
            Cell::new(&summary.competency_name),
            Cell::new(summary.skill_count),
            Cell::new(format!("{:.0}", summary.average_score)),
            Cell::new(summary.improving),
            Cell::new(summary.declining),
        ]);
    }
    table
}
