use anyhow::Result;
use clap::{Args, Subcommand};
use skillmark_grading::{Assessment, AssessmentId, ShareCodeIssuer};

use super::{StoreArgs, save_store};
use crate::config::ConfigLoader;

#[derive(Args)]
pub struct CodeArgs {
    #[command(subcommand)]
    pub command: CodeCommands,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Subcommand)]
pub enum CodeCommands {
    /// Issue a share code for an assessment, reusing an active one
    Issue {
        /// Assessment ID
        assessment_id: i64,

        /// Replace the current code even if it is still active
        #[arg(long)]
        regenerate: bool,
    },
    /// Look up the assessment behind a share code
    Resolve {
        /// Five-letter share code
        code: String,
    },
}

pub async fn run(args: CodeArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let (store, path) = args.store.open().await?;
    let issuer = ShareCodeIssuer::new(store.clone(), config.share_codes);

    match args.command {
        CodeCommands::Issue {
            assessment_id,
            regenerate,
        } => {
            let id = AssessmentId(assessment_id);
            let code = if regenerate {
                issuer.regenerate(id).await?
            } else {
                issuer.current_or_issue(id).await?
            };
            save_store(&store, &path).await?;

            let assessment = issuer.resolve(&code).await?;
            println!("Share code: {}", code);
            print_expiry(&assessment);
        }
        CodeCommands::Resolve { code } => {
            let assessment = issuer.resolve(&code).await?;
            println!("Assessment: {} ({})", assessment.title, assessment.id);
            print_expiry(&assessment);
        }
    }
    Ok(())
}

fn print_expiry(assessment: &Assessment) {
    match assessment.share_code_expires_at {
        Some(expires_at) => println!("Expires:    {}", expires_at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("Expires:    never"),
    }
}
