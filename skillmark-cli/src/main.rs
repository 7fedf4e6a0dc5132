use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "skillmark", about = "Grade assessments and award skill credentials")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Issue and resolve assessment share codes
    Code(commands::code::CodeArgs),
    /// Show a student's competency progress
    Progress(commands::progress::ProgressArgs),
    /// Record manual grades for a submission
    Grade(commands::grade::GradeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Code(args) => commands::code::run(args).await,
        Commands::Progress(args) => commands::progress::run(args).await,
        Commands::Grade(args) => commands::grade::run(args).await,
    }
}
