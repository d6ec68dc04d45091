mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use odyssey_common::config::Config;
use odyssey_grading::Platform;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "odyssey-cli")]
#[command(about = "Odyssey CLI - Seed courses and inspect grading state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load courses, lessons and exercises from a JSON fixture file
    Seed {
        /// Fixture file with `courses`, `lessons` and `exercises` arrays
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print submission statistics of an exercise
    Stats {
        /// Exercise id
        #[arg(short, long)]
        exercise: String,
    },

    /// Print a user's course progress
    Progress {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Only this course
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Grade a source file against an exercise as the given user
    Submit {
        /// Exercise id
        #[arg(short, long)]
        exercise: String,

        /// User id the submission is recorded for
        #[arg(short, long)]
        user: String,

        /// Source file to submit
        #[arg(short, long)]
        source: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let platform = Platform::connect(&config)
        .await
        .with_context(|| format!("Failed to open backends at {}", config.redis_url))?;

    match cli.command {
        Commands::Seed { file } => {
            commands::seed(&platform, &file).await?;
        }
        Commands::Stats { exercise } => {
            commands::print_statistics(&platform, &exercise).await?;
        }
        Commands::Progress { user, course } => {
            commands::print_progress(&platform, &user, course.as_deref()).await?;
        }
        Commands::Submit {
            exercise,
            user,
            source,
        } => {
            commands::submit(&platform, &exercise, &user, &source).await?;
        }
    }

    Ok(())
}
