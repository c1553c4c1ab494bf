//! Apartment Price Estimator CLI
//!
//! A command-line tool for training and publishing the price model,
//! quoting prices and managing the feedback dataset.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{estimate, feedback, registry, summary, train, FeatureArgs};
use estimator_lib::{training::DEFAULT_CUTOFF_YEAR, Settings};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Apartment Price Estimator CLI
#[derive(Parser)]
#[command(name = "ape")]
#[command(author, version, about = "CLI for the Apartment Price Estimator", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a model on an offers table and publish it
    Train {
        /// Offers table (semicolon or comma separated)
        #[arg(long)]
        data: PathBuf,

        /// Merge the shared feedback dataset into the training rows
        #[arg(long)]
        with_feedback: bool,

        /// Ignore offers listed before this year
        #[arg(long, default_value_t = DEFAULT_CUTOFF_YEAR)]
        cutoff_year: i32,

        /// Where to write the model artifact (defaults to APE_ARTIFACT_PATH)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only write the local artifact
        #[arg(long)]
        no_publish: bool,

        /// Promote the published version to the configured stage
        #[arg(long, conflicts_with = "no_publish")]
        promote: bool,
    },

    /// Quote a price for one apartment
    Estimate {
        #[command(flatten)]
        features: FeatureArgs,

        /// Use a local model artifact instead of the registry
        #[arg(long)]
        model_file: Option<PathBuf>,
    },

    /// Submit a price correction, or manage the feedback dataset
    #[command(args_conflicts_with_subcommands = true)]
    Feedback {
        #[command(subcommand)]
        action: Option<FeedbackCommands>,

        /// Realistic price for the apartment; zero or negative is discarded
        #[arg(long, allow_negative_numbers = true)]
        price: Option<i64>,

        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Assign a published model version to a stage
    Promote {
        /// Version returned by `ape train`
        version: String,

        /// Target stage (defaults to APE_MODEL_STAGE)
        #[arg(long)]
        stage: Option<String>,
    },

    /// Summarize an offers table
    Summary {
        /// Offers table (semicolon or comma separated)
        #[arg(long)]
        data: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum FeedbackCommands {
    /// Replay corrections staged while the store was unavailable
    Flush,

    /// Show the shared feedback dataset
    List,
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load()?;

    match cli.command {
        Commands::Train {
            data,
            with_feedback,
            cutoff_year,
            output,
            no_publish,
            promote,
        } => {
            let options = train::TrainOptions {
                data,
                with_feedback,
                cutoff_year,
                output,
                publish: !no_publish,
                promote,
            };
            train::run_training(&settings, options, cli.format).await?;
        }
        Commands::Estimate {
            features,
            model_file,
        } => {
            estimate::estimate(&settings, &features, model_file, cli.format).await?;
        }
        Commands::Feedback {
            action,
            price,
            features,
        } => match action {
            Some(FeedbackCommands::Flush) => feedback::flush(&settings, cli.format).await?,
            Some(FeedbackCommands::List) => feedback::list(&settings, cli.format).await?,
            None => {
                let Some(price) = price else {
                    anyhow::bail!("--price is required to submit feedback");
                };
                feedback::submit(&settings, &features, price, cli.format).await?;
            }
        },
        Commands::Promote { version, stage } => {
            registry::promote(&settings, &version, stage, cli.format).await?;
        }
        Commands::Summary { data } => {
            summary::show_summary(&data, cli.format)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
