//! Iris Classifier CLI
//!
//! A command-line tool for requesting predictions, inspecting the installed
//! model and audit trail, and driving live retraining.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{audit, model, predict, retrain};
use std::path::PathBuf;
use std::time::Duration;

/// Iris Classifier CLI
#[derive(Parser)]
#[command(name = "irisctl")]
#[command(author, version, about = "CLI for the Iris Classifier service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via IRIS_API_URL env var)
    #[arg(long, env = "IRIS_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict the species of one flower
    Predict {
        /// Sepal length in cm
        #[arg(long)]
        sepal_length: f64,

        /// Sepal width in cm
        #[arg(long)]
        sepal_width: f64,

        /// Petal length in cm
        #[arg(long)]
        petal_length: f64,

        /// Petal width in cm
        #[arg(long)]
        petal_width: f64,
    },

    /// Predict every sample in a JSON file (array or {"samples": [...]})
    Batch {
        /// Path to the batch file
        file: PathBuf,
    },

    /// Show the installed model
    Model,

    /// Show service health
    Health,

    /// Show the metrics summary
    Metrics {
        /// Print the Prometheus exposition instead
        #[arg(long)]
        raw: bool,
    },

    /// Live retraining
    #[command(subcommand)]
    Retrain(RetrainCommands),

    /// Inspect the prediction audit trail
    #[command(subcommand)]
    Audit(AuditCommands),
}

#[derive(Subcommand)]
pub enum RetrainCommands {
    /// Start a retraining job
    Start {
        /// Wait for the job to finish
        #[arg(long)]
        wait: bool,

        /// Longest time to wait in seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },

    /// Show retraining state and the last outcome
    Status,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show the most recent predictions
    Recent {
        /// Number of records to show
        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        /// Only show predictions of this class
        #[arg(long)]
        class: Option<String>,
    },

    /// Show prediction statistics
    Stats {
        /// Window size in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Predict {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        } => {
            let features = client::Features {
                sepal_length,
                sepal_width,
                petal_length,
                petal_width,
            };
            predict::predict(&client, features, cli.format).await?;
        }
        Commands::Batch { file } => {
            predict::batch(&client, &file, cli.format).await?;
        }
        Commands::Model => model::show_model(&client, cli.format).await?,
        Commands::Health => model::show_health(&client, cli.format).await?,
        Commands::Metrics { raw: true } => model::show_raw_metrics(&client).await?,
        Commands::Metrics { raw: false } => model::show_metrics(&client, cli.format).await?,
        Commands::Retrain(retrain_cmd) => match retrain_cmd {
            RetrainCommands::Start { wait, timeout_secs } => {
                retrain::start(&client, wait, Duration::from_secs(timeout_secs), cli.format).await?;
            }
            RetrainCommands::Status => retrain::status(&client, cli.format).await?,
        },
        Commands::Audit(audit_cmd) => match audit_cmd {
            AuditCommands::Recent { limit, class } => {
                audit::recent(&client, limit, class, cli.format).await?;
            }
            AuditCommands::Stats { hours } => {
                audit::stats(&client, hours, cli.format).await?;
            }
        },
    }

    Ok(())
}
