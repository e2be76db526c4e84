use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use false_alarm_classifier::{
    config::Config,
    ml::{training_fixture, FileModelRepository, ModelMetrics, Trainer},
    models::LabeledRecord,
    observability::init_tracing,
};
use reqwest::{Client, Response};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fac-cli")]
#[command(about = "False Alarm Classifier CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "FAC_ENDPOINT", default_value = "http://localhost:5001")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and write it to the configured path
    Train {
        /// Configuration file overriding the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON array of labeled records; the built-in sample is used otherwise
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Check server health
    Health,

    /// Ask the server to reload the persisted model
    Reload,

    /// Classify a signalement
    Predict {
        #[arg(short, long)]
        description: String,

        #[arg(short = 't', long, default_value = "AUTRE")]
        incident_type: String,

        #[arg(short, long, default_value = "MOYEN")]
        urgency_level: String,

        #[arg(short, long)]
        score: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Train { config, data } => {
            let config = match config {
                Some(path) => Config::load_from(&path)
                    .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
                None => Config::load().context("Failed to load configuration")?,
            };

            if let Err(e) = init_tracing(&config.observability) {
                eprintln!("Failed to initialize tracing: {}", e);
            }

            let examples = match data {
                Some(path) => load_examples(&path)?,
                None => training_fixture(),
            };

            let repository = Arc::new(FileModelRepository::new(&config.model.model_path));
            let mut trainer = Trainer::new(config.training.clone(), repository)
                .with_feature_info_path(&config.model.feature_info_path);

            let report = trainer.run(&examples)?;

            println!("Training accuracy: {:.2}%", report.train_accuracy() * 100.0);
            println!("Testing accuracy: {:.2}%", report.test_accuracy() * 100.0);
            println!();
            print_metrics("Training", &report.train_metrics);
            print_metrics("Testing", &report.test_metrics);
            println!("Model saved to {}", config.model.model_path.display());
            println!("Feature info saved to {}", config.model.feature_info_path.display());
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            print_body(response).await?;
        }

        Commands::Reload => {
            let response = client
                .post(format!("{}/reload-model", cli.endpoint))
                .send()
                .await?;

            print_body(response).await?;
        }

        Commands::Predict {
            description,
            incident_type,
            urgency_level,
            score,
        } => {
            let response = client
                .post(format!("{}/predict", cli.endpoint))
                .json(&json!({
                    "description": description,
                    "incidentType": incident_type,
                    "urgencyLevel": urgency_level,
                    "aiSuspicionScore": score,
                }))
                .send()
                .await?;

            print_body(response).await?;
        }
    }

    Ok(())
}

fn load_examples(path: &Path) -> anyhow::Result<Vec<LabeledRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid training data in {}", path.display()))
}

fn print_metrics(partition: &str, metrics: &ModelMetrics) {
    let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix;
    println!("{} set ({} samples)", partition, metrics.support);
    println!("  Precision: {:.2}", metrics.precision);
    println!("  Recall:    {:.2}", metrics.recall);
    println!("  F1 score:  {:.2}", metrics.f1_score);
    println!("  Confusion matrix (rows: actual, columns: predicted)");
    println!("    genuine:     {:>3} {:>3}", tn, fp);
    println!("    false alarm: {:>3} {:>3}", fn_, tp);
}

async fn print_body(response: Response) -> anyhow::Result<()> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("Server returned {}", status);
    }
    Ok(())
}
