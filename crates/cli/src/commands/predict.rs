//! Prediction commands

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, FeatureWarning, Features, Prediction};
use crate::output::{
    color_confidence, format_confidence, format_ms, print_json, print_table, print_warning,
    OutputFormat,
};

/// Row for batch prediction table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Time")]
    time: String,
}

/// Predict the species of one flower
pub async fn predict(client: &ApiClient, features: Features, format: OutputFormat) -> Result<()> {
    let prediction = client.predict(&features).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            println!(
                "Prediction: {} ({})",
                prediction.prediction,
                color_confidence(prediction.confidence)
            );
            for (class, probability) in &prediction.probabilities {
                println!("  {:<12} {}", class, format_confidence(*probability));
            }
            println!("Model version: {}", prediction.model_version);
            println!("Processing time: {}", format_ms(prediction.processing_time_ms));
            print_feature_warnings(&prediction.warnings);
        }
    }

    Ok(())
}

/// Predict every sample in a JSON file
pub async fn batch(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let samples = parse_samples(&content)?;
    let batch = client.predict_batch(&samples).await?;

    match format {
        OutputFormat::Json => print_json(&batch)?,
        OutputFormat::Table => {
            let rows = batch
                .predictions
                .iter()
                .enumerate()
                .map(|(index, p)| prediction_row(index, p))
                .collect();
            print_table::<PredictionRow>(rows);
            println!(
                "\n{} predictions with model version {} in {}",
                batch.predictions.len(),
                batch.model_version,
                format_ms(batch.total_processing_time_ms)
            );
            print_feature_warnings(&batch.warnings);
        }
    }

    Ok(())
}

fn prediction_row(index: usize, p: &Prediction) -> PredictionRow {
    PredictionRow {
        index,
        prediction: p.prediction.clone(),
        confidence: color_confidence(p.confidence),
        time: format_ms(p.processing_time_ms),
    }
}

fn print_feature_warnings(warnings: &[FeatureWarning]) {
    for w in warnings {
        let location = match w.index {
            Some(index) => format!("samples[{}].{}", index, w.field),
            None => w.field.clone(),
        };
        print_warning(&format!(
            "{} = {} is outside the usual range {:.2}..{:.2}",
            location, w.value, w.expected_min, w.expected_max
        ));
    }
}

/// Accepts a JSON array of samples or an object with a `samples` array
pub fn parse_samples(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(content).context("Batch file is not valid JSON")?;
    match value {
        Value::Array(samples) => Ok(samples),
        Value::Object(mut object) => match object.remove("samples") {
            Some(Value::Array(samples)) => Ok(samples),
            _ => bail!("Batch file object must contain a \"samples\" array"),
        },
        _ => bail!("Batch file must be a JSON array or an object with \"samples\""),
    }
}
