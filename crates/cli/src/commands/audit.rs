//! Audit trail commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_confidence, format_confidence, format_ms, print_json, print_table, OutputFormat,
};

/// Row for recent predictions table
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Features")]
    features: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Model")]
    model_version: String,
    #[tabled(rename = "Batch")]
    batch_size: u32,
}

/// Row for the class distribution table
#[derive(Tabled)]
struct DistributionRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Predictions")]
    count: u64,
    #[tabled(rename = "Share")]
    share: String,
}

/// Show the most recent audit records
pub async fn recent(
    client: &ApiClient,
    limit: usize,
    class: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let recent = client.recent_predictions(limit, class.as_deref()).await?;

    match format {
        OutputFormat::Json => print_json(&recent)?,
        OutputFormat::Table => {
            let rows = recent
                .predictions
                .iter()
                .map(|r| AuditRow {
                    timestamp: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    features: format!(
                        "{:.1} {:.1} {:.1} {:.1}",
                        r.features.sepal_length,
                        r.features.sepal_width,
                        r.features.petal_length,
                        r.features.petal_width
                    ),
                    prediction: r.prediction.clone(),
                    confidence: color_confidence(r.confidence),
                    model_version: format!("v{}", r.model_version),
                    batch_size: r.batch_size,
                })
                .collect();
            print_table::<AuditRow>(rows);
            println!("\nShowing {} predictions", recent.count);
        }
    }

    Ok(())
}

/// Show aggregate statistics over the last `hours`
pub async fn stats(client: &ApiClient, hours: u32, format: OutputFormat) -> Result<()> {
    let stats = client.prediction_stats(hours).await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!(
                "Predictions in the last {}h: {}",
                stats.window_hours, stats.total_predictions
            );
            if let Some(confidence) = stats.avg_confidence {
                println!("Average confidence: {}", format_confidence(confidence));
            }
            if let Some(ms) = stats.avg_processing_time_ms {
                println!("Average latency:    {}", format_ms(ms));
            }
            let total = stats.total_predictions.max(1) as f64;
            let rows = stats
                .prediction_distribution
                .iter()
                .map(|(class, count)| DistributionRow {
                    class: class.clone(),
                    count: *count,
                    share: format_confidence(*count as f64 / total),
                })
                .collect();
            println!();
            print_table::<DistributionRow>(rows);
        }
    }

    Ok(())
}
