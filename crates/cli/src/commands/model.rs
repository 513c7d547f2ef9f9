//! Model, health and metrics commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_confidence, format_ms, format_uptime, print_json, print_table,
    print_warning, OutputFormat,
};

/// Row for component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for per-class prediction counts
#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Predictions")]
    count: u64,
}

/// Show the installed model
pub async fn show_model(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.model_info().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("Model version: {}", info.model_version);
            println!("Model type:    {}", info.model_type);
            println!("Classes:       {}", info.classes.join(", "));
            println!("Features:      {}", info.features.join(", "));
            println!("Created:       {}", info.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(accuracy) = info.accuracy {
                println!("Accuracy:      {}", format_confidence(accuracy));
            }
            if let Some(f1) = info.f1_score {
                println!("F1 score:      {:.3}", f1);
            }
        }
    }

    Ok(())
}

/// Show service health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Status:        {}", color_status(&health.status));
            println!("Model loaded:  {}", health.model_loaded);
            println!("Model version: {}", health.model_version);
            println!("Uptime:        {}", format_uptime(health.uptime_seconds));
            println!("Version:       {}\n", health.version);

            let rows = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table::<ComponentRow>(rows);
            for issue in &health.issues {
                print_warning(issue);
            }
        }
    }

    Ok(())
}

/// Print the Prometheus text exposition unchanged
pub async fn show_raw_metrics(client: &ApiClient) -> Result<()> {
    print!("{}", client.get_text("metrics").await?);
    Ok(())
}

/// Show the metrics summary
pub async fn show_metrics(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let metrics = client.metrics_summary().await?;

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Table => {
            let rows = metrics
                .predictions_by_class
                .iter()
                .map(|(class, count)| ClassRow {
                    class: class.clone(),
                    count: *count,
                })
                .collect();
            print_table::<ClassRow>(rows);

            println!("\nTotal predictions: {}", metrics.total_predictions);
            println!(
                "Mean latency:      {} single, {} batch",
                format_ms(metrics.prediction_latency.mean_ms),
                format_ms(metrics.batch_latency.mean_ms)
            );
            println!("Errors:            {}", metrics.total_errors);
            for (kind, count) in metrics.errors_by_kind.iter().filter(|(_, n)| **n > 0) {
                println!("  {:<16} {}", kind, count);
            }
            println!(
                "Retraining:        {} started, {} succeeded, {} failed, {} rejected",
                metrics.retrain_attempts,
                metrics.retrain_successes,
                metrics.retrain_failures,
                metrics.retrain_rejected
            );
            println!("Model version:     {}", metrics.model_version);
            println!("Uptime:            {}", format_uptime(metrics.uptime_seconds));
        }
    }

    Ok(())
}
