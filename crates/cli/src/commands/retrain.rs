//! Retraining commands

use anyhow::{bail, Result};
use std::time::{Duration, Instant};

use crate::client::{ApiClient, ApiError, JobReport, RetrainStatus};
use crate::output::{
    color_status, format_confidence, print_info, print_json, print_success, print_warning,
    OutputFormat,
};

/// Interval between status polls while waiting
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Trigger a retraining job, optionally waiting for it to finish
pub async fn start(
    client: &ApiClient,
    wait: bool,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let accepted = match client.start_retrain().await {
        Ok(accepted) => accepted,
        Err(e) => {
            if let Some(api_error) = e.downcast_ref::<ApiError>().filter(|e| e.is_conflict()) {
                let running = api_error
                    .body
                    .as_ref()
                    .and_then(|b| b.get("running_job_id"))
                    .and_then(|id| id.as_u64());
                match running {
                    Some(job_id) => bail!("Retraining job {} is already running", job_id),
                    None => bail!("A retraining job is already running"),
                }
            }
            return Err(e);
        }
    };

    if !wait {
        match format {
            OutputFormat::Json => print_json(&accepted)?,
            OutputFormat::Table => print_success(&format!(
                "Retraining job {} accepted at {}",
                accepted.job_id,
                accepted.started_at.format("%H:%M:%S")
            )),
        }
        return Ok(());
    }

    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "Retraining job {} started, waiting up to {}s",
            accepted.job_id,
            timeout.as_secs()
        ));
    }
    let report = wait_for_job(client, accepted.job_id, timeout).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    if !report.succeeded() {
        bail!("Retraining job {} failed", report.job_id);
    }
    Ok(())
}

/// Poll the status endpoint until `job_id` has finished
pub async fn wait_for_job(client: &ApiClient, job_id: u64, timeout: Duration) -> Result<JobReport> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = client.retrain_status().await?;
        if let Some(report) = status.finished_job(job_id) {
            return Ok(report.clone());
        }
        if Instant::now() >= deadline {
            bail!(
                "Timed out after {}s waiting for retraining job {}",
                timeout.as_secs(),
                job_id
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Show the coordinator state and the last outcome
pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.retrain_status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => print_status(&status),
    }

    Ok(())
}

fn print_status(status: &RetrainStatus) {
    println!("State:          {}", color_status(&status.state));
    println!("Model version:  {}", status.model_version);
    println!("Jobs completed: {}", status.jobs_completed);
    if let Some(job) = &status.current_job {
        println!(
            "Running job:    {} (since {})",
            job.job_id,
            job.started_at.format("%H:%M:%S")
        );
    }
    match &status.last_job {
        Some(report) => {
            println!();
            print_report(report);
        }
        None => print_info("No retraining job has completed yet"),
    }
}

fn print_report(report: &JobReport) {
    let elapsed = report.finished_at - report.started_at;
    let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
    if report.succeeded() {
        let versions = match (report.old_version, report.new_version) {
            (Some(old), Some(new)) => format!("v{} -> v{}", old, new),
            _ => "new version installed".to_string(),
        };
        let accuracy = report
            .accuracy
            .map(|a| format!(", accuracy {}", format_confidence(a)))
            .unwrap_or_default();
        print_success(&format!(
            "Job {} succeeded in {:.1}s: {}{}",
            report.job_id, seconds, versions, accuracy
        ));
    } else {
        print_warning(&format!(
            "Job {} {} after {:.1}s ({}): {}",
            report.job_id,
            color_status(&report.outcome),
            seconds,
            report.reason.as_deref().unwrap_or("unknown"),
            report.message.as_deref().unwrap_or("")
        ));
    }
}
