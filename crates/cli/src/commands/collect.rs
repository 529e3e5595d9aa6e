//! Collection trigger commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, CycleReport, StartRequest, StartResponse};
use crate::output::{format_coverage, print_info, print_json, print_success, print_warning, OutputFormat};

/// Run one reconciliation cycle on the agent and print its report
pub async fn collect(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: CycleReport = client.post("collect", &serde_json::json!({})).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Collection Cycle".bold());
            println!("{}", "=".repeat(50));
            println!("Started:          {}", report.started_at.cyan());
            println!("Duration:         {} ms", report.duration_ms);
            println!();
            println!("Live pods:        {}", report.live_pods);
            println!("Live rows:        {}", report.live_rows);
            println!("Killed rows:      {}", report.killed_rows);
            println!("Already recorded: {}", report.skipped_kills);
            println!(
                "Metric samples:   {}",
                format_coverage(report.absent_samples, report.total_samples)
            );
            println!();

            if let Some(error) = &report.kill_phase_error {
                print_warning(&format!("Kill events skipped: {}", error));
            }
            if report.record_failures > 0 {
                print_warning(&format!("{} rows failed to record", report.record_failures));
            }
            if report.total_samples > 0 && report.absent_samples == report.total_samples {
                print_warning("Metrics backend returned no samples");
            }
            if report.live_pods == 0 && report.killed_rows == 0 {
                print_info("No workload pods or new kills observed");
            } else {
                print_success(&format!(
                    "Recorded {} rows",
                    report.live_rows + report.killed_rows
                ));
            }
        }
    }

    Ok(())
}

/// Start periodic collection on the agent
pub async fn start(client: &ApiClient, period_secs: u64, format: OutputFormat) -> Result<()> {
    let response: StartResponse = client
        .post("collect/periodic", &StartRequest { period_secs })
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!(
            "{} (every {}s)",
            response.message, response.period_secs
        )),
    }

    Ok(())
}
