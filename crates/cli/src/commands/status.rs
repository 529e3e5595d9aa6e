//! Agent health command

use anyhow::Result;
use chrono::DateTime;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse};
use crate::output::{color_status, print_json, OutputFormat};

/// Row for the component table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show the agent's component health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!("Agent:   {}", client.base_url().as_str().cyan());
            println!("Overall: {}", color_status(&health.status));
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                    last_check: format_timestamp(component.last_check_timestamp),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Format epoch seconds as a UTC wall-clock time
fn format_timestamp(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}
