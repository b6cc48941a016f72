// crmsync/src/associate/mod.rs
pub(crate) mod logic;

use anyhow::{Context, Result};
use log::info;

use crate::client::executor_from_config;
use crate::config::{AppConfig, OperationConfig};
use crate::pipeline::LogReporter;

/// Public entry point for the association process.
pub async fn run_association_flow(app_config: &AppConfig) -> Result<()> {
    let assoc_config = match &app_config.operation {
        Some(OperationConfig::Associate(cfg)) => cfg,
        _ => anyhow::bail!("Associate operation selected but no association configuration found."),
    };

    let executor = executor_from_config(app_config).context("Failed to build API client")?;
    let summary = logic::perform_association(&executor, app_config, assoc_config, &LogReporter)
        .await
        .context("Bulk association failed")?;

    info!(
        "Successfully created {} of {} associations ({} invoices and {} custom objects indexed).",
        summary.associated, summary.pairs_found, summary.invoices_indexed, summary.custom_objects_indexed
    );
    Ok(())
}
