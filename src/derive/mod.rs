// crmsync/src/derive/mod.rs
pub(crate) mod logic;

use anyhow::{Context, Result};
use log::info;

use crate::client::executor_from_config;
use crate::config::{AppConfig, OperationConfig};
use crate::pipeline::LogReporter;

/// Public entry point for the derive process.
pub async fn run_derive_flow(app_config: &AppConfig) -> Result<()> {
    let derive_config = match &app_config.operation {
        Some(OperationConfig::Derive(cfg)) => cfg,
        _ => anyhow::bail!("Derive operation selected but no derive configuration found."),
    };

    let executor = executor_from_config(app_config).context("Failed to build API client")?;
    let summary = logic::perform_derivation(&executor, app_config, derive_config, &LogReporter)
        .await
        .with_context(|| format!("Deriving {} failed", derive_config.target_property))?;

    info!(
        "Total records fetched: {}, updated: {}, skipped: {}{}",
        summary.fetched,
        summary.updated,
        summary.skipped,
        if derive_config.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}
