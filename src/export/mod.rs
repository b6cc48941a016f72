// crmsync/src/export/mod.rs
pub(crate) mod logic;

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::client::executor_from_config;
use crate::config::{AppConfig, OperationConfig};
use crate::pipeline::LogReporter;

pub use logic::ExportTarget;

/// Public entry point for the export process. Writes to `output`, or stdout when `None`.
pub async fn run_export_flow(app_config: &AppConfig, target: &ExportTarget, output: Option<&Path>) -> Result<()> {
    let export_config = match &app_config.operation {
        Some(OperationConfig::Export(cfg)) => cfg,
        _ => anyhow::bail!("Export operation selected but no export configuration found."),
    };

    let executor = executor_from_config(app_config).context("Failed to build API client")?;
    let rows = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create export file {}", path.display()))?;
            logic::perform_export(&executor, app_config, export_config, target, &LogReporter, BufWriter::new(file))
                .await
                .context("Export failed")?
        }
        None => logic::perform_export(&executor, app_config, export_config, target, &LogReporter, io::stdout().lock())
            .await
            .context("Export failed")?,
    };

    match output {
        Some(path) => info!("Exported {} rows to {}", rows, path.display()),
        None => info!("Exported {} rows", rows),
    }
    Ok(())
}
