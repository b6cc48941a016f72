//! CRM invoice sync tool
//!
//! Links invoices to custom objects by location id, fills in missing
//! location ids, and exports a location's invoices as CSV.

// crmsync/src/main.rs
mod associate;
mod client;
mod config;
mod derive;
mod errors;
mod export;
mod logger;
mod pipeline;

use anyhow::{Context, Result};
use config::{
    AppConfig, OperationConfig, load_association_config_from_json, load_derive_config_from_json,
    load_export_config_from_json,
};
use export::ExportTarget;
use log::{error, info};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

const CONFIG_PATH_ENV: &str = "CRMSYNC_CONFIG";

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    logger::init();

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let mut app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    let args: Vec<String> = env::args().skip(1).collect();
    let choice = match args.first() {
        Some(arg) => arg.trim().to_string(),
        None => prompt("Select an operation:\n1. Associate invoices with custom objects (or type 'associate')\n2. Derive missing location ids (or type 'derive')\n3. Export invoices for a location (or type 'export')\nEnter your choice: ")?,
    };

    match choice.as_str() {
        "1" | "associate" => {
            info!("🔗 Starting Association Process...");
            let assoc_config = load_association_config_from_json(&app_config.raw_json_config)
                .context("Failed to load association configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Associate(assoc_config));
            associate::run_association_flow(&app_config).await
                .context("Association process failed")?;
        }
        "2" | "derive" => {
            info!("🧮 Starting Derive Process...");
            let derive_config = load_derive_config_from_json(&app_config.raw_json_config)
                .context("Failed to load derive configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Derive(derive_config));
            derive::run_derive_flow(&app_config).await
                .context("Derive process failed")?;
        }
        "3" | "export" => {
            info!("📤 Starting Export Process...");
            let (target, output) = if args.len() > 1 {
                parse_export_args(&args[1..])?
            } else {
                (ExportTarget::Location(prompt("Enter the location id: ")?), None)
            };
            let export_config = load_export_config_from_json(&app_config.raw_json_config)
                .context("Failed to load export configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Export(export_config));
            export::run_export_flow(&app_config, &target, output.as_deref()).await
                .context("Export process failed")?;
        }
        _ => {
            anyhow::bail!("Invalid operation choice '{}'. Use '1' (associate), '2' (derive), or '3' (export).", choice);
        }
    }
    Ok(())
}

/// Parses `--location <id> | --record <id>` and an optional `--output <path>`.
fn parse_export_args(args: &[String]) -> Result<(ExportTarget, Option<PathBuf>)> {
    let mut target = None;
    let mut output = None;
    let mut iter = args.iter();

    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .filter(|v| !v.trim().is_empty())
            .with_context(|| format!("{} requires a value", flag))?;
        match flag.as_str() {
            "--location" => target = Some(ExportTarget::Location(value.trim().to_string())),
            "--record" => target = Some(ExportTarget::LookupRecord(value.trim().to_string())),
            "--output" => output = Some(PathBuf::from(value)),
            other => anyhow::bail!("Unknown export argument '{}'", other),
        }
    }

    let target = target.context("export requires --location <id> or --record <id>")?;
    Ok((target, output))
}

/// Prints `message` and reads one trimmed line from stdin.
fn prompt(message: &str) -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("{}", message);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
