// crmsync/src/export/logic.rs
use std::io::Write;

use log::info;
use serde_json::Value;

use crate::client::{RequestExecutor, Transport};
use crate::config::{AppConfig, ExportConfig};
use crate::errors::{AppError, Result};
use crate::pipeline::{
    Filter, PaginatedCollector, Phase, ProgressEvent, ProgressReporter, Record, SearchRequest,
    search_path,
};

/// Where the location id to export comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Location(String),
    /// Read the location id from this record of the lookup object type.
    LookupRecord(String),
}

pub async fn resolve_location<T: Transport>(
    executor: &RequestExecutor<T>,
    config: &ExportConfig,
    target: &ExportTarget,
) -> Result<String> {
    match target {
        ExportTarget::Location(id) => Ok(id.clone()),
        ExportTarget::LookupRecord(record_id) => {
            let record = executor
                .get_record(
                    &config.lookup_object_type,
                    record_id,
                    std::slice::from_ref(&config.location_property),
                )
                .await?;
            match record.property_str(&config.location_property) {
                Some(location) if !location.is_empty() => {
                    info!(
                        "Resolved {} {} to {} {}",
                        config.lookup_object_type, record_id, config.location_property, location
                    );
                    Ok(location.to_string())
                }
                _ => Err(AppError::InvalidInput(format!(
                    "{} {} has no {}",
                    config.lookup_object_type, record_id, config.location_property
                ))),
            }
        }
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Writes `id` plus the configured properties as CSV, one row per record.
pub fn write_csv<W: Write>(records: &[Record], properties: &[String], out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec!["id"];
    header.extend(properties.iter().map(String::as_str));
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![record.id.clone()];
        row.extend(properties.iter().map(|p| cell(record.properties.get(p))));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Exports every record carrying `location` as CSV to `out`. Returns the row count.
pub async fn perform_export<T: Transport, R: ProgressReporter, W: Write>(
    executor: &RequestExecutor<T>,
    app_config: &AppConfig,
    config: &ExportConfig,
    target: &ExportTarget,
    reporter: &R,
    out: W,
) -> Result<usize> {
    let location = resolve_location(executor, config, target).await?;

    let mut request = SearchRequest::new(
        Filter::equals(&config.location_property, &location),
        config.properties.clone(),
        app_config.page_size,
    );
    if let Some(sort) = &config.sort_property {
        request = request.sorted_by(sort, config.sort_direction);
    }
    let label = format!("{} with {} {}", config.object_type, config.location_property, location);
    let records = PaginatedCollector::new(executor, reporter)
        .collect(&search_path(&config.object_type), &label, request)
        .await?;

    if records.is_empty() {
        info!("No {} found with {} {}.", config.object_type, config.location_property, location);
    }
    reporter.report(ProgressEvent::Started {
        phase: Phase::Export,
        label: format!("writing {} rows", records.len()),
    });
    let rows = write_csv(&records, &config.properties, out)?;
    reporter.report(ProgressEvent::Completed { phase: Phase::Export, count: rows });
    Ok(rows)
}
