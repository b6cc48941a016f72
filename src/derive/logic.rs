// crmsync/src/derive/logic.rs
use log::info;
use serde_json::{Value, json};

use crate::client::{RequestExecutor, Transport};
use crate::config::{AppConfig, DeriveConfig};
use crate::errors::Result;
use crate::pipeline::{
    BatchInput, BatchWriter, Filter, ObjectId, PaginatedCollector, Phase, ProgressEvent,
    ProgressReporter, Record, SearchRequest, search_path,
};

/// Sets `property` to `value` on one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdateIntent {
    pub id: ObjectId,
    pub property: String,
    pub value: String,
}

impl BatchInput for FieldUpdateIntent {
    fn to_input(&self) -> Value {
        json!({
            "id": self.id,
            "properties": { self.property.as_str(): self.value }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derivation {
    Update(FieldUpdateIntent),
    Skipped { id: ObjectId, reason: String },
}

/// Derives the target value from the first `prefix_length` characters of `source_property`.
///
/// Records whose source value is missing, not a string, or too short are skipped.
pub fn derive_location(record: &Record, config: &DeriveConfig) -> Derivation {
    let id = record.object_id();
    let source = match record.properties.get(&config.source_property) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => {
            return Derivation::Skipped {
                id,
                reason: format!("'{}' is missing", config.source_property),
            };
        }
        Some(other) => {
            return Derivation::Skipped {
                id,
                reason: format!("'{}' is not a string ({})", config.source_property, other),
            };
        }
    };

    if source.chars().count() < config.prefix_length {
        return Derivation::Skipped {
            id,
            reason: format!(
                "'{}' is too short ('{}', need {} characters)",
                config.source_property, source, config.prefix_length
            ),
        };
    }

    Derivation::Update(FieldUpdateIntent {
        id,
        property: config.target_property.clone(),
        value: source.chars().take(config.prefix_length).collect(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeriveSummary {
    pub fetched: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub fn batch_update_path(config: &DeriveConfig) -> String {
    format!("/crm/v3/objects/{}/batch/update", config.object_type)
}

/// Collects every record missing the target property, derives its value, and writes the updates.
///
/// Nothing is written until the whole collection has been read. With `dry_run` the
/// derived updates are only logged.
pub async fn perform_derivation<T: Transport, R: ProgressReporter>(
    executor: &RequestExecutor<T>,
    app_config: &AppConfig,
    config: &DeriveConfig,
    reporter: &R,
) -> Result<DeriveSummary> {
    let collector = PaginatedCollector::new(executor, reporter);
    let request = SearchRequest::new(
        Filter::not_has_property(&config.target_property),
        vec!["hs_object_id".to_string(), config.source_property.clone()],
        app_config.page_size,
    );
    let label = format!("{} without {}", config.object_type, config.target_property);
    let records = collector
        .collect(&search_path(&config.object_type), &label, request)
        .await?;

    reporter.report(ProgressEvent::Started {
        phase: Phase::Derive,
        label: format!("deriving {} from {}", config.target_property, config.source_property),
    });
    let mut summary = DeriveSummary { fetched: records.len(), ..DeriveSummary::default() };
    let mut updates = Vec::new();
    for record in &records {
        match derive_location(record, config) {
            Derivation::Update(intent) => updates.push(intent),
            Derivation::Skipped { id, reason } => {
                summary.skipped += 1;
                reporter.report(ProgressEvent::Skipped { id: id.to_string(), reason });
            }
        }
    }
    reporter.report(ProgressEvent::Completed { phase: Phase::Derive, count: updates.len() });

    if updates.is_empty() {
        info!("No updates to send.");
        return Ok(summary);
    }
    if config.dry_run {
        for intent in &updates {
            info!("DRY RUN: would set {}={} on {}", intent.property, intent.value, intent.id);
        }
        return Ok(summary);
    }

    let writer = BatchWriter::new(executor, reporter, app_config.batch_size);
    let outcome = writer
        .write_batches(&updates, &batch_update_path(config), "updates")
        .await;
    summary.updated = outcome.written;
    outcome.into_result()?;
    Ok(summary)
}
