// crmsync/src/associate/logic.rs
use std::collections::HashMap;

use log::info;
use serde_json::{Value, json};

use crate::client::{RequestExecutor, Transport};
use crate::config::{AppConfig, AssociationConfig};
use crate::errors::Result;
use crate::pipeline::{
    BatchInput, BatchWriter, Filter, ObjectId, PaginatedCollector, Phase, ProgressEvent,
    ProgressReporter, Record, SearchRequest, search_path,
};

/// Value of the shared location property that links the two object types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn new(key: impl Into<String>) -> Self {
        LocationKey(key.into())
    }
}

/// Location key to object id. Duplicate keys keep the last id seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationIndex {
    entries: HashMap<LocationKey, ObjectId>,
}

impl LocationIndex {
    pub fn from_records(records: &[Record], location_property: &str) -> Self {
        let mut index = LocationIndex::default();
        for record in records {
            if let Some(key) = record.property_str(location_property).filter(|k| !k.is_empty()) {
                index.insert(LocationKey::new(key), record.object_id());
            }
        }
        index
    }

    pub fn insert(&mut self, key: LocationKey, id: ObjectId) {
        self.entries.insert(key, id);
    }

    pub fn get(&self, key: &LocationKey) -> Option<&ObjectId> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries ordered by key.
    fn sorted(&self) -> Vec<(&LocationKey, &ObjectId)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl FromIterator<(LocationKey, ObjectId)> for LocationIndex {
    fn from_iter<I: IntoIterator<Item = (LocationKey, ObjectId)>>(iter: I) -> Self {
        LocationIndex { entries: iter.into_iter().collect() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationType {
    pub category: String,
    pub type_id: u64,
}

/// Link to create from an invoice to a custom object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationIntent {
    pub from: ObjectId,
    pub to: ObjectId,
    pub association: AssociationType,
}

impl BatchInput for AssociationIntent {
    fn to_input(&self) -> Value {
        json!({
            "from": { "id": self.from },
            "to": { "id": self.to },
            "types": [{
                "associationCategory": self.association.category,
                "associationTypeId": self.association.type_id,
            }]
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub intents: Vec<AssociationIntent>,
    pub unmatched_invoices: usize,
    pub unmatched_custom_objects: usize,
}

/// Pairs invoices and custom objects sharing a location key.
///
/// Walks whichever index is smaller; every intent still points invoice -> custom object.
pub fn match_by_location(
    invoices: &LocationIndex,
    custom_objects: &LocationIndex,
    association: &AssociationType,
) -> MatchReport {
    let invoices_smaller = invoices.len() < custom_objects.len();
    let (source, target) = if invoices_smaller {
        (invoices, custom_objects)
    } else {
        (custom_objects, invoices)
    };

    let mut intents = Vec::new();
    for (key, source_id) in source.sorted() {
        let Some(target_id) = target.get(key) else {
            continue;
        };
        let (invoice_id, custom_id) = if invoices_smaller {
            (source_id, target_id)
        } else {
            (target_id, source_id)
        };
        intents.push(AssociationIntent {
            from: invoice_id.clone(),
            to: custom_id.clone(),
            association: association.clone(),
        });
    }

    MatchReport {
        unmatched_invoices: invoices.len() - intents.len(),
        unmatched_custom_objects: custom_objects.len() - intents.len(),
        intents,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationSummary {
    pub invoices_indexed: usize,
    pub custom_objects_indexed: usize,
    pub pairs_found: usize,
    pub associated: usize,
}

pub fn batch_create_path(config: &AssociationConfig) -> String {
    format!(
        "/crm/v4/associations/{}/{}/batch/create",
        config.invoice_object_type, config.custom_object_type
    )
}

async fn fetch_location_index<T: Transport, R: ProgressReporter>(
    collector: &PaginatedCollector<'_, T, R>,
    app_config: &AppConfig,
    object_type: &str,
    label: &str,
    location_property: &str,
) -> Result<LocationIndex> {
    let request = SearchRequest::new(
        Filter::has_property(location_property),
        vec![location_property.to_string()],
        app_config.page_size,
    );
    let records = collector.collect(&search_path(object_type), label, request).await?;
    let index = LocationIndex::from_records(&records, location_property);
    info!(
        "[*] Finished fetch. Found {} unique {} with a {}.",
        index.len(),
        label,
        location_property
    );
    Ok(index)
}

/// Collects both object sets, pairs them by location key, and creates the associations.
///
/// A permanent failure in either collection aborts before anything is written.
/// A failed batch stops the run; earlier batches stay written.
pub async fn perform_association<T: Transport, R: ProgressReporter>(
    executor: &RequestExecutor<T>,
    app_config: &AppConfig,
    config: &AssociationConfig,
    reporter: &R,
) -> Result<AssociationSummary> {
    let collector = PaginatedCollector::new(executor, reporter);

    let invoices = fetch_location_index(
        &collector,
        app_config,
        &config.invoice_object_type,
        "invoices",
        &config.location_property,
    )
    .await?;
    let custom_objects = fetch_location_index(
        &collector,
        app_config,
        &config.custom_object_type,
        "custom objects",
        &config.location_property,
    )
    .await?;

    reporter.report(ProgressEvent::Started {
        phase: Phase::Match,
        label: "pairing objects and preparing associations".to_string(),
    });
    let association = AssociationType {
        category: config.association_category.clone(),
        type_id: config.association_type_id,
    };
    let report = match_by_location(&invoices, &custom_objects, &association);
    reporter.report(ProgressEvent::Completed { phase: Phase::Match, count: report.intents.len() });
    info!(
        "[*] {} pairs matched; {} invoices and {} custom objects had no counterpart.",
        report.intents.len(),
        report.unmatched_invoices,
        report.unmatched_custom_objects
    );

    let mut summary = AssociationSummary {
        invoices_indexed: invoices.len(),
        custom_objects_indexed: custom_objects.len(),
        pairs_found: report.intents.len(),
        associated: 0,
    };
    if report.intents.is_empty() {
        info!("No matching pairs found to associate.");
        return Ok(summary);
    }

    let writer = BatchWriter::new(executor, reporter, app_config.batch_size);
    let outcome = writer
        .write_batches(&report.intents, &batch_create_path(config), "associations")
        .await;
    summary.associated = outcome.written;
    outcome.into_result()?;
    Ok(summary)
}
