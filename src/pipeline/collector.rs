// crmsync/src/pipeline/collector.rs
use log::{debug, warn};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::progress::{Phase, ProgressEvent, ProgressReporter};
use super::record::Record;
use crate::client::{RequestExecutor, Transport};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    HasProperty,
    NotHasProperty,
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Filter {
    pub fn has_property(property: &str) -> Self {
        Filter { property_name: property.to_string(), operator: Operator::HasProperty, value: None }
    }

    pub fn not_has_property(property: &str) -> Self {
        Filter { property_name: property.to_string(), operator: Operator::NotHasProperty, value: None }
    }

    pub fn equals(property: &str, value: &str) -> Self {
        Filter {
            property_name: property.to_string(),
            operator: Operator::Eq,
            value: Some(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub property_name: String,
    pub direction: SortDirection,
}

/// Body of a `POST /crm/v3/objects/{type}/search` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub properties: Vec<String>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
}

impl SearchRequest {
    /// A single-filter search projecting `properties`.
    pub fn new(filter: Filter, properties: Vec<String>, limit: usize) -> Self {
        SearchRequest {
            filter_groups: vec![FilterGroup { filters: vec![filter] }],
            properties,
            limit,
            after: None,
            sorts: Vec::new(),
        }
    }

    pub fn sorted_by(mut self, property: &str, direction: SortDirection) -> Self {
        self.sorts.push(Sort { property_name: property.to_string(), direction });
        self
    }
}

pub fn search_path(object_type: &str) -> String {
    format!("/crm/v3/objects/{}/search", object_type)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Record>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

/// One page of search results and the cursor for the page after it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub results: Vec<Record>,
    pub next_after: Option<String>,
}

/// Walks a search endpoint page by page until the results run out.
pub struct PaginatedCollector<'a, T, R> {
    executor: &'a RequestExecutor<T>,
    reporter: &'a R,
}

impl<'a, T: Transport, R: ProgressReporter> PaginatedCollector<'a, T, R> {
    pub fn new(executor: &'a RequestExecutor<T>, reporter: &'a R) -> Self {
        PaginatedCollector { executor, reporter }
    }

    pub async fn fetch_page(&self, path: &str, request: &SearchRequest) -> Result<SearchPage> {
        let payload = serde_json::to_value(request)?;
        let body = self
            .executor
            .execute(Method::POST, &self.executor.endpoint(path), Some(&payload))
            .await?;
        let response: SearchResponse = serde_json::from_value(body)
            .map_err(|e| AppError::InvalidResponse(format!("search on {} returned: {}", path, e)))?;

        Ok(SearchPage {
            results: response.results,
            next_after: response.paging.and_then(|p| p.next).map(|n| n.after),
        })
    }

    /// Every record matching `request`, in the order the server yields them.
    ///
    /// Fails as a whole if any page fails; no partial collection is returned.
    pub async fn collect(&self, path: &str, label: &str, mut request: SearchRequest) -> Result<Vec<Record>> {
        self.reporter.report(ProgressEvent::Started {
            phase: Phase::Collect,
            label: format!("fetching all {}", label),
        });
        request.after = None;
        let mut records = Vec::new();

        loop {
            let page = self.fetch_page(path, &request).await?;
            if page.results.is_empty() {
                debug!("Empty page for {} after cursor {:?}", label, request.after);
                break;
            }
            records.extend(page.results);
            self.reporter.on_progress(Phase::Collect, records.len());

            match page.next_after {
                Some(next) if request.after.as_deref() == Some(next.as_str()) => {
                    warn!("Search for {} returned the same cursor '{}' twice; stopping.", label, next);
                    break;
                }
                Some(next) => request.after = Some(next),
                None => break,
            }
        }

        self.reporter.report(ProgressEvent::Completed { phase: Phase::Collect, count: records.len() });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use crate::client::testing::ScriptedTransport;
    use crate::pipeline::progress::testing::RecordingReporter;
    use serde_json::{Value, json};

    fn page(ids: &[&str], after: Option<&str>) -> Value {
        let results: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": id, "properties": { "location_id": format!("loc-{}", id) } }))
            .collect();
        match after {
            Some(a) => json!({ "results": results, "paging": { "next": { "after": a } } }),
            None => json!({ "results": results }),
        }
    }

    fn executor(transport: ScriptedTransport, retries: u32) -> RequestExecutor<ScriptedTransport> {
        RequestExecutor::new(transport, "https://api.example.test", RetryPolicy::new(retries))
    }

    fn request() -> SearchRequest {
        SearchRequest::new(Filter::has_property("location_id"), vec!["location_id".to_string()], 2)
    }

    #[test]
    fn test_search_request_shape() -> anyhow::Result<()> {
        let first = serde_json::to_value(request())?;
        assert_eq!(
            first,
            json!({
                "filterGroups": [{ "filters": [{ "propertyName": "location_id", "operator": "HAS_PROPERTY" }] }],
                "properties": ["location_id"],
                "limit": 2
            })
        );

        let mut later = SearchRequest::new(Filter::equals("location_id", "ZRSVSH"), vec![], 100)
            .sorted_by("hs_createdate", SortDirection::Descending);
        later.after = Some("200".to_string());
        let value = serde_json::to_value(later)?;
        assert_eq!(value["after"], json!("200"));
        assert_eq!(value["filterGroups"][0]["filters"][0]["value"], json!("ZRSVSH"));
        assert_eq!(value["filterGroups"][0]["filters"][0]["operator"], json!("EQ"));
        assert_eq!(value["sorts"], json!([{ "propertyName": "hs_createdate", "direction": "DESCENDING" }]));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_all_pages_in_order() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .respond(200, page(&["1", "2"], Some("c1")))
            .respond(200, page(&["3", "4"], Some("c2")))
            .respond(200, page(&["5"], None));
        let exec = executor(transport, 3);
        let reporter = RecordingReporter::default();
        let collector = PaginatedCollector::new(&exec, &reporter);

        let records = collector.collect("/crm/v3/objects/0-53/search", "invoices", request()).await?;
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

        let requests = exec.transport().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, "https://api.example.test/crm/v3/objects/0-53/search");
        assert!(requests[0].body.as_ref().unwrap().get("after").is_none());
        assert_eq!(requests[1].body.as_ref().unwrap()["after"], json!("c1"));
        assert_eq!(requests[2].body.as_ref().unwrap()["after"], json!("c2"));

        let progress: Vec<usize> = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { count, .. } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![2, 4, 5]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_empty_page() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .respond(200, page(&["1"], Some("c1")))
            .respond(200, page(&[], Some("c2")))
            .respond(200, page(&["never"], None));
        let exec = executor(transport, 1);
        let reporter = RecordingReporter::default();

        let records = PaginatedCollector::new(&exec, &reporter)
            .collect("/s", "things", request())
            .await?;
        assert_eq!(records.len(), 1);
        assert_eq!(exec.transport().requests().len(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_repeated_cursor() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .respond(200, page(&["1"], Some("same")))
            .respond(200, page(&["2"], Some("same")));
        let exec = executor(transport, 1);
        let reporter = RecordingReporter::default();

        let records = PaginatedCollector::new(&exec, &reporter)
            .collect("/s", "things", request())
            .await?;
        assert_eq!(records.len(), 2);
        assert_eq!(exec.transport().requests().len(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_discards_partial_collection() {
        let transport = ScriptedTransport::new()
            .respond(200, page(&["1", "2"], Some("c1")))
            .respond(503, json!({}))
            .respond(503, json!({}));
        let exec = executor(transport, 2);
        let reporter = RecordingReporter::default();

        let result = PaginatedCollector::new(&exec, &reporter)
            .collect("/s", "things", request())
            .await;
        assert!(matches!(result, Err(ref e) if e.is_permanent_failure()));
        assert!(!reporter.events().iter().any(|e| matches!(e, ProgressEvent::Completed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_page_is_invalid_response() {
        let transport = ScriptedTransport::new().respond(200, json!({ "results": [{ "noid": true }] }));
        let exec = executor(transport, 1);
        let reporter = RecordingReporter::default();

        let result = PaginatedCollector::new(&exec, &reporter).fetch_page("/s", &request()).await;
        assert!(matches!(result, Err(AppError::InvalidResponse(_))));
    }

    #[test]
    fn test_search_path() {
        assert_eq!(search_path("2-16842375"), "/crm/v3/objects/2-16842375/search");
    }
}
