// crmsync/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use url::Url;

use crate::pipeline::SortDirection;

pub const DEFAULT_API_BASE_URL: &str = "https://api.hubapi.com";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Search and batch endpoints reject more than 100 items per call.
pub const API_ITEM_LIMIT: usize = 100;
pub const ACCESS_TOKEN_ENV: &str = "HUBSPOT_ACCESS_TOKEN";

const DEFAULT_INVOICE_OBJECT_TYPE: &str = "0-53";
const DEFAULT_CUSTOM_OBJECT_TYPE: &str = "2-16842375";
const DEFAULT_LOCATION_PROPERTY: &str = "location_id";
const DEFAULT_ASSOCIATION_CATEGORY: &str = "USER_DEFINED";
const DEFAULT_DERIVE_OBJECT_TYPE: &str = "invoices";
const DEFAULT_SOURCE_PROPERTY: &str = "hs_number";
const DEFAULT_PREFIX_LENGTH: usize = 6;
const DEFAULT_LOOKUP_OBJECT_TYPE: &str = "p_properties";
const DEFAULT_SORT_PROPERTY: &str = "hs_createdate";
const DEFAULT_EXPORT_PROPERTIES: &[&str] = &[
    "hs_number",
    "location_id",
    "hs_invoice_status",
    "hs_createdate",
    "hs_amount_billed",
    "hs_due_date",
    "hs_balance_due",
];

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonAssociationOptions {
    pub association_type_id: Option<u64>,
    pub association_category: Option<String>,
    pub invoice_object_type: Option<String>,
    pub custom_object_type: Option<String>,
    pub location_property: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDeriveOptions {
    pub object_type: Option<String>,
    pub target_property: Option<String>,
    pub source_property: Option<String>,
    pub prefix_length: Option<usize>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonExportOptions {
    pub object_type: Option<String>,
    pub location_property: Option<String>,
    pub properties: Option<Vec<String>>,
    pub sort_property: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub lookup_object_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub access_token: Option<String>,
    pub api_base_url: Option<String>,
    pub page_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub association: Option<JsonAssociationOptions>,
    pub derive: Option<JsonDeriveOptions>,
    pub export: Option<JsonExportOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationConfig {
    pub association_type_id: u64,
    pub association_category: String,
    pub invoice_object_type: String,
    pub custom_object_type: String,
    pub location_property: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeriveConfig {
    pub object_type: String,
    pub target_property: String,
    pub source_property: String,
    pub prefix_length: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub object_type: String,
    pub location_property: String,
    pub properties: Vec<String>,
    pub sort_property: Option<String>,
    pub sort_direction: SortDirection,
    pub lookup_object_type: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub access_token: String,
    pub api_base_url: String,
    pub page_size: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub operation: Option<OperationConfig>,
    pub raw_json_config: RawJsonConfig,
}

#[derive(Debug, Clone)]
pub enum OperationConfig {
    Associate(AssociationConfig),
    Derive(DeriveConfig),
    Export(ExportConfig),
}

impl AppConfig {
    /// Reads `config.json`, letting `HUBSPOT_ACCESS_TOKEN` override the stored token.
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        let env_token = std::env::var(ACCESS_TOKEN_ENV).ok();
        Self::from_raw(raw_json_config, env_token)
    }

    pub fn from_raw(raw_json_config: RawJsonConfig, env_token: Option<String>) -> Result<Self> {
        let access_token = env_token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| raw_json_config.access_token.clone())
            .filter(|t| !t.trim().is_empty())
            .with_context(|| {
                format!("access_token must be set in config.json or via {}", ACCESS_TOKEN_ENV)
            })?;

        let api_base_url = raw_json_config
            .api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        Url::parse(&api_base_url)
            .with_context(|| format!("api_base_url is not a valid URL: {}", api_base_url))?;

        let page_size = raw_json_config.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > API_ITEM_LIMIT {
            anyhow::bail!("page_size must be between 1 and {}, got {}", API_ITEM_LIMIT, page_size);
        }
        let batch_size = raw_json_config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 || batch_size > API_ITEM_LIMIT {
            anyhow::bail!("batch_size must be between 1 and {}, got {}", API_ITEM_LIMIT, batch_size);
        }
        let max_retries = raw_json_config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }

        Ok(AppConfig {
            access_token,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            page_size,
            batch_size,
            max_retries,
            request_timeout_secs: raw_json_config
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            operation: None, // To be filled by main after parsing CLI args
            raw_json_config,
        })
    }
}

pub fn load_association_config_from_json(raw_config: &RawJsonConfig) -> Result<AssociationConfig> {
    let opts = raw_config
        .association
        .as_ref()
        .context("association section must be defined in config.json for associate")?;
    let association_type_id = opts
        .association_type_id
        .context("association.association_type_id must be set in config.json")?;

    Ok(AssociationConfig {
        association_type_id,
        association_category: non_empty_or(&opts.association_category, DEFAULT_ASSOCIATION_CATEGORY),
        invoice_object_type: non_empty_or(&opts.invoice_object_type, DEFAULT_INVOICE_OBJECT_TYPE),
        custom_object_type: non_empty_or(&opts.custom_object_type, DEFAULT_CUSTOM_OBJECT_TYPE),
        location_property: non_empty_or(&opts.location_property, DEFAULT_LOCATION_PROPERTY),
    })
}

pub fn load_derive_config_from_json(raw_config: &RawJsonConfig) -> Result<DeriveConfig> {
    let opts = raw_config.derive.clone().unwrap_or_default();
    let prefix_length = opts.prefix_length.unwrap_or(DEFAULT_PREFIX_LENGTH);
    if prefix_length == 0 {
        anyhow::bail!("derive.prefix_length must be at least 1");
    }

    let config = DeriveConfig {
        object_type: non_empty_or(&opts.object_type, DEFAULT_DERIVE_OBJECT_TYPE),
        target_property: non_empty_or(&opts.target_property, DEFAULT_LOCATION_PROPERTY),
        source_property: non_empty_or(&opts.source_property, DEFAULT_SOURCE_PROPERTY),
        prefix_length,
        dry_run: opts.dry_run.unwrap_or(false),
    };
    if config.target_property == config.source_property {
        anyhow::bail!(
            "derive.target_property and derive.source_property must differ (both are '{}')",
            config.target_property
        );
    }
    Ok(config)
}

pub fn load_export_config_from_json(raw_config: &RawJsonConfig) -> Result<ExportConfig> {
    let opts = raw_config.export.clone().unwrap_or_default();
    let properties = match opts.properties {
        Some(props) if !props.is_empty() => props,
        Some(_) => anyhow::bail!("export.properties cannot be an empty list"),
        None => DEFAULT_EXPORT_PROPERTIES.iter().map(|p| p.to_string()).collect(),
    };
    // An explicit empty string disables sorting.
    let sort_property = match opts.sort_property {
        Some(s) if s.trim().is_empty() => None,
        Some(s) => Some(s),
        None => Some(DEFAULT_SORT_PROPERTY.to_string()),
    };

    Ok(ExportConfig {
        object_type: non_empty_or(&opts.object_type, DEFAULT_DERIVE_OBJECT_TYPE),
        location_property: non_empty_or(&opts.location_property, DEFAULT_LOCATION_PROPERTY),
        properties,
        sort_property,
        sort_direction: opts.sort_direction.unwrap_or_default(),
        lookup_object_type: non_empty_or(&opts.lookup_object_type, DEFAULT_LOOKUP_OBJECT_TYPE),
    })
}

fn non_empty_or(value: &Option<String>, default: &str) -> String {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn raw(value: serde_json::Value) -> RawJsonConfig {
        serde_json::from_value(value).expect("fixture must deserialize")
    }

    #[test]
    fn test_defaults_applied() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(raw(json!({ "access_token": "pat-123" })), None)?;
        assert_eq!(config.access_token, "pat-123");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 5);
        assert!(config.operation.is_none());
        Ok(())
    }

    #[test]
    fn test_env_token_overrides_file() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({ "access_token": "from-file" })),
            Some("from-env".to_string()),
        )?;
        assert_eq!(config.access_token, "from-env");

        let config = AppConfig::from_raw(raw(json!({ "access_token": "from-file" })), Some("  ".to_string()))?;
        assert_eq!(config.access_token, "from-file");
        Ok(())
    }

    #[test]
    fn test_missing_token_rejected() {
        let result = AppConfig::from_raw(raw(json!({})), None);
        assert!(result.is_err());
        let result = AppConfig::from_raw(raw(json!({ "access_token": "" })), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_sizes_validated() {
        for bad in [json!({ "access_token": "t", "page_size": 0 }),
                    json!({ "access_token": "t", "page_size": 101 }),
                    json!({ "access_token": "t", "batch_size": 0 }),
                    json!({ "access_token": "t", "max_retries": 0 }),
                    json!({ "access_token": "t", "api_base_url": "not a url" })] {
            assert!(AppConfig::from_raw(raw(bad.clone()), None).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({ "access_token": "t", "api_base_url": "http://localhost:8080/" })),
            None,
        )?;
        assert_eq!(config.api_base_url, "http://localhost:8080");
        Ok(())
    }

    #[test]
    fn test_association_config() -> anyhow::Result<()> {
        let cfg = load_association_config_from_json(&raw(json!({
            "association": { "association_type_id": 123, "custom_object_type": "2-999" }
        })))?;
        assert_eq!(cfg.association_type_id, 123);
        assert_eq!(cfg.custom_object_type, "2-999");
        assert_eq!(cfg.invoice_object_type, "0-53");
        assert_eq!(cfg.location_property, "location_id");
        assert_eq!(cfg.association_category, "USER_DEFINED");
        Ok(())
    }

    #[test]
    fn test_association_requires_type_id() {
        assert!(load_association_config_from_json(&raw(json!({}))).is_err());
        assert!(load_association_config_from_json(&raw(json!({ "association": {} }))).is_err());
    }

    #[test]
    fn test_derive_config_defaults() -> anyhow::Result<()> {
        let cfg = load_derive_config_from_json(&raw(json!({})))?;
        assert_eq!(cfg.object_type, "invoices");
        assert_eq!(cfg.source_property, "hs_number");
        assert_eq!(cfg.target_property, "location_id");
        assert_eq!(cfg.prefix_length, 6);
        assert!(!cfg.dry_run);
        Ok(())
    }

    #[test]
    fn test_derive_config_rejects_same_property() {
        let result = load_derive_config_from_json(&raw(json!({
            "derive": { "source_property": "location_id" }
        })));
        assert!(result.is_err());
    }

    #[test]
    fn test_export_config() -> anyhow::Result<()> {
        let cfg = load_export_config_from_json(&raw(json!({})))?;
        assert_eq!(cfg.sort_property.as_deref(), Some("hs_createdate"));
        assert_eq!(cfg.sort_direction, SortDirection::Descending);
        assert!(cfg.properties.contains(&"hs_number".to_string()));

        let cfg = load_export_config_from_json(&raw(json!({
            "export": { "properties": ["hs_number"], "sort_property": "", "sort_direction": "ASCENDING" }
        })))?;
        assert_eq!(cfg.sort_direction, SortDirection::Ascending);
        assert_eq!(cfg.properties, vec!["hs_number".to_string()]);
        assert_eq!(cfg.sort_property, None);

        assert!(load_export_config_from_json(&raw(json!({ "export": { "properties": [] } }))).is_err());
        Ok(())
    }

    #[test]
    fn test_load_from_json_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{ "access_token": "pat-file", "batch_size": 50, "association": {{ "association_type_id": 7 }} }}"#
        )?;
        let config = AppConfig::from_raw(
            serde_json::from_str(&std::fs::read_to_string(file.path())?)?,
            None,
        )?;
        assert_eq!(config.batch_size, 50);
        let assoc = load_association_config_from_json(&config.raw_json_config)?;
        assert_eq!(assoc.association_type_id, 7);

        // load_from_json reads the environment too; only assert it parses.
        assert!(AppConfig::load_from_json(file.path()).is_ok());
        Ok(())
    }

    #[test]
    fn test_load_from_json_invalid_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "not json")?;
        assert!(AppConfig::load_from_json(file.path()).is_err());
        Ok(())
    }
}
