// crmsync/src/pipeline/record.rs
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A CRM object as returned by the search and read endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Record {
    /// The named property when it is a string; `None` for absent, null or non-string values.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.id.clone())
    }
}

/// Identifier of an object in the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_deserializes_without_properties() -> anyhow::Result<()> {
        let record: Record = serde_json::from_value(json!({ "id": "42" }))?;
        assert_eq!(record.id, "42");
        assert!(record.properties.is_empty());
        Ok(())
    }

    #[test]
    fn test_property_str_ignores_non_strings() -> anyhow::Result<()> {
        let record: Record = serde_json::from_value(json!({
            "id": "1",
            "properties": { "hs_number": "123456789", "amount": 12, "location_id": null },
            "createdAt": "2024-01-01T00:00:00Z"
        }))?;
        assert_eq!(record.property_str("hs_number"), Some("123456789"));
        assert_eq!(record.property_str("amount"), None);
        assert_eq!(record.property_str("location_id"), None);
        assert_eq!(record.property_str("missing"), None);
        assert_eq!(record.object_id().as_str(), "1");
        Ok(())
    }
}
