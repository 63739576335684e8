//! GeoParquet `geo` metadata and coordinate reference systems.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{SindexError, SindexResult};

/// Reserved file metadata key holding the GeoParquet descriptor.
pub const GEO_METADATA_KEY: &str = "geo";

/// File level GeoParquet metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_column: Option<String>,
    #[serde(default)]
    pub columns: HashMap<String, GeoColumnMetadata>,
}

/// Per geometry column GeoParquet metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoColumnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default)]
    pub geometry_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
}

impl GeoMetadata {
    pub fn parse(json: &str) -> SindexResult<GeoMetadata> {
        serde_json::from_str(json).map_err(|e| SindexError::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> SindexResult<String> {
        serde_json::to_string(self).map_err(|e| SindexError::Serialization(e.to_string()))
    }
}

/// A coordinate reference system descriptor, usually PROJJSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    definition: Value,
}

impl Crs {
    pub fn new(definition: Value) -> Crs {
        Crs { definition }
    }

    /// The raw descriptor as stored in the dataset.
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// Short identifier such as `EPSG:4326`.
    ///
    /// Strings are returned as-is; PROJJSON objects yield `AUTHORITY:CODE`
    /// from their `id` member, falling back to their `name`.
    pub fn identifier(&self) -> Option<String> {
        match &self.definition {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => {
                let from_id = obj.get("id").and_then(|id| {
                    let authority = id.get("authority")?.as_str()?;
                    let code = match id.get("code")? {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    Some(format!("{}:{}", authority, code))
                });
                from_id.or_else(|| obj.get("name")?.as_str().map(str::to_string))
            }
            _ => None,
        }
    }

    /// Resolves the CRS of `column` from the raw `geo` metadata value.
    ///
    /// # Errors
    ///
    /// `MissingCrs` when the metadata, the column entry or its `crs` member is
    /// absent or null; `DatasetUnavailable` when the metadata is not valid JSON.
    pub fn from_geo_metadata(
        raw: Option<&str>,
        column: &str,
        dataset: &Path,
    ) -> SindexResult<Crs> {
        let missing = || SindexError::MissingCrs {
            path: dataset.to_path_buf(),
            column: column.to_string(),
        };

        let raw = raw.ok_or_else(missing)?;
        let metadata = GeoMetadata::parse(raw).map_err(|e| {
            SindexError::dataset_unavailable(dataset, format!("malformed geo metadata: {}", e))
        })?;

        metadata
            .columns
            .get(column)
            .and_then(|c| c.crs.clone())
            .filter(|crs| !crs.is_null())
            .map(Crs::new)
            .ok_or_else(missing)
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.identifier() {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "{}", self.definition),
        }
    }
}
