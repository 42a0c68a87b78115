//! The JSON persistence format shared by file export, import and autosave.
//!
//! ```json
//! {
//!   "lines": [
//!     {
//!       "id": "A1",
//!       "start": { "lat": 60.1695, "lng": 24.9354 },
//!       "end": { "lat": 60.1695, "lng": 24.9364 },
//!       "distance": 55.43,
//!       "capturedBySensor": true,
//!       "createdAt": "2026-05-04T08:15:00Z",
//!       "depth": 1.2,
//!       "excavationType": "trench"
//!     }
//!   ],
//!   "metadata": { "version": "1.0", "savedAt": "2026-05-04T08:20:00Z", "totalLines": 1 }
//! }
//! ```
//!
//! Metadata fields are flattened into each line record, so the keys in [`RESERVED_KEYS`] cannot
//! be used as metadata. [`LineStore`] rejects them on update and never writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SurveyError;
use crate::geometry::GeoPoint;
use crate::store::{Line, LineStore, Metadata};

/// The version written to the `metadata.version` field.
pub const DOCUMENT_VERSION: &str = "1.0";

/// The fixed fields of a line record.
pub const RESERVED_KEYS: [&str; 6] = [
    "id",
    "start",
    "end",
    "distance",
    "capturedBySensor",
    "createdAt",
];

/// Whether `key` names a fixed field of a line record.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Copies `metadata` without the reserved keys.
pub(crate) fn without_reserved(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// A single line as stored in a survey document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord {
    /// The display id at the time of saving. Ids are reassigned on load.
    #[serde(default)]
    pub id: String,

    /// The start point.
    pub start: GeoPoint,

    /// The end point.
    pub end: GeoPoint,

    /// The distance in meters at the time of saving. Recomputed on load.
    #[serde(default)]
    pub distance: f64,

    /// Whether the line was captured from GPS fixes.
    #[serde(default)]
    pub captured_by_sensor: bool,

    /// When the line was created. Missing values are replaced with the load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// The line metadata.
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl From<&Line> for LineRecord {
    fn from(line: &Line) -> Self {
        Self {
            id: line.id.clone(),
            start: line.start,
            end: line.end,
            distance: line.distance_meters,
            captured_by_sensor: line.captured_by_sensor,
            created_at: Some(line.created_at),
            metadata: without_reserved(&line.metadata),
        }
    }
}

impl LineRecord {
    /// Parses and validates the record at `index` of a `lines` array.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, SkippedRecord> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);

        serde_json::from_value::<LineRecord>(value.clone())
            .map_err(|e| SkippedRecord::new(index, id, e.to_string()))?
            .validate(index)
    }

    /// Checks that both endpoints are valid coordinates.
    pub fn validate(self, index: usize) -> Result<Self, SkippedRecord> {
        for (name, point) in [("start", &self.start), ("end", &self.end)] {
            if !point.is_valid() {
                return Err(SkippedRecord::new(
                    index,
                    Some(self.id.clone()),
                    format!("{name} point {} is out of range", point),
                ));
            }
        }
        Ok(self)
    }
}

/// A record that was not imported.
#[derive(Debug)]
pub struct SkippedRecord {
    /// The id of the record, if it had a readable one.
    pub id: Option<String>,

    /// Always a [`SurveyError::MalformedRecord`].
    pub error: SurveyError,
}

impl SkippedRecord {
    pub(crate) fn new(index: usize, id: Option<String>, reason: String) -> Self {
        Self {
            id,
            error: SurveyError::MalformedRecord { index, reason },
        }
    }
}

/// The outcome of loading records into a store.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// How many lines were loaded.
    pub imported: usize,

    /// The records that were skipped.
    pub skipped: Vec<SkippedRecord>,
}

impl ImportReport {
    /// Whether every record was loaded.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// The document-level `metadata` object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// The format version.
    pub version: String,

    /// When the document was written.
    pub saved_at: DateTime<Utc>,

    /// The number of lines in the document.
    pub total_lines: usize,
}

/// A complete survey document, ready to be written.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SurveyDocument {
    /// The line records in creation order.
    pub lines: Vec<LineRecord>,

    /// Information about the document itself.
    pub metadata: DocumentMetadata,
}

impl SurveyDocument {
    /// Snapshots the lines of a store.
    pub fn from_store(store: &LineStore) -> Self {
        let lines = store.serialize();
        Self {
            metadata: DocumentMetadata {
                version: DOCUMENT_VERSION.to_string(),
                saved_at: Utc::now(),
                total_lines: lines.len(),
            },
            lines,
        }
    }

    /// Writes the document as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SurveyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The loosely typed form of a document, so that single records can fail on their own.
#[derive(Debug, Deserialize)]
pub struct RawDocument {
    /// The unparsed line records.
    #[serde(default)]
    pub lines: Vec<Value>,

    /// The document metadata, if present.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl RawDocument {
    /// Parses the outer structure of a document.
    ///
    /// Fails only if the input is not JSON, or if `lines` is not an array.
    pub fn parse(json: &str) -> Result<Self, SurveyError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The document metadata, if it is present and well-formed.
    pub fn document_metadata(&self) -> Option<DocumentMetadata> {
        self.metadata
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}
