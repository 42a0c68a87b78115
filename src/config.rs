//! Configuration for different survey deployments.

use serde_json::Value;

use crate::store::Metadata;

/// The type of value a metadata field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// A numeric field, such as a depth in meters.
    Number,
    /// A free text field.
    Text,
}

/// Describes one metadata field of a line.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    /// The key under which the value is stored in the line metadata.
    pub key: String,

    /// The column header used for tabular export.
    pub header: String,

    /// The type of the value.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// A numeric field, defaulting to `0`.
    pub fn number(key: &str, header: &str) -> Self {
        Self {
            key: key.to_string(),
            header: header.to_string(),
            kind: FieldKind::Number,
        }
    }

    /// A text field, defaulting to an empty string.
    pub fn text(key: &str, header: &str) -> Self {
        Self {
            key: key.to_string(),
            header: header.to_string(),
            kind: FieldKind::Text,
        }
    }

    /// The value a new line gets for this field.
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::Number => Value::from(0),
            FieldKind::Text => Value::String(String::new()),
        }
    }
}

/// Configuration for a survey.
pub trait SurveyConfig {
    /// The metadata fields every line carries, in export column order.
    fn metadata_fields(&self) -> &[FieldSpec];

    /// How close, in meters, a point must be to a line to select it.
    fn hit_threshold_meters(&self) -> f64;

    /// The prefix of the line display ids, e.g. `A` for `A1`, `A2`, ...
    fn id_prefix(&self) -> &str;

    /// The metadata a new line starts with.
    fn default_metadata(&self) -> Metadata {
        self.metadata_fields()
            .iter()
            .map(|field| (field.key.clone(), field.default_value()))
            .collect()
    }
}

/// The default hit-testing threshold in meters.
pub const DEFAULT_HIT_THRESHOLD_METERS: f64 = 10.0;

/// The default line id prefix.
pub const DEFAULT_ID_PREFIX: &str = "A";

/// Configuration for excavation surveys of municipal infrastructure.
///
/// # Example
///
/// ```
/// use survey_lines::config::{ExcavationSurveyConfig, SurveyConfig};
/// let config = ExcavationSurveyConfig::default();
/// assert_eq!(config.metadata_fields()[0].key, "depth");
/// ```
pub struct ExcavationSurveyConfig {
    fields: Vec<FieldSpec>,
    hit_threshold_meters: f64,
}

impl Default for ExcavationSurveyConfig {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::number("depth", "Depth (m)"),
                FieldSpec::number("width", "Width (m)"),
                FieldSpec::text("excavationType", "Excavation type"),
                FieldSpec::text("roadType", "Road type"),
                FieldSpec::text("notes", "Notes"),
            ],
            hit_threshold_meters: DEFAULT_HIT_THRESHOLD_METERS,
        }
    }
}

impl SurveyConfig for ExcavationSurveyConfig {
    fn metadata_fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn hit_threshold_meters(&self) -> f64 {
        self.hit_threshold_meters
    }

    fn id_prefix(&self) -> &str {
        DEFAULT_ID_PREFIX
    }
}

/// A survey configuration with a deployment-specific field list.
///
/// # Example
///
/// ```
/// use survey_lines::config::{CustomSurveyConfig, FieldSpec, SurveyConfig};
/// let config = CustomSurveyConfig::new(vec![FieldSpec::text("cable", "Cable")])
///     .with_hit_threshold(5.0)
///     .with_id_prefix("L");
/// assert_eq!(config.id_prefix(), "L");
/// ```
pub struct CustomSurveyConfig {
    fields: Vec<FieldSpec>,
    hit_threshold_meters: f64,
    id_prefix: String,
}

impl CustomSurveyConfig {
    /// Creates a new `CustomSurveyConfig` with the given metadata fields.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            hit_threshold_meters: DEFAULT_HIT_THRESHOLD_METERS,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }

    /// Sets the hit-testing threshold in meters.
    pub fn with_hit_threshold(mut self, meters: f64) -> Self {
        self.hit_threshold_meters = meters;
        self
    }

    /// Sets the line id prefix.
    pub fn with_id_prefix(mut self, prefix: &str) -> Self {
        self.id_prefix = prefix.to_string();
        self
    }
}

impl SurveyConfig for CustomSurveyConfig {
    fn metadata_fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn hit_threshold_meters(&self) -> f64 {
        self.hit_threshold_meters
    }

    fn id_prefix(&self) -> &str {
        &self.id_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excavation_config_default() {
        let config = ExcavationSurveyConfig::default();
        let keys: Vec<&str> = config
            .metadata_fields()
            .iter()
            .map(|f| f.key.as_str())
            .collect();
        assert_eq!(
            keys,
            vec!["depth", "width", "excavationType", "roadType", "notes"]
        );
        assert_eq!(config.hit_threshold_meters(), 10.0);
        assert_eq!(config.id_prefix(), "A");
    }

    #[test]
    fn excavation_config_default_metadata() {
        let config = ExcavationSurveyConfig::default();
        let metadata = config.default_metadata();
        assert_eq!(metadata.get("depth"), Some(&Value::from(0)));
        assert_eq!(metadata.get("roadType"), Some(&Value::String(String::new())));
        assert_eq!(metadata.len(), 5);
    }

    #[test]
    fn custom_config_builder() {
        let config = CustomSurveyConfig::new(vec![FieldSpec::number("diameter", "Diameter")])
            .with_hit_threshold(2.5)
            .with_id_prefix("P");
        assert_eq!(config.hit_threshold_meters(), 2.5);
        assert_eq!(config.id_prefix(), "P");
        assert_eq!(config.metadata_fields()[0].kind, FieldKind::Number);
        assert_eq!(config.default_metadata().get("diameter"), Some(&Value::from(0)));
    }
}
