//! The ordered collection of survey lines.
//!
//! Lines are kept in creation order and carry dense display ids (`A1..An`). Deleting a line
//! renumbers every surviving line so that exported ids stay contiguous.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;

use crate::SurveyError;
use crate::config::SurveyConfig;
use crate::document::{ImportReport, LineRecord, SkippedRecord, is_reserved_key, without_reserved};
use crate::geometry::{GeoPoint, distance_meters, is_near_segment};

/// Free-form annotations of a line, such as depth or excavation type.
pub type Metadata = serde_json::Map<String, Value>;

/// One of the two endpoints of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// The first point of the line.
    Start,
    /// The second point of the line.
    End,
}

/// A two-point line feature.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    /// Display id, e.g. `A3`. Reassigned when an earlier line is deleted.
    pub id: String,

    /// The start point.
    pub start: GeoPoint,

    /// The end point.
    pub end: GeoPoint,

    /// Great-circle distance between `start` and `end`.
    pub distance_meters: f64,

    /// Free-form annotations.
    pub metadata: Metadata,

    /// Whether the line was captured from GPS fixes rather than placed by hand.
    pub captured_by_sensor: bool,

    /// When the line was created.
    pub created_at: DateTime<Utc>,
}

impl Line {
    /// Returns the given endpoint.
    pub fn endpoint(&self, which: Endpoint) -> &GeoPoint {
        match which {
            Endpoint::Start => &self.start,
            Endpoint::End => &self.end,
        }
    }

    fn set_endpoint(&mut self, which: Endpoint, point: GeoPoint) {
        match which {
            Endpoint::Start => self.start = point,
            Endpoint::End => self.end = point,
        }
        self.distance_meters = distance_meters(&self.start, &self.end);
    }
}

/// A change of a line's display id caused by renumbering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdChange {
    /// The id before renumbering.
    pub from: String,
    /// The id after renumbering.
    pub to: String,
}

/// The result of deleting a line.
#[derive(Clone, Debug, PartialEq)]
pub struct Deletion {
    /// The removed line, with the id it had before removal.
    pub removed: Line,
    /// Ids of surviving lines that changed.
    pub renumbered: Vec<IdChange>,
}

/// Owns the ordered collection of lines.
#[derive(Clone, Debug)]
pub struct LineStore {
    lines: Vec<Line>,
    id_prefix: String,
    default_metadata: Metadata,
}

impl LineStore {
    /// Creates an empty store.
    ///
    /// Default metadata fields with a reserved key are dropped.
    pub fn new(id_prefix: &str, default_metadata: Metadata) -> Self {
        for key in default_metadata.keys().filter(|key| is_reserved_key(key)) {
            warn!("Ignoring default metadata field `{}` with a reserved key", key);
        }
        Self {
            lines: Vec::new(),
            id_prefix: id_prefix.to_string(),
            default_metadata: without_reserved(&default_metadata),
        }
    }

    /// Creates an empty store using the id prefix and metadata defaults of a configuration.
    pub fn from_config(config: &dyn SurveyConfig) -> Self {
        Self::new(config.id_prefix(), config.default_metadata())
    }

    /// All lines in creation order.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Returns the line with the given id.
    pub fn get(&self, id: &str) -> Option<&Line> {
        self.lines.iter().find(|line| line.id == id)
    }

    /// The number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the store holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The sum of all line distances in meters.
    pub fn total_distance_meters(&self) -> f64 {
        self.lines.iter().map(|line| line.distance_meters).sum()
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Adds a new line with default metadata and returns it.
    pub fn add_line(&mut self, start: GeoPoint, end: GeoPoint, captured_by_sensor: bool) -> Line {
        self.push(
            start,
            end,
            captured_by_sensor,
            self.default_metadata.clone(),
            Utc::now(),
        )
    }

    fn push(
        &mut self,
        start: GeoPoint,
        end: GeoPoint,
        captured_by_sensor: bool,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Line {
        let line = Line {
            id: self.id_for(self.lines.len()),
            distance_meters: distance_meters(&start, &end),
            start,
            end,
            metadata,
            captured_by_sensor,
            created_at,
        };
        debug!(
            "Added line {} from {} to {} ({:.2} m)",
            line.id, line.start, line.end, line.distance_meters
        );
        self.lines.push(line.clone());
        line
    }

    /// Moves one endpoint of a line and recomputes its distance.
    pub fn update_endpoint(
        &mut self,
        id: &str,
        which: Endpoint,
        point: GeoPoint,
    ) -> Result<Line, SurveyError> {
        let line = self.get_mut(id)?;
        line.set_endpoint(which, point);
        Ok(line.clone())
    }

    /// Merges the fields of `patch` into the metadata of a line.
    ///
    /// Fails with [`SurveyError::ReservedMetadataKey`], changing nothing, if a key of `patch`
    /// names a fixed field of the line record.
    pub fn update_metadata(&mut self, id: &str, patch: Metadata) -> Result<Line, SurveyError> {
        if let Some(key) = patch.keys().find(|key| is_reserved_key(key)) {
            return Err(SurveyError::ReservedMetadataKey(key.clone()));
        }
        let line = self.get_mut(id)?;
        for (key, value) in patch {
            line.metadata.insert(key, value);
        }
        Ok(line.clone())
    }

    /// Deletes a line and renumbers the surviving ones. Returns `None` if no such line exists.
    pub fn delete_line(&mut self, id: &str) -> Option<Deletion> {
        let index = self.lines.iter().position(|line| line.id == id)?;
        let removed = self.lines.remove(index);
        let renumbered = self.renumber();
        info!(
            "Deleted line {}, renumbered {} lines",
            removed.id,
            renumbered.len()
        );
        Some(Deletion {
            removed,
            renumbered,
        })
    }

    /// Returns the first line, in creation order, within `threshold_meters` of `point`.
    pub fn find_near(&self, point: &GeoPoint, threshold_meters: f64) -> Option<&Line> {
        self.lines
            .iter()
            .find(|line| is_near_segment(point, &line.start, &line.end, threshold_meters))
    }

    /// Plain records of every line, in creation order.
    pub fn serialize(&self) -> Vec<LineRecord> {
        self.lines.iter().map(LineRecord::from).collect()
    }

    /// Replaces the contents of the store with the given JSON records.
    ///
    /// Malformed records are skipped and reported, the rest are loaded.
    pub fn deserialize(&mut self, records: &[Value]) -> ImportReport {
        self.load_records(
            records
                .iter()
                .enumerate()
                .map(|(index, value)| LineRecord::from_value(index, value)),
        )
    }

    /// Replaces the contents of the store with already parsed records.
    ///
    /// Ids are assigned densely in record order, missing metadata fields get their defaults
    /// and distances are recomputed from the endpoints. Metadata with a reserved key is dropped. Records are expected to be validated
    /// with [`LineRecord::validate`] already.
    pub fn load_records<I>(&mut self, records: I) -> ImportReport
    where
        I: IntoIterator<Item = Result<LineRecord, SkippedRecord>>,
    {
        self.lines.clear();
        let mut report = ImportReport::default();

        for record in records {
            match record {
                Ok(record) => {
                    let mut metadata = without_reserved(&record.metadata);
                    for (key, value) in &self.default_metadata {
                        metadata.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    self.push(
                        record.start,
                        record.end,
                        record.captured_by_sensor,
                        metadata,
                        record.created_at.unwrap_or_else(Utc::now),
                    );
                    report.imported += 1;
                }
                Err(skipped) => {
                    warn!("Skipping line record: {}", skipped.error);
                    report.skipped.push(skipped);
                }
            }
        }

        info!(
            "Loaded {} lines, skipped {} malformed records",
            report.imported,
            report.skipped.len()
        );
        report
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Line, SurveyError> {
        self.lines
            .iter_mut()
            .find(|line| line.id == id)
            .ok_or_else(|| SurveyError::NotFound(id.to_string()))
    }

    fn id_for(&self, index: usize) -> String {
        format!("{}{}", self.id_prefix, index + 1)
    }

    fn renumber(&mut self) -> Vec<IdChange> {
        let mut changes = Vec::new();
        for index in 0..self.lines.len() {
            let id = self.id_for(index);
            if self.lines[index].id != id {
                let from = std::mem::replace(&mut self.lines[index].id, id.clone());
                changes.push(IdChange { from, to: id });
            }
        }
        changes
    }
}
