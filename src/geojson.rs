//! GeoJSON serialization and deserialization of survey lines.
//!
//! Each line becomes a `LineString` feature with two positions. The line id, distance, sensor
//! flag and creation time are stored as properties next to the metadata fields. On import, a
//! `LineString` with more than two positions is reduced to its first and last position.

use chrono::{DateTime, Utc};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value, feature::Id};
use serde_json::Value as JsonValue;

use crate::SurveyError;
use crate::document::{LineRecord, SkippedRecord, without_reserved};
use crate::geometry::GeoPoint;
use crate::store::Line;

fn geo_point_to_vec(point: &GeoPoint) -> Vec<f64> {
    vec![point.lng, point.lat]
}

fn vec_to_geo_point(pos: &[f64]) -> Result<GeoPoint, String> {
    match pos {
        [lng, lat, ..] => Ok(GeoPoint {
            lat: *lat,
            lng: *lng,
            accuracy: None,
        }),
        _ => Err(format!("position {:?} needs a longitude and a latitude", pos)),
    }
}

impl From<&Line> for Feature {
    fn from(line: &Line) -> Self {
        let mut properties = without_reserved(&line.metadata);
        properties.insert("id".to_string(), JsonValue::String(line.id.clone()));
        properties.insert("distance".to_string(), JsonValue::from(line.distance_meters));
        properties.insert(
            "capturedBySensor".to_string(),
            JsonValue::Bool(line.captured_by_sensor),
        );
        properties.insert(
            "createdAt".to_string(),
            JsonValue::String(line.created_at.to_rfc3339()),
        );

        Feature {
            geometry: Some(Geometry::new(Value::LineString(vec![
                geo_point_to_vec(&line.start),
                geo_point_to_vec(&line.end),
            ]))),
            id: Some(Id::String(line.id.clone())),
            properties: Some(properties),
            ..Default::default()
        }
    }
}

impl TryFrom<Feature> for LineRecord {
    type Error = String;

    fn try_from(feature: Feature) -> Result<Self, Self::Error> {
        let Feature {
            geometry,
            id,
            properties,
            ..
        } = feature;

        let positions = match geometry.map(|g| g.value) {
            Some(Value::LineString(positions)) => positions,
            Some(_) => return Err("expected a LineString geometry".to_string()),
            None => return Err("feature has no geometry".to_string()),
        };
        let (start, end) = match positions.as_slice() {
            [start, .., end] => (vec_to_geo_point(start)?, vec_to_geo_point(end)?),
            _ => return Err("a line needs at least two positions".to_string()),
        };

        let mut metadata = properties.unwrap_or_default();
        let id = metadata
            .remove("id")
            .and_then(|v| v.as_str().map(str::to_string))
            .or(match id {
                Some(Id::String(s)) => Some(s),
                _ => None,
            })
            .unwrap_or_default();
        let distance = metadata
            .remove("distance")
            .and_then(|v| v.as_f64())
            .unwrap_or_default();
        let captured_by_sensor = metadata
            .remove("capturedBySensor")
            .and_then(|v| v.as_bool())
            .unwrap_or_default();
        let created_at = metadata
            .remove("createdAt")
            .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
            .map(|t| t.with_timezone(&Utc));

        Ok(LineRecord {
            id,
            start,
            end,
            distance,
            captured_by_sensor,
            created_at,
            metadata,
        })
    }
}

/// Builds a feature collection of the lines, in creation order.
pub fn to_feature_collection(lines: &[Line]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: lines.iter().map(Feature::from).collect(),
        foreign_members: None,
    }
}

/// Parses GeoJSON into line records, one per feature.
///
/// A single feature or a bare geometry is treated as a collection of one. Features that are
/// not lines are returned as skipped records.
pub fn records_from_geojson(
    json: &str,
) -> Result<Vec<Result<LineRecord, SkippedRecord>>, SurveyError> {
    let features = match json.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    };

    Ok(features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let id = feature
                .property("id")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            LineRecord::try_from(feature)
                .map_err(|reason| SkippedRecord::new(index, id, reason))
                .and_then(|record| record.validate(index))
        })
        .collect())
}
