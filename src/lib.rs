#![warn(missing_docs)]

//! A field-survey line drawing core.
//!
//! Users draw two-point line segments over a map, either manually or by capturing a start and an
//! end point from live GPS fixes, annotate each line with free-form metadata, and export the result
//! as JSON, CSV or GeoJSON.
//!
//! The [`Survey`] context object owns the [`LineStore`](store::LineStore) and the
//! [`CaptureSession`](capture::CaptureSession), and publishes [`SurveyEvent`](events::SurveyEvent)s
//! for rendering layers such as [`LineLayer`](layers::lines::LineLayer).
//!
//! # Example
//!
//! ```
//! use survey_lines::{Survey, config::ExcavationSurveyConfig, geometry::GeoPoint};
//!
//! let mut survey = Survey::new(ExcavationSurveyConfig::default());
//!
//! survey.on_position_update(GeoPoint::new(60.1695, 24.9354).unwrap());
//! survey.request_capture_start().unwrap();
//! survey.on_position_update(GeoPoint::new(60.1695, 24.9364).unwrap());
//! let line = survey.request_capture_end().unwrap();
//!
//! assert_eq!(line.id, "A1");
//! assert!(line.captured_by_sensor);
//! ```

/// Configuration traits and types for a survey.
pub mod config;

/// Geometry utilities over latitude/longitude pairs.
pub mod geometry;

/// The GPS two-point capture state machine.
pub mod capture;

/// The ordered collection of drawn and captured lines.
pub mod store;

/// The JSON persistence format.
pub mod document;

/// Tabular CSV export.
pub mod export;

/// Events published to rendering layers.
pub mod events;

/// Position source contract and subscriptions.
pub mod position;

/// Map projection.
pub mod projection;

/// The survey context object.
pub mod survey;

/// Rendering layers.
#[cfg(feature = "line-layer")]
pub mod layers;

/// GeoJSON export and import.
#[cfg(feature = "geojson")]
pub mod geojson;

use thiserror::Error;

pub use crate::survey::Survey;

/// Errors that can occur while working with a survey.
#[derive(Error, Debug)]
pub enum SurveyError {
    /// No line with the given id exists in the store.
    #[error("No line with id `{0}`")]
    NotFound(String),

    /// A capture was requested before any position fix arrived.
    #[error("No position fix available yet, waiting for GPS")]
    NoFixAvailable,

    /// A latitude or longitude is outside of its valid range.
    #[error("Coordinate out of range: lat `{lat}`, lng `{lng}`")]
    InvalidCoordinate {
        /// The offending latitude.
        lat: f64,
        /// The offending longitude.
        lng: f64,
    },

    /// A metadata key collides with one of the fixed fields of a line record.
    #[error("Metadata key `{0}` is reserved")]
    ReservedMetadataKey(String),

    /// A single line record could not be read.
    #[error("Malformed line record at index {index}: {reason}")]
    MalformedRecord {
        /// The position of the record in the `lines` array.
        index: usize,
        /// Why the record was rejected.
        reason: String,
    },

    /// The document as a whole could not be read.
    #[error("Invalid survey document")]
    InvalidDocument(#[from] serde_json::Error),

    /// The input is not valid GeoJSON.
    #[cfg(feature = "geojson")]
    #[error("Invalid GeoJSON")]
    InvalidGeoJson(#[from] ::geojson::Error),
}
