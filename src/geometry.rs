//! Geometric primitives over latitude/longitude pairs.
//!
//! All functions here are pure and total over well-formed [`GeoPoint`]s.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SurveyError;

/// Mean Earth radius in meters, used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude (and of longitude at the equator) in meters.
///
/// Only used for hit-testing. The approximation degrades towards the poles.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A geographical position, optionally with the accuracy reported by the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, `-90..=90`.
    pub lat: f64,

    /// Longitude in degrees, `-180..=180`.
    pub lng: f64,

    /// Horizontal accuracy in meters, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl GeoPoint {
    /// Creates a new `GeoPoint`, validating the coordinate ranges.
    pub fn new(lat: f64, lng: f64) -> Result<Self, SurveyError> {
        let point = Self {
            lat,
            lng,
            accuracy: None,
        };
        if point.is_valid() {
            Ok(point)
        } else {
            Err(SurveyError::InvalidCoordinate { lat, lng })
        }
    }

    /// Returns the same point with the given sensor accuracy attached.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Whether the latitude and longitude are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Whether two points share the same coordinates, ignoring accuracy.
    pub fn same_position(&self, other: &GeoPoint) -> bool {
        self.lat == other.lat && self.lng == other.lng
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Great-circle distance between two points in meters, using the haversine formula.
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `h` slightly outside of [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `a` to `b` in degrees, `0` is north and the angle grows clockwise.
///
/// The result is always in `[0, 360)`. Identical points yield `0`.
pub fn bearing_degrees(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if a.same_position(b) {
        return 0.0;
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // `rem_euclid` can round up to exactly 360 for tiny negative angles.
    if bearing >= 360.0 { 0.0 } else { bearing }
}

/// Planar distance from `p` to the segment `seg_start`-`seg_end`, in coordinate degrees.
///
/// Treats longitude as `x` and latitude as `y`. This is an approximation meant for
/// interactive hit-testing over short distances, not for displaying distances.
pub fn point_to_segment_distance_degrees(
    p: &GeoPoint,
    seg_start: &GeoPoint,
    seg_end: &GeoPoint,
) -> f64 {
    let ab_x = seg_end.lng - seg_start.lng;
    let ab_y = seg_end.lat - seg_start.lat;
    let ap_x = p.lng - seg_start.lng;
    let ap_y = p.lat - seg_start.lat;
    let l2 = ab_x * ab_x + ab_y * ab_y;

    if l2 == 0.0 {
        // The segment is a point.
        return (ap_x * ap_x + ap_y * ap_y).sqrt();
    }

    let t = ((ap_x * ab_x + ap_y * ab_y) / l2).clamp(0.0, 1.0);

    let dx = p.lng - (seg_start.lng + t * ab_x);
    let dy = p.lat - (seg_start.lat + t * ab_y);
    (dx * dx + dy * dy).sqrt()
}

/// Whether `p` lies within `threshold_meters` of the segment, using [`METERS_PER_DEGREE`].
pub fn is_near_segment(
    p: &GeoPoint,
    seg_start: &GeoPoint,
    seg_end: &GeoPoint,
    threshold_meters: f64,
) -> bool {
    point_to_segment_distance_degrees(p, seg_start, seg_end) * METERS_PER_DEGREE
        <= threshold_meters
}
