//! Map projection.

use egui::{Pos2, Rect};

use crate::geometry::GeoPoint;

/// The size of a map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// A helper for converting between geographical and screen coordinates.
///
/// Uses Web-Mercator tile coordinates, so that drawings line up with slippy map tiles. The map
/// may be rotated clockwise around the center of the widget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapProjection {
    zoom: u8,
    center_lng: f64,
    center_lat: f64,
    rotation_degrees: f32,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection` centered on `center`.
    pub fn new(zoom: u8, center: GeoPoint, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center_lng: center.lng,
            center_lat: center.lat,
            rotation_degrees: 0.0,
            widget_rect,
        }
    }

    /// Returns the projection with the map rotated clockwise by `degrees`.
    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation_degrees = degrees.rem_euclid(360.0);
        self
    }

    /// The clockwise map rotation in degrees.
    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPoint) -> Pos2 {
        let center_x = lng_to_x(self.center_lng, self.zoom);
        let center_y = lat_to_y(self.center_lat, self.zoom);

        let tile_x = lng_to_x(geo_pos.lng, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = ((tile_x - center_x) * TILE_SIZE as f64) as f32;
        let dy = ((tile_y - center_y) * TILE_SIZE as f64) as f32;

        let offset = egui::emath::Rot2::from_angle(self.rotation_degrees.to_radians())
            * egui::vec2(dx, dy);
        self.widget_rect.center() + offset
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: Pos2) -> GeoPoint {
        let offset = egui::emath::Rot2::from_angle(-self.rotation_degrees.to_radians())
            * (screen_pos - self.widget_rect.center());

        let center_x = lng_to_x(self.center_lng, self.zoom);
        let center_y = lat_to_y(self.center_lat, self.zoom);

        let target_x = center_x + offset.x as f64 / TILE_SIZE as f64;
        let target_y = center_y + offset.y as f64 / TILE_SIZE as f64;

        GeoPoint {
            lat: y_to_lat(target_y, self.zoom),
            lng: x_to_lng(target_x, self.zoom),
            accuracy: None,
        }
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
fn lng_to_x(lng: f64, zoom: u8) -> f64 {
    (lng + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
///
/// Positions beyond the edge of the world wrap around to [-180, 180).
fn x_to_lng(x: f64, zoom: u8) -> f64 {
    (x / (2.0_f64.powi(zoom as i32)) * 360.0).rem_euclid(360.0) - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees().clamp(-90.0, 90.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    const EPSILON: f64 = 1e-9;

    fn helsinki() -> GeoPoint {
        GeoPoint {
            lat: 60.16952,
            lng: 24.93545,
            accuracy: None,
        }
    }

    fn rect() -> Rect {
        Rect::from_min_max(pos2(0.0, 0.0), pos2(800.0, 600.0))
    }

    #[test]
    fn test_coord_conversion_roundtrip() {
        let zoom: u8 = 10;
        for (lng, lat) in [(24.93545, 60.16952), (-122.4194, 37.7749)] {
            let final_lng = x_to_lng(lng_to_x(lng, zoom), zoom);
            let final_lat = y_to_lat(lat_to_y(lat, zoom), zoom);
            assert!((lng - final_lng).abs() < EPSILON);
            assert!((lat - final_lat).abs() < EPSILON);
        }
    }

    #[test]
    fn world_spans_tile_size_times_two_to_the_zoom() {
        let equator = GeoPoint {
            lat: 0.0,
            lng: 0.0,
            accuracy: None,
        };
        let west = GeoPoint {
            lng: -180.0,
            ..equator
        };
        let east = GeoPoint {
            lng: 180.0,
            ..equator
        };

        for (zoom, width) in [(0, 256.0), (2, 1024.0)] {
            let projection = MapProjection::new(zoom, equator, rect());
            let span = projection.project(east) - projection.project(west);
            assert!((span.x - width).abs() < 1e-3, "zoom {zoom}");
            assert!(span.y.abs() < 1e-3, "zoom {zoom}");

            let upside_down = projection.with_rotation(180.0);
            let span = upside_down.project(east) - upside_down.project(west);
            assert!((span.x + width).abs() < 1e-3, "zoom {zoom}");
        }
    }

    #[test]
    fn unproject_wraps_beyond_world_edge() {
        let equator = GeoPoint {
            lat: 0.0,
            lng: 0.0,
            accuracy: None,
        };
        let projection = MapProjection::new(0, equator, rect());

        // 390 px east of the center at zoom 0 is past the antimeridian.
        let point = projection.unproject(pos2(790.0, 300.0));
        assert!(point.is_valid());
        assert!((point.lng - -171.5625).abs() < 1e-9);
        assert!(point.lat.abs() < 1e-9);

        let point = projection.unproject(pos2(-500.0, 300.0));
        assert!(point.is_valid());

        let far_north = projection.unproject(pos2(400.0, -5000.0));
        assert!(far_north.is_valid());
    }

    #[test]
    fn helsinki_tile_at_zoom_ten() {
        // Helsinki center lies in the OSM tile (582, 296) at zoom 10.
        let zoom = 10;
        assert_eq!(lng_to_x(helsinki().lng, zoom).floor(), 582.0);
        assert_eq!(lat_to_y(helsinki().lat, zoom).floor(), 296.0);
    }

    #[test]
    fn center_projects_to_widget_center() {
        let projection = MapProjection::new(15, helsinki(), rect());
        let pos = projection.project(helsinki());
        assert!((pos.x - 400.0).abs() < 1e-3);
        assert!((pos.y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn north_is_up_without_rotation() {
        let projection = MapProjection::new(15, helsinki(), rect());
        let north = GeoPoint {
            lat: helsinki().lat + 0.001,
            ..helsinki()
        };
        let pos = projection.project(north);
        assert!(pos.y < 300.0);
        assert!((pos.x - 400.0).abs() < 1e-3);
    }

    #[test]
    fn rotation_turns_north_clockwise() {
        let projection = MapProjection::new(15, helsinki(), rect()).with_rotation(90.0);
        let north = GeoPoint {
            lat: helsinki().lat + 0.001,
            ..helsinki()
        };
        let pos = projection.project(north);
        // Rotated a quarter turn clockwise, north points to the right of the screen.
        assert!(pos.x > 400.0);
        assert!((pos.y - 300.0).abs() < 1e-2);
    }

    #[test]
    fn project_unproject_roundtrip() {
        for rotation in [0.0, 33.0, 270.0] {
            let projection = MapProjection::new(16, helsinki(), rect()).with_rotation(rotation);
            let screen = pos2(123.0, 456.0);
            let back = projection.project(projection.unproject(screen));
            assert!((back.x - screen.x).abs() < 0.01, "rotation {rotation}");
            assert!((back.y - screen.y).abs() < 0.01, "rotation {rotation}");
        }
    }

    #[test]
    fn rotation_is_normalized() {
        let projection = MapProjection::new(1, helsinki(), rect()).with_rotation(-90.0);
        assert_eq!(projection.rotation_degrees(), 270.0);
    }
}
