//! A layer that renders survey lines and turns pointer input into line actions.
//!
//! The layer mirrors the lines of a [`Survey`](crate::Survey) from its [`SurveyEvent`]s. It never
//! changes lines itself: input is queued as [`LineAction`]s that the host applies with
//! [`Survey::apply_action`](crate::Survey::apply_action).
//!
//! # Example
//!
//! ```no_run
//! use survey_lines::{Survey, config::ExcavationSurveyConfig};
//! use survey_lines::layers::lines::{LineLayer, LineMode};
//!
//! let mut survey = Survey::new(ExcavationSurveyConfig::default());
//! let events = survey.subscribe();
//! let mut layer = LineLayer::new();
//! layer.mode = LineMode::Draw;
//!
//! // Once per frame, after `layer.handle_input(..)`:
//! for action in layer.take_actions() {
//!     if let Err(e) = survey.apply_action(action) {
//!         log::warn!("{e}");
//!     }
//! }
//! for event in events.try_iter() {
//!     layer.apply(&event);
//! }
//! ```

use egui::{Align2, Color32, FontId, Painter, Pos2, Response, Shape, Stroke};
use std::any::Any;

use crate::capture::CapturePreview;
use crate::events::SurveyEvent;
use crate::geometry::GeoPoint;
use crate::layers::Layer;
use crate::projection::MapProjection;
use crate::store::{Endpoint, Line};

/// The mode of the `LineLayer`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineMode {
    /// The layer is not interactive.
    #[default]
    Disabled,
    /// Two clicks place a new line.
    Draw,
    /// A click selects the first line near the pointer.
    Select,
    /// Line endpoints can be dragged.
    Edit,
}

/// A change requested through the layer.
#[derive(Clone, Debug, PartialEq)]
pub enum LineAction {
    /// Create a manually placed line.
    Create {
        /// The first clicked point.
        start: GeoPoint,
        /// The second clicked point.
        end: GeoPoint,
    },
    /// Move an endpoint of a line.
    MoveEndpoint {
        /// The id of the line.
        id: String,
        /// Which endpoint to move.
        which: Endpoint,
        /// The new position.
        to: GeoPoint,
    },
    /// Select the line near a point.
    Pick(GeoPoint),
}

/// Layer implementation that draws survey lines and the live capture preview.
#[derive(Clone)]
pub struct LineLayer {
    lines: Vec<Line>,
    preview: Option<CapturePreview>,
    selected: Option<String>,
    pending_start: Option<GeoPoint>,
    dragged: Option<(String, Endpoint)>,
    actions: Vec<LineAction>,

    /// The current interaction mode.
    pub mode: LineMode,

    /// The stroke of manually placed lines.
    pub stroke: Stroke,

    /// The stroke of lines captured from GPS fixes.
    pub sensor_stroke: Stroke,

    /// The stroke of the selected line.
    pub selected_stroke: Stroke,

    /// The stroke of the dashed capture preview.
    pub preview_stroke: Stroke,

    /// The radius of the endpoint nodes.
    pub node_radius: f32,

    /// The fill color of the endpoint nodes.
    pub node_fill: Color32,
}

impl Default for LineLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineLayer {
    /// Creates a new `LineLayer`.
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            preview: None,
            selected: None,
            pending_start: None,
            dragged: None,
            actions: Vec::new(),
            mode: LineMode::default(),
            stroke: Stroke::new(3.0, Color32::RED),
            sensor_stroke: Stroke::new(3.0, Color32::from_rgb(0, 102, 204)),
            selected_stroke: Stroke::new(5.0, Color32::from_rgb(255, 165, 0)),
            preview_stroke: Stroke::new(2.0, Color32::from_rgb(0, 160, 0)),
            node_radius: 5.0,
            node_fill: Color32::WHITE,
        }
    }

    /// The lines as currently mirrored by the layer.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// The id of the highlighted line.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Reflects a survey event.
    pub fn apply(&mut self, event: &SurveyEvent) {
        match event {
            SurveyEvent::LineCreated(line) => self.lines.push(line.clone()),
            SurveyEvent::LineUpdated(line) => {
                match self.lines.iter_mut().find(|l| l.id == line.id) {
                    Some(existing) => *existing = line.clone(),
                    None => self.lines.push(line.clone()),
                }
            }
            SurveyEvent::LineDeleted(id) => {
                self.lines.retain(|l| &l.id != id);
                if self.selected.as_ref() == Some(id) {
                    self.selected = None;
                }
                if self.dragged.as_ref().is_some_and(|(d, _)| d == id) {
                    self.dragged = None;
                }
            }
            SurveyEvent::LinesRenumbered(changes) => {
                let renamed = |id: &mut String| {
                    if let Some(change) = changes.iter().find(|c| c.from == *id) {
                        *id = change.to.clone();
                    }
                };
                for line in &mut self.lines {
                    renamed(&mut line.id);
                }
                if let Some(selected) = &mut self.selected {
                    renamed(selected);
                }
                if let Some((dragged, _)) = &mut self.dragged {
                    renamed(dragged);
                }
            }
            SurveyEvent::LinesReplaced(lines) => {
                self.lines = lines.clone();
                self.selected = None;
                self.dragged = None;
            }
            SurveyEvent::CapturePreviewChanged(preview) => self.preview = *preview,
            SurveyEvent::SelectionChanged(id) => self.selected = id.clone(),
        }
    }

    /// Drains the actions queued by user input.
    pub fn take_actions(&mut self) -> Vec<LineAction> {
        std::mem::take(&mut self.actions)
    }

    fn handle_draw_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if response.clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let geo_pos = projection.unproject(pointer_pos);
                match self.pending_start.take() {
                    None => self.pending_start = Some(geo_pos),
                    Some(start) => self.actions.push(LineAction::Create {
                        start,
                        end: geo_pos,
                    }),
                }
            }
        }

        // When drawing, we consume all interactions over the map,
        // so that the map does not pan or zoom.
        response.hovered()
    }

    fn handle_select_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if response.clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                self.actions
                    .push(LineAction::Pick(projection.unproject(pointer_pos)));
                return true;
            }
        }
        false
    }

    fn handle_edit_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if response.drag_started() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                self.dragged = self.find_node_at(pointer_pos, projection);
            }
        }

        if response.dragged() {
            if let Some((id, which)) = self.dragged.clone() {
                if let Some(pointer_pos) = response.interact_pointer_pos() {
                    self.push_move(id, which, projection.unproject(pointer_pos));
                }
            }
        }

        if response.drag_stopped() {
            self.dragged = None;
        }

        let is_dragging = self.dragged.is_some();

        if is_dragging {
            response.ctx.set_cursor_icon(egui::CursorIcon::Grabbing);
        } else if let Some(pointer_pos) = response.hover_pos() {
            if self.find_node_at(pointer_pos, projection).is_some() {
                response.ctx.set_cursor_icon(egui::CursorIcon::Grab);
            }
        }

        is_dragging || response.hovered()
    }

    /// Queues an endpoint move, merging it with a pending move of the same endpoint.
    fn push_move(&mut self, id: String, which: Endpoint, to: GeoPoint) {
        if let Some(LineAction::MoveEndpoint {
            id: last_id,
            which: last_which,
            to: last_to,
        }) = self.actions.last_mut()
        {
            if *last_id == id && *last_which == which {
                *last_to = to;
                return;
            }
        }
        self.actions.push(LineAction::MoveEndpoint { id, which, to });
    }

    fn find_node_at(
        &self,
        screen_pos: Pos2,
        projection: &MapProjection,
    ) -> Option<(String, Endpoint)> {
        let click_tolerance_sq = (self.node_radius * 3.0).powi(2);

        // Lines drawn last are on top.
        for line in self.lines.iter().rev() {
            for which in [Endpoint::End, Endpoint::Start] {
                let node_screen_pos = projection.project(*line.endpoint(which));
                if node_screen_pos.distance_sq(screen_pos) < click_tolerance_sq {
                    return Some((line.id.clone(), which));
                }
            }
        }
        None
    }

    fn line_stroke(&self, line: &Line) -> Stroke {
        if self.selected.as_deref() == Some(line.id.as_str()) {
            self.selected_stroke
        } else if line.captured_by_sensor {
            self.sensor_stroke
        } else {
            self.stroke
        }
    }
}

impl Layer for LineLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if self.mode != LineMode::Draw {
            self.pending_start = None;
        }
        if self.mode != LineMode::Edit {
            self.dragged = None;
        }

        match self.mode {
            LineMode::Disabled => false,
            LineMode::Draw => self.handle_draw_input(response, projection),
            LineMode::Select => self.handle_select_input(response, projection),
            LineMode::Edit => self.handle_edit_input(response, projection),
        }
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let font = FontId::proportional(12.0);

        for line in &self.lines {
            let start = projection.project(line.start);
            let end = projection.project(line.end);
            let stroke = self.line_stroke(line);

            painter.line_segment([start, end], stroke);
            painter.text(
                start.lerp(end, 0.5),
                Align2::CENTER_BOTTOM,
                &line.id,
                font.clone(),
                stroke.color,
            );

            if self.mode == LineMode::Edit {
                for node in [start, end] {
                    painter.circle(node, self.node_radius, self.node_fill, stroke);
                }
            }
        }

        if let Some(start) = self.pending_start {
            painter.circle_filled(projection.project(start), self.node_radius, self.stroke.color);
        }

        if let Some(preview) = &self.preview {
            let start = projection.project(preview.start);
            let current = projection.project(preview.current);
            painter.extend(Shape::dashed_line(
                &[start, current],
                self.preview_stroke,
                8.0,
                4.0,
            ));
            painter.circle_filled(start, self.node_radius, self.preview_stroke.color);
            painter.text(
                current,
                Align2::LEFT_BOTTOM,
                format!(
                    "{:.2} m  {:.0}°",
                    preview.distance_meters, preview.bearing_degrees
                ),
                font,
                self.preview_stroke.color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IdChange;
    use chrono::Utc;

    fn pt(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint {
            lat,
            lng,
            accuracy: None,
        }
    }

    fn line(id: &str, lat: f64) -> Line {
        Line {
            id: id.to_string(),
            start: pt(lat, 24.0),
            end: pt(lat, 24.001),
            distance_meters: 55.6,
            metadata: Default::default(),
            captured_by_sensor: false,
            created_at: Utc::now(),
        }
    }

    fn ids(layer: &LineLayer) -> Vec<&str> {
        layer.lines().iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn line_layer_new() {
        let layer = LineLayer::new();
        assert_eq!(layer.mode, LineMode::Disabled);
        assert!(layer.lines.is_empty());
        assert!(layer.preview.is_none());
    }

    #[test]
    fn line_layer_as_any() {
        let layer = LineLayer::new();
        assert!(layer.as_any().is::<LineLayer>());
    }

    #[test]
    fn line_layer_as_any_mut() {
        let mut layer = LineLayer::new();
        assert!(layer.as_any_mut().is::<LineLayer>());
    }

    #[test]
    fn mirrors_created_updated_and_deleted_lines() {
        let mut layer = LineLayer::new();
        layer.apply(&SurveyEvent::LineCreated(line("A1", 60.0)));
        layer.apply(&SurveyEvent::LineCreated(line("A2", 61.0)));

        let mut updated = line("A1", 62.0);
        updated.captured_by_sensor = true;
        layer.apply(&SurveyEvent::LineUpdated(updated.clone()));
        assert_eq!(layer.lines()[0], updated);

        layer.apply(&SurveyEvent::SelectionChanged(Some("A1".to_string())));
        layer.apply(&SurveyEvent::LineDeleted("A1".to_string()));
        assert_eq!(ids(&layer), vec!["A2"]);
        assert!(layer.selected().is_none());
    }

    #[test]
    fn renumbering_renames_lines_and_selection() {
        let mut layer = LineLayer::new();
        for (id, lat) in [("A1", 60.0), ("A2", 61.0), ("A3", 62.0), ("A4", 63.0)] {
            layer.apply(&SurveyEvent::LineCreated(line(id, lat)));
        }
        layer.apply(&SurveyEvent::SelectionChanged(Some("A4".to_string())));

        layer.apply(&SurveyEvent::LineDeleted("A2".to_string()));
        layer.apply(&SurveyEvent::LinesRenumbered(vec![
            IdChange {
                from: "A3".to_string(),
                to: "A2".to_string(),
            },
            IdChange {
                from: "A4".to_string(),
                to: "A3".to_string(),
            },
        ]));

        assert_eq!(ids(&layer), vec!["A1", "A2", "A3"]);
        assert_eq!(layer.lines()[1].start.lat, 62.0);
        assert_eq!(layer.selected(), Some("A3"));
    }

    #[test]
    fn replaced_lines_reset_selection() {
        let mut layer = LineLayer::new();
        layer.apply(&SurveyEvent::LineCreated(line("A1", 60.0)));
        layer.apply(&SurveyEvent::SelectionChanged(Some("A1".to_string())));
        layer.apply(&SurveyEvent::LinesReplaced(vec![line("A1", 10.0)]));

        assert_eq!(layer.lines()[0].start.lat, 10.0);
        assert!(layer.selected().is_none());
    }

    #[test]
    fn endpoint_moves_are_merged() {
        let mut layer = LineLayer::new();
        layer.push_move("A1".to_string(), Endpoint::End, pt(1.0, 1.0));
        layer.push_move("A1".to_string(), Endpoint::End, pt(1.0, 2.0));
        layer.push_move("A1".to_string(), Endpoint::Start, pt(3.0, 3.0));

        let actions = layer.take_actions();
        assert_eq!(
            actions,
            vec![
                LineAction::MoveEndpoint {
                    id: "A1".to_string(),
                    which: Endpoint::End,
                    to: pt(1.0, 2.0)
                },
                LineAction::MoveEndpoint {
                    id: "A1".to_string(),
                    which: Endpoint::Start,
                    to: pt(3.0, 3.0)
                },
            ]
        );
        assert!(layer.take_actions().is_empty());
    }

    #[test]
    fn find_node_prefers_topmost_line() {
        let mut layer = LineLayer::new();
        layer.apply(&SurveyEvent::LineCreated(line("A1", 60.0)));
        layer.apply(&SurveyEvent::LineCreated(line("A2", 60.0)));

        let rect = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(800.0, 600.0));
        let projection = MapProjection::new(18, pt(60.0, 24.0005), rect);
        let start = projection.project(pt(60.0, 24.0));

        assert_eq!(
            layer.find_node_at(start, &projection),
            Some(("A2".to_string(), Endpoint::Start))
        );
        assert!(
            layer
                .find_node_at(egui::pos2(start.x, start.y + 100.0), &projection)
                .is_none()
        );
    }
}
