//! The survey context object.
//!
//! A [`Survey`] owns the line store, the capture session, the position tracking subscription
//! and the event subscribers. All operations are synchronous and are expected to run on a single
//! thread; hosts that share a survey between threads must serialize access themselves.

use crossbeam_channel::Receiver;
use eyre::Context;
use log::{debug, info, warn};
use std::path::Path;

use crate::SurveyError;
use crate::capture::{CaptureSession, CaptureState};
use crate::config::SurveyConfig;
use crate::document::{DOCUMENT_VERSION, ImportReport, RawDocument, SurveyDocument};
use crate::events::{EventBus, SurveyEvent};
use crate::export;
use crate::geometry::GeoPoint;
use crate::position::{PositionSource, Subscription};
use crate::store::{Endpoint, Line, LineStore, Metadata};

#[cfg(feature = "line-layer")]
use crate::layers::lines::LineAction;

struct Tracking {
    fixes: Receiver<GeoPoint>,
    _subscription: Subscription,
}

/// A drawing session: lines, GPS capture and the subscribers watching them.
pub struct Survey {
    config: Box<dyn SurveyConfig>,
    store: LineStore,
    capture: CaptureSession,
    events: EventBus,
    selected: Option<String>,
    tracking: Option<Tracking>,
}

impl Survey {
    /// Creates an empty survey.
    ///
    /// # Arguments
    ///
    /// * `config` - A type that implements `SurveyConfig`, which provides the metadata schema and
    ///   the hit-testing threshold.
    pub fn new<C: SurveyConfig + 'static>(config: C) -> Self {
        Self {
            store: LineStore::from_config(&config),
            config: Box::new(config),
            capture: CaptureSession::new(),
            events: EventBus::new(),
            selected: None,
            tracking: None,
        }
    }

    /// The configuration of the survey.
    pub fn config(&self) -> &dyn SurveyConfig {
        self.config.as_ref()
    }

    /// The line store.
    pub fn store(&self) -> &LineStore {
        &self.store
    }

    /// All lines in creation order.
    pub fn lines(&self) -> &[Line] {
        self.store.lines()
    }

    /// The capture session.
    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    /// The current capture state.
    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Returns a receiver for every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<SurveyEvent> {
        self.events.subscribe()
    }

    /// Adds a line and publishes [`SurveyEvent::LineCreated`].
    pub fn add_line(&mut self, start: GeoPoint, end: GeoPoint, captured_by_sensor: bool) -> Line {
        let line = self.store.add_line(start, end, captured_by_sensor);
        self.events.publish(SurveyEvent::LineCreated(line.clone()));
        line
    }

    /// Moves an endpoint of a line and publishes [`SurveyEvent::LineUpdated`].
    pub fn update_endpoint(
        &mut self,
        id: &str,
        which: Endpoint,
        point: GeoPoint,
    ) -> Result<Line, SurveyError> {
        let line = self.store.update_endpoint(id, which, point)?;
        self.events.publish(SurveyEvent::LineUpdated(line.clone()));
        Ok(line)
    }

    /// Merges metadata fields into a line and publishes [`SurveyEvent::LineUpdated`].
    pub fn update_metadata(&mut self, id: &str, patch: Metadata) -> Result<Line, SurveyError> {
        let line = self.store.update_metadata(id, patch)?;
        self.events.publish(SurveyEvent::LineUpdated(line.clone()));
        Ok(line)
    }

    /// Deletes a line and renumbers the rest. Returns whether a line was deleted.
    pub fn delete_line(&mut self, id: &str) -> bool {
        let Some(deletion) = self.store.delete_line(id) else {
            debug!("Ignoring deletion of unknown line {}", id);
            return false;
        };

        let selected = match self.selected.as_deref() {
            Some(s) if s == deletion.removed.id => None,
            Some(s) => Some(
                deletion
                    .renumbered
                    .iter()
                    .find(|c| c.from == s)
                    .map_or_else(|| s.to_string(), |c| c.to.clone()),
            ),
            None => None,
        };

        self.events
            .publish(SurveyEvent::LineDeleted(deletion.removed.id));
        if !deletion.renumbered.is_empty() {
            self.events
                .publish(SurveyEvent::LinesRenumbered(deletion.renumbered));
        }
        self.set_selection(selected);
        true
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.store.clear();
        self.lines_replaced();
    }

    /// The first line, in creation order, within the configured threshold of `point`.
    pub fn find_near(&self, point: &GeoPoint) -> Option<&Line> {
        self.store
            .find_near(point, self.config.hit_threshold_meters())
    }

    /// Selects the line near `point`, or clears the selection if there is none.
    pub fn select_at(&mut self, point: &GeoPoint) -> Option<Line> {
        let found = self.find_near(point).cloned();
        self.set_selection(found.as_ref().map(|line| line.id.clone()));
        found
    }

    /// The selected line.
    pub fn selected(&self) -> Option<&Line> {
        self.selected.as_deref().and_then(|id| self.store.get(id))
    }

    /// Clears the selection.
    pub fn clear_selection(&mut self) {
        self.set_selection(None);
    }

    fn set_selection(&mut self, selected: Option<String>) {
        if self.selected != selected {
            self.selected = selected.clone();
            self.events.publish(SurveyEvent::SelectionChanged(selected));
        }
    }

    /// Feeds a position fix to the capture session.
    pub fn on_position_update(&mut self, fix: GeoPoint) {
        if let Some(preview) = self.capture.on_position_update(fix) {
            self.events
                .publish(SurveyEvent::CapturePreviewChanged(Some(preview)));
        }
    }

    /// Arms the capture session. See [`CaptureSession::arm`].
    pub fn arm_capture(&mut self) -> bool {
        self.capture.arm()
    }

    /// Records the latest fix as the start of a captured line.
    pub fn request_capture_start(&mut self) -> Result<GeoPoint, SurveyError> {
        let start = self.capture.request_capture_start().inspect_err(|_| {
            debug!("Capture start requested before the first position fix");
        })?;
        self.events.publish(SurveyEvent::CapturePreviewChanged(
            self.capture.preview().copied(),
        ));
        Ok(start)
    }

    /// Completes a capture, adding a sensor-captured line from the start point to the latest fix.
    ///
    /// Returns `None` if no capture is waiting for its end point.
    pub fn request_capture_end(&mut self) -> Option<Line> {
        let segment = self.capture.request_capture_end()?;
        self.events.publish(SurveyEvent::CapturePreviewChanged(None));
        Some(self.add_line(segment.start, segment.end, true))
    }

    /// Abandons a capture in progress. Returns whether there was one.
    pub fn cancel_capture(&mut self) -> bool {
        let cancelled = self.capture.cancel();
        if cancelled {
            self.events.publish(SurveyEvent::CapturePreviewChanged(None));
        }
        cancelled
    }

    /// Subscribes to a position source. Fixes are queued until [`Survey::process_fixes`].
    ///
    /// An earlier tracking subscription is ended.
    pub fn start_tracking(&mut self, source: &mut dyn PositionSource) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let subscription = source.subscribe(Box::new(move |fix| {
            // Fails only once tracking has stopped.
            let _ = tx.send(fix);
        }));

        self.tracking = Some(Tracking {
            fixes: rx,
            _subscription: subscription,
        });
        info!("Position tracking started");
    }

    /// Ends the tracking subscription. Returns whether tracking was active.
    pub fn stop_tracking(&mut self) -> bool {
        let stopped = self.tracking.take().is_some();
        if stopped {
            info!("Position tracking stopped");
        }
        stopped
    }

    /// Whether a position source is subscribed.
    pub fn is_tracking(&self) -> bool {
        self.tracking.is_some()
    }

    /// Processes the queued position fixes in arrival order. Returns how many were processed.
    pub fn process_fixes(&mut self) -> usize {
        let fixes: Vec<GeoPoint> = match &self.tracking {
            Some(tracking) => tracking.fixes.try_iter().collect(),
            None => return 0,
        };
        for fix in &fixes {
            self.on_position_update(*fix);
        }
        fixes.len()
    }

    /// Applies an action queued by a [`LineLayer`](crate::layers::lines::LineLayer).
    ///
    /// Returns the created, moved or picked line. Fails with [`SurveyError::InvalidCoordinate`]
    /// if a new endpoint is out of range.
    #[cfg(feature = "line-layer")]
    pub fn apply_action(&mut self, action: LineAction) -> Result<Option<Line>, SurveyError> {
        let endpoints = match &action {
            LineAction::Create { start, end } => vec![start, end],
            LineAction::MoveEndpoint { to, .. } => vec![to],
            LineAction::Pick(_) => vec![],
        };
        if let Some(point) = endpoints.into_iter().find(|point| !point.is_valid()) {
            return Err(SurveyError::InvalidCoordinate {
                lat: point.lat,
                lng: point.lng,
            });
        }

        match action {
            LineAction::Create { start, end } => Ok(Some(self.add_line(start, end, false))),
            LineAction::MoveEndpoint { id, which, to } => {
                self.update_endpoint(&id, which, to).map(Some)
            }
            LineAction::Pick(point) => Ok(self.select_at(&point)),
        }
    }

    /// Snapshots the survey as a document.
    pub fn to_document(&self) -> SurveyDocument {
        SurveyDocument::from_store(&self.store)
    }

    /// Writes the survey document as JSON.
    pub fn export_json(&self) -> Result<String, SurveyError> {
        self.to_document().to_json()
    }

    /// Replaces all lines with those of a JSON survey document.
    ///
    /// Malformed line records are skipped and listed in the report. Fails only if the document
    /// itself cannot be read.
    pub fn import_json(&mut self, json: &str) -> Result<ImportReport, SurveyError> {
        let raw = RawDocument::parse(json)?;
        if let Some(metadata) = raw.document_metadata() {
            if metadata.version != DOCUMENT_VERSION {
                warn!(
                    "Loading survey document version {}, expected {}",
                    metadata.version, DOCUMENT_VERSION
                );
            }
            if metadata.total_lines != raw.lines.len() {
                warn!(
                    "Survey document claims {} lines but contains {}",
                    metadata.total_lines,
                    raw.lines.len()
                );
            }
        }

        let report = self.store.deserialize(&raw.lines);
        self.lines_replaced();
        Ok(report)
    }

    /// Writes the lines as CSV, with the configured metadata fields as trailing columns.
    pub fn export_csv(&self) -> String {
        export::to_csv(self.store.lines(), self.config.metadata_fields())
    }

    /// Writes the lines as a GeoJSON feature collection.
    #[cfg(feature = "geojson")]
    pub fn export_geojson(&self) -> Result<String, SurveyError> {
        let collection = crate::geojson::to_feature_collection(self.store.lines());
        Ok(serde_json::to_string_pretty(&collection)?)
    }

    /// Replaces all lines with the `LineString` features of a GeoJSON document.
    #[cfg(feature = "geojson")]
    pub fn import_geojson(&mut self, json: &str) -> Result<ImportReport, SurveyError> {
        let records = crate::geojson::records_from_geojson(json)?;
        let report = self.store.load_records(records);
        self.lines_replaced();
        Ok(report)
    }

    /// Saves the survey document to a file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        let json = self
            .export_json()
            .wrap_err("Failed to serialize survey")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write survey to {}", path.display()))?;
        info!("Saved {} lines to {}", self.store.len(), path.display());
        Ok(())
    }

    /// Loads a survey document from a file, replacing all lines.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> eyre::Result<ImportReport> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read survey from {}", path.display()))?;
        self.import_json(&json)
            .with_context(|| format!("Failed to load survey from {}", path.display()))
    }

    fn lines_replaced(&mut self) {
        self.set_selection(None);
        self.events
            .publish(SurveyEvent::LinesReplaced(self.store.lines().to_vec()));
    }
}
