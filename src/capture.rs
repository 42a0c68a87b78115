//! GPS two-point capture.
//!
//! A [`CaptureSession`] turns a stream of position fixes and the user commands "capture start",
//! "capture end" and "cancel" into a finished two-point segment:
//!
//! ```text
//! Idle ──arm()──▶ WaitingForStart
//!  │                   │
//!  └─request_capture_start()──▶ WaitingForEnd ──request_capture_end()──▶ Idle (segment)
//!                                     │
//!                                  cancel() ──▶ Idle (nothing)
//! ```
//!
//! Every command may be issued in any state. Commands whose preconditions are not met leave
//! the session untouched.

use log::{debug, info};

use crate::SurveyError;
use crate::geometry::{GeoPoint, bearing_degrees, distance_meters};

/// The state of a capture session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture in progress.
    #[default]
    Idle,
    /// Armed, the next "capture start" records the start point.
    WaitingForStart,
    /// A start point is recorded, waiting for "capture end".
    WaitingForEnd,
}

/// Live feedback while a capture is waiting for its end point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapturePreview {
    /// The recorded start point.
    pub start: GeoPoint,

    /// The latest position fix.
    pub current: GeoPoint,

    /// Great-circle distance from `start` to `current`.
    pub distance_meters: f64,

    /// Initial bearing from `start` to `current`.
    pub bearing_degrees: f64,
}

impl CapturePreview {
    fn between(start: GeoPoint, current: GeoPoint) -> Self {
        Self {
            distance_meters: distance_meters(&start, &current),
            bearing_degrees: bearing_degrees(&start, &current),
            start,
            current,
        }
    }
}

/// The two points of a completed capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapturedSegment {
    /// The point recorded by "capture start".
    pub start: GeoPoint,
    /// The latest fix when "capture end" was requested.
    pub end: GeoPoint,
}

/// The capture state machine.
#[derive(Clone, Debug, Default)]
pub struct CaptureSession {
    state: CaptureState,
    start_point: Option<GeoPoint>,
    latest_fix: Option<GeoPoint>,
    preview: Option<CapturePreview>,
}

impl CaptureSession {
    /// Creates a new idle session without any fix.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The recorded start point, while waiting for the end point.
    pub fn start_point(&self) -> Option<&GeoPoint> {
        self.start_point.as_ref()
    }

    /// The most recent position fix, if any has arrived.
    pub fn latest_fix(&self) -> Option<&GeoPoint> {
        self.latest_fix.as_ref()
    }

    /// Whether at least one position fix has arrived.
    pub fn has_fix(&self) -> bool {
        self.latest_fix.is_some()
    }

    /// The live preview, while waiting for the end point.
    pub fn preview(&self) -> Option<&CapturePreview> {
        self.preview.as_ref()
    }

    /// Records a new position fix. Never changes the state.
    ///
    /// Returns the updated preview when waiting for the end point.
    pub fn on_position_update(&mut self, fix: GeoPoint) -> Option<CapturePreview> {
        self.latest_fix = Some(fix);

        if self.state != CaptureState::WaitingForEnd {
            return None;
        }
        let start = self.start_point?;
        let preview = CapturePreview::between(start, fix);
        self.preview = Some(preview);
        Some(preview)
    }

    /// Arms the session so that the next "capture start" records the start point.
    ///
    /// Only has an effect when idle. Returns whether the state changed.
    pub fn arm(&mut self) -> bool {
        if self.state != CaptureState::Idle {
            return false;
        }
        self.state = CaptureState::WaitingForStart;
        debug!("Capture armed");
        true
    }

    /// Records the latest fix as the start point and waits for the end point.
    ///
    /// Fails with [`SurveyError::NoFixAvailable`] if no fix has arrived yet, leaving the state
    /// unchanged. When already waiting for the end point, the start point is recorded again.
    pub fn request_capture_start(&mut self) -> Result<GeoPoint, SurveyError> {
        let fix = self.latest_fix.ok_or(SurveyError::NoFixAvailable)?;

        self.start_point = Some(fix);
        self.preview = Some(CapturePreview::between(fix, fix));
        self.state = CaptureState::WaitingForEnd;
        info!("Capture started at {}", fix);
        Ok(fix)
    }

    /// Completes the capture with the latest fix as the end point and returns to idle.
    ///
    /// Returns `None`, without changing anything, if no start point is recorded.
    pub fn request_capture_end(&mut self) -> Option<CapturedSegment> {
        if self.state != CaptureState::WaitingForEnd {
            return None;
        }
        let start = self.start_point?;
        let end = self.latest_fix?;

        self.reset();
        info!("Capture ended at {}", end);
        Some(CapturedSegment { start, end })
    }

    /// Abandons the capture and discards the start point.
    ///
    /// Returns whether a capture was in progress.
    pub fn cancel(&mut self) -> bool {
        if self.state == CaptureState::Idle {
            return false;
        }
        self.reset();
        info!("Capture cancelled");
        true
    }

    fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.start_point = None;
        self.preview = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint {
            lat,
            lng,
            accuracy: None,
        }
    }

    #[test]
    fn capture_session_new() {
        let session = CaptureSession::new();
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(!session.has_fix());
        assert!(session.start_point().is_none());
        assert!(session.preview().is_none());
    }

    #[test]
    fn start_without_fix_reports_no_fix() {
        let mut session = CaptureSession::new();
        assert!(matches!(
            session.request_capture_start(),
            Err(SurveyError::NoFixAvailable)
        ));
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn full_capture_sequence() {
        let mut session = CaptureSession::new();
        assert!(session.request_capture_start().is_err());

        session.on_position_update(pt(1.0, 1.0));
        assert_eq!(session.request_capture_start().unwrap(), pt(1.0, 1.0));
        assert_eq!(session.state(), CaptureState::WaitingForEnd);

        let preview = session.on_position_update(pt(1.0, 1.001)).unwrap();
        assert_eq!(preview.start, pt(1.0, 1.0));
        assert_eq!(preview.current, pt(1.0, 1.001));
        assert!((preview.distance_meters - 111.18).abs() < 0.01);
        assert!((preview.bearing_degrees - 90.0).abs() < 0.01);

        let segment = session.request_capture_end().unwrap();
        assert_eq!(segment.start, pt(1.0, 1.0));
        assert_eq!(segment.end, pt(1.0, 1.001));
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.preview().is_none());
    }

    #[test]
    fn position_updates_never_change_state() {
        let mut session = CaptureSession::new();
        assert!(session.on_position_update(pt(1.0, 1.0)).is_none());
        assert_eq!(session.state(), CaptureState::Idle);

        session.arm();
        assert!(session.on_position_update(pt(1.0, 2.0)).is_none());
        assert_eq!(session.state(), CaptureState::WaitingForStart);
    }

    #[test]
    fn end_while_idle_is_ignored() {
        let mut session = CaptureSession::new();
        session.on_position_update(pt(1.0, 1.0));
        assert!(session.request_capture_end().is_none());
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn cancel_discards_start_point() {
        let mut session = CaptureSession::new();
        session.on_position_update(pt(1.0, 1.0));
        session.request_capture_start().unwrap();

        assert!(session.cancel());
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.start_point().is_none());
        assert!(session.request_capture_end().is_none());

        session.on_position_update(pt(2.0, 2.0));
        assert_eq!(session.request_capture_start().unwrap(), pt(2.0, 2.0));
        session.on_position_update(pt(2.0, 2.001));
        let segment = session.request_capture_end().unwrap();
        assert_eq!(segment.start, pt(2.0, 2.0));
    }

    #[test]
    fn cancel_while_idle_is_noop() {
        let mut session = CaptureSession::new();
        assert!(!session.cancel());
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn armed_session_captures_on_start() {
        let mut session = CaptureSession::new();
        assert!(session.arm());
        assert!(!session.arm());
        assert!(session.request_capture_end().is_none());
        assert_eq!(session.state(), CaptureState::WaitingForStart);

        assert!(session.request_capture_start().is_err());
        assert_eq!(session.state(), CaptureState::WaitingForStart);

        session.on_position_update(pt(3.0, 3.0));
        session.request_capture_start().unwrap();
        assert_eq!(session.state(), CaptureState::WaitingForEnd);

        session.cancel();
        session.arm();
        assert!(session.cancel());
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn restart_records_new_start_point() {
        let mut session = CaptureSession::new();
        session.on_position_update(pt(1.0, 1.0));
        session.request_capture_start().unwrap();
        session.on_position_update(pt(1.0, 1.5));
        session.request_capture_start().unwrap();

        assert_eq!(session.start_point(), Some(&pt(1.0, 1.5)));
        assert_eq!(session.preview().unwrap().distance_meters, 0.0);
    }
}
