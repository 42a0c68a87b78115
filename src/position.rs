//! The contract between a position sensor and a survey.
//!
//! Sensors push pre-validated [`GeoPoint`] fixes to a callback. Subscribing returns a
//! [`Subscription`] guard that unsubscribes when dropped.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::geometry::GeoPoint;

/// A callback receiving position fixes.
pub type FixCallback = Box<dyn FnMut(GeoPoint)>;

/// A push-style source of position fixes, such as a GPS receiver.
pub trait PositionSource {
    /// Starts delivering fixes to `on_fix` until the returned subscription is dropped.
    fn subscribe(&mut self, on_fix: FixCallback) -> Subscription;
}

/// Keeps a position subscription alive. Unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a subscription that runs `unsubscribe` when it ends.
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Ends the subscription now.
    pub fn unsubscribe(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: Vec<(u64, FixCallback)>,
}

/// A position source fed by hand, e.g. from typed-in coordinates or a replayed track.
///
/// # Example
///
/// ```
/// use survey_lines::{Survey, config::ExcavationSurveyConfig, geometry::GeoPoint};
/// use survey_lines::position::ManualPositionSource;
///
/// let mut source = ManualPositionSource::new();
/// let mut survey = Survey::new(ExcavationSurveyConfig::default());
/// survey.start_tracking(&mut source);
///
/// source.push(GeoPoint::new(60.1695, 24.9354).unwrap());
/// assert_eq!(survey.process_fixes(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ManualPositionSource {
    listeners: Rc<RefCell<Listeners>>,
}

impl ManualPositionSource {
    /// Creates a source without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a fix to every subscriber.
    pub fn push(&self, fix: GeoPoint) {
        for (_, callback) in self.listeners.borrow_mut().callbacks.iter_mut() {
            callback(fix);
        }
    }

    /// The number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.borrow().callbacks.len()
    }
}

impl PositionSource for ManualPositionSource {
    fn subscribe(&mut self, on_fix: FixCallback) -> Subscription {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.callbacks.push((id, on_fix));
            id
        };

        let listeners: Weak<RefCell<Listeners>> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .borrow_mut()
                    .callbacks
                    .retain(|(callback_id, _)| *callback_id != id);
            }
        })
    }
}
