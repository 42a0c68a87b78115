//! Events published by a survey to its subscribers, usually rendering layers.

use crossbeam_channel::{Receiver, Sender};

use crate::capture::CapturePreview;
use crate::store::{IdChange, Line};

/// A change a rendering layer needs to reflect.
#[derive(Clone, Debug, PartialEq)]
pub enum SurveyEvent {
    /// A line was added.
    LineCreated(Line),

    /// The geometry or metadata of a line changed.
    LineUpdated(Line),

    /// The line with this id was removed. Followed by [`SurveyEvent::LinesRenumbered`] when
    /// surviving lines changed their ids.
    LineDeleted(String),

    /// Surviving lines were renumbered after a deletion.
    LinesRenumbered(Vec<IdChange>),

    /// All lines were replaced, e.g. after loading a document.
    LinesReplaced(Vec<Line>),

    /// The live capture preview changed. `None` once the capture ends or is cancelled.
    CapturePreviewChanged(Option<CapturePreview>),

    /// The selected line changed.
    SelectionChanged(Option<String>),
}

/// Fans events out to every live subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<SurveyEvent>>,
}

impl EventBus {
    /// Creates a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver for every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<SurveyEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Sends an event to every subscriber, forgetting those whose receiver was dropped.
    pub fn publish(&mut self, event: SurveyEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// The number of live subscribers, as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
