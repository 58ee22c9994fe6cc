//! Passive inspection of immediate publishes.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One immediate publish as seen by an observer.
pub struct PublishRecord<'a> {
    /// Type name of the event payload.
    pub event_type: &'static str,

    /// The payload itself, through its `Debug` surface.
    pub payload: &'a dyn fmt::Debug,

    /// Identifier of the publishing site, when one was supplied (named
    /// channels pass their channel name).
    pub source: Option<&'a str>,

    /// Tick counter value at publish time.
    pub tick: u64,
}

/// Observer notified for every immediate publish.
///
/// Observation is fire-and-forget and carries no delivery guarantees: a
/// panicking observer is logged and ignored, and dispatch to real
/// subscribers proceeds untouched.
pub trait EventObserver: Send + Sync {
    /// Called once per immediate publish, before handlers run.
    fn on_publish(&self, record: &PublishRecord<'_>);
}

/// A recorded publish, with the payload captured as its `Debug` rendering.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: &'static str,
    pub payload: String,
    pub source: Option<String>,
}

/// Bounded in-memory publish history for debugging tooling.
///
/// Keeps the most recent `max_history` records, trimming the oldest.
pub struct EventRecorder {
    history: Mutex<VecDeque<RecordedEvent>>,
    max_history: usize,
}

impl EventRecorder {
    /// Default number of retained records.
    pub const DEFAULT_MAX_HISTORY: usize = 2000;

    /// Recorder retaining [`DEFAULT_MAX_HISTORY`](Self::DEFAULT_MAX_HISTORY) records.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_HISTORY)
    }

    /// Recorder retaining at most `max_history` records (minimum 1).
    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            max_history: max_history.max(1),
        }
    }

    /// Copies out the recorded history, oldest first.
    pub fn history(&self) -> Vec<RecordedEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// Discards all recorded history.
    pub fn clear(&self) {
        self.history.lock().clear();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventObserver for EventRecorder {
    fn on_publish(&self, record: &PublishRecord<'_>) {
        let mut history = self.history.lock();
        while history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(RecordedEvent {
            tick: record.tick,
            timestamp: Utc::now(),
            event_type: record.event_type,
            payload: format!("{:?}", record.payload),
            source: record.source.map(str::to_owned),
        });
    }
}
