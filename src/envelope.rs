//! Pooled envelopes for queued publishes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::EventBus;
use crate::event::{Event, EventResult};

/// Type-erased queued envelope.
///
/// An envelope is owned by exactly one structure at a time: its pool's
/// free list, the immediate queue, or the delayed schedule.
pub(crate) trait AnyEnvelope: Send {
    /// Dispatches the held payload through the immediate publish path.
    fn dispatch(&mut self, bus: &EventBus) -> EventResult<()>;

    /// Clears the payload and pushes the envelope back onto its free list.
    fn release(self: Box<Self>);
}

/// Reusable holder for one queued payload.
pub(crate) struct Envelope<E: Event> {
    payload: Option<E>,
    pool: Arc<EnvelopePool<E>>,
}

impl<E: Event> AnyEnvelope for Envelope<E> {
    fn dispatch(&mut self, bus: &EventBus) -> EventResult<()> {
        match self.payload.take() {
            Some(payload) => bus.publish(payload),
            None => Ok(()),
        }
    }

    fn release(mut self: Box<Self>) {
        self.payload = None;
        let pool = self.pool.clone();
        pool.free.lock().push(self);
    }
}

#[cfg(test)]
impl<E: Event> Envelope<E> {
    pub(crate) fn payload_ref(&self) -> Option<&E> {
        self.payload.as_ref()
    }
}

/// Per-event-type free list of envelopes, most recently returned first.
///
/// `get` runs on arbitrary publisher threads while `release` runs on the
/// drain thread, so the free list is lock-guarded. The payload of a held
/// envelope always has a single owner and needs no synchronization.
pub(crate) struct EnvelopePool<E: Event> {
    free: Mutex<Vec<Box<Envelope<E>>>>,
}

impl<E: Event> EnvelopePool<E> {
    pub(crate) fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Pops a pooled envelope, allocating only when the free list is
    /// empty, and stores `payload` by value.
    pub(crate) fn get(self: &Arc<Self>, payload: E) -> Box<Envelope<E>> {
        let pooled = self.free.lock().pop();
        let mut envelope = match pooled {
            Some(envelope) => envelope,
            None => Box::new(Envelope {
                payload: None,
                pool: Arc::clone(self),
            }),
        };
        envelope.payload = Some(payload);
        envelope
    }

    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.free.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn free_payloads_cleared(&self) -> bool {
        self.free.lock().iter().all(|e| e.payload.is_none())
    }
}

/// Envelope parked until its target tick arrives.
pub(crate) struct DelayedEntry {
    pub(crate) due_tick: u64,
    pub(crate) envelope: Box<dyn AnyEnvelope>,
}
