//! Named event channels layered over the bus.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::bus::EventBus;
use crate::event::{Event, EventError, EventHandler, EventResult};
use crate::list::SubscriberList;

/// Named wrapper around one event type.
///
/// A channel keeps its own local listener list, independent of the bus's
/// dispatch table. Raising a payload invokes the local listeners first
/// and, when the channel was built with a bus, forwards the payload into
/// the bus's immediate path with the channel name as the observer source,
/// so code-only subscribers still receive it.
pub struct EventChannel<E: Event> {
    name: String,
    listeners: Mutex<SubscriberList<E>>,
    next_listener_id: AtomicU64,
    forward: Option<EventBus>,
}

impl<E: Event> EventChannel<E> {
    /// Local-only channel: raised payloads reach local listeners only.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Mutex::new(SubscriberList::new()),
            next_listener_id: AtomicU64::new(0),
            forward: None,
        }
    }

    /// Channel that also forwards raised payloads into `bus`.
    pub fn with_bus(name: impl Into<String>, bus: EventBus) -> Self {
        Self {
            forward: Some(bus),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a local listener and returns its id for unregistering.
    pub fn register<H: EventHandler<E> + 'static>(&self, listener: H) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().add(id, Arc::new(listener));
        id
    }

    /// Removes a local listener; unknown ids are a no-op.
    pub fn unregister(&self, id: u64) {
        self.listeners.lock().remove(id);
    }

    /// Number of local listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Invokes local listeners in slot order, then forwards into the bus
    /// when forwarding is enabled.
    ///
    /// The first listener or bus handler error aborts the rest of the
    /// pass and propagates.
    pub fn raise(&self, event: E) -> EventResult<()> {
        let snapshot = self.listeners.lock().snapshot();
        for listener in &snapshot {
            listener.handle(&event)?;
        }
        match &self.forward {
            Some(bus) => bus.publish_from(event, &self.name),
            None => Ok(()),
        }
    }

    /// [`raise`](EventChannel::raise) for call sites that only know the
    /// payload behind `dyn Any`.
    pub fn raise_boxed(&self, payload: Box<dyn Any>) -> EventResult<()> {
        match payload.downcast::<E>() {
            Ok(event) => self.raise(*event),
            Err(_) => Err(EventError::PayloadTypeMismatch {
                expected: std::any::type_name::<E>(),
            }),
        }
    }
}
