//! Per-type subscriber lists and their type-erased table surface.

use std::any::Any;
use std::sync::Arc;

use crate::event::{Event, EventError, EventHandler, EventResult};

/// Handler registration id, assigned by the bus at subscribe time.
///
/// Removal matches on this id rather than on handler identity, so two
/// registrations of the same closure stay independently releasable.
pub(crate) type HandlerId = u64;

struct Slot<E: Event> {
    id: HandlerId,
    handler: Arc<dyn EventHandler<E>>,
}

/// Handlers registered for one event type, in insertion order.
///
/// Removal swaps the last live slot into the vacated position, so slot
/// order is not preserved after a removal. The list carries no lock of its
/// own: the dispatch table's shard lock covers mutation, and mutation only
/// happens on the dispatch thread.
pub(crate) struct SubscriberList<E: Event> {
    slots: Vec<Slot<E>>,
}

impl<E: Event> SubscriberList<E> {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Appends a handler under `id`.
    pub(crate) fn add(&mut self, id: HandlerId, handler: Arc<dyn EventHandler<E>>) {
        self.slots.push(Slot { id, handler });
    }

    /// Removes the slot registered under `id`; unknown ids are a no-op.
    pub(crate) fn remove(&mut self, id: HandlerId) {
        if let Some(index) = self.slots.iter().position(|slot| slot.id == id) {
            self.slots.swap_remove(index);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Clones out the current handlers, in slot order.
    ///
    /// Dispatch runs against this snapshot so no table lock is held while
    /// handlers execute and re-entrant subscribe/publish stays safe.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn EventHandler<E>>> {
        self.slots.iter().map(|slot| slot.handler.clone()).collect()
    }
}

/// Capability surface the dispatch table sees for one entry.
///
/// The table maps `TypeId` to this trait so it never needs to know the
/// concrete payload type; typed paths downcast through `as_any`.
pub(crate) trait AnySubscriberList: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Removes the slot registered under `id`; unknown ids are a no-op.
    fn remove(&mut self, id: HandlerId);

    fn len(&self) -> usize;

    fn event_type_name(&self) -> &'static str;

    /// Snapshot that can be invoked with a type-erased payload.
    fn snapshot_erased(&self) -> Box<dyn ErasedSnapshot>;
}

/// Handler snapshot dispatched outside the table locks.
pub(crate) trait ErasedSnapshot: Send {
    /// Invokes every handler with the downcast payload, stopping at the
    /// first handler error.
    fn invoke(&self, payload: &dyn Any) -> EventResult<()>;
}

impl<E: Event> AnySubscriberList for SubscriberList<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, id: HandlerId) {
        SubscriberList::remove(self, id);
    }

    fn len(&self) -> usize {
        SubscriberList::len(self)
    }

    fn event_type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn snapshot_erased(&self) -> Box<dyn ErasedSnapshot> {
        Box::new(Snapshot {
            handlers: self.snapshot(),
        })
    }
}

struct Snapshot<E: Event> {
    handlers: Vec<Arc<dyn EventHandler<E>>>,
}

impl<E: Event> ErasedSnapshot for Snapshot<E> {
    fn invoke(&self, payload: &dyn Any) -> EventResult<()> {
        let event = payload
            .downcast_ref::<E>()
            .ok_or(EventError::PayloadTypeMismatch {
                expected: std::any::type_name::<E>(),
            })?;
        for handler in &self.handlers {
            handler.handle(event)?;
        }
        Ok(())
    }
}
