//! Event bus implementation.

use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::envelope::{AnyEnvelope, DelayedEntry, EnvelopePool};
use crate::event::{Event, EventHandler, EventResult};
use crate::list::{AnySubscriberList, HandlerId, SubscriberList};
use crate::observer::{EventObserver, PublishRecord};

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Log subscribe/unsubscribe/drain activity through `tracing`
    pub enable_logging: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
        }
    }
}

struct Shared {
    /// Dispatch table: event type identity to its subscriber list.
    /// Mutated only by subscribe/unsubscribe on the dispatch thread.
    routes: DashMap<TypeId, Box<dyn AnySubscriberList>>,

    /// Per-type envelope pools, created lazily on first queued publish.
    pools: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,

    /// Ready-to-dispatch envelopes, pushed from any thread, popped only
    /// by the drain thread.
    immediate: SegQueue<Box<dyn AnyEnvelope>>,

    /// Envelopes awaiting a future tick before promotion.
    delayed: Mutex<Vec<DelayedEntry>>,

    /// Monotonic tick counter, advanced once per drain.
    tick: AtomicU64,

    next_handler_id: AtomicU64,

    observer: RwLock<Option<Arc<dyn EventObserver>>>,

    config: EventBusConfig,
}

impl Shared {
    fn unsubscribe(&self, type_id: TypeId, handler_id: HandlerId) {
        {
            let Some(mut list) = self.routes.get_mut(&type_id) else {
                return;
            };
            list.remove(handler_id);
        }
        // The list lives in the table only while non-empty.
        self.routes.remove_if(&type_id, |_, list| list.len() == 0);

        if self.config.enable_logging {
            debug!(handler_id, "released subscription");
        }
    }
}

/// Tick-driven in-process event bus.
///
/// Producers publish typed value payloads; consumers register per event
/// type and are invoked without mutual knowledge. Two delivery modes:
///
/// - [`publish`](EventBus::publish) delivers synchronously on the calling
///   thread. Dispatch-thread only, like `subscribe` and `drain`.
/// - [`publish_queued`](EventBus::publish_queued) /
///   [`publish_delayed`](EventBus::publish_delayed) are callable from any
///   thread; delivery happens on the dispatch thread during the next
///   [`drain`](EventBus::drain) at which the event is due.
///
/// Cloning is cheap and clones share all state. Both queues are unbounded:
/// a runaway producer can grow memory without limit.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    /// Creates a bus with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Creates a bus with a custom configuration.
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                routes: DashMap::new(),
                pools: DashMap::new(),
                immediate: SegQueue::new(),
                delayed: Mutex::new(Vec::new()),
                tick: AtomicU64::new(0),
                next_handler_id: AtomicU64::new(0),
                observer: RwLock::new(None),
                config,
            }),
        }
    }

    /// Creates an [`EventBusBuilder`].
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Process-wide default instance for ergonomic call sites.
    ///
    /// Prefer passing an explicitly constructed bus where practical; the
    /// default instance exists for code without access to one.
    pub fn global() -> &'static EventBus {
        static GLOBAL: OnceLock<EventBus> = OnceLock::new();
        GLOBAL.get_or_init(EventBus::new)
    }

    /// Subscribes a handler to events of type `E`.
    ///
    /// Lazily creates the type's subscriber list and returns a token bound
    /// to exactly this registration. Dropping or releasing the token
    /// removes the handler; [`SubscriptionToken::detach`] keeps it
    /// registered for the life of the bus.
    ///
    /// Must be called from the dispatch thread.
    pub fn subscribe<E, H>(&self, handler: H) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        let type_id = TypeId::of::<E>();
        let handler_id = self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut entry = self
                .shared
                .routes
                .entry(type_id)
                .or_insert_with(|| Box::new(SubscriberList::<E>::new()));
            entry
                .as_any_mut()
                .downcast_mut::<SubscriberList<E>>()
                .expect("subscriber list registered under its own TypeId")
                .add(handler_id, Arc::new(handler));
        }

        if self.shared.config.enable_logging {
            debug!(
                event = std::any::type_name::<E>(),
                handler_id, "subscribed handler"
            );
        }

        SubscriptionToken {
            shared: Arc::downgrade(&self.shared),
            type_id,
            handler_id,
            released: false,
        }
    }

    /// Publishes `event` immediately and synchronously on the calling
    /// thread.
    ///
    /// No registered subscribers is a no-op. Handlers run in current slot
    /// order against the registration snapshot taken at call time; the
    /// first handler error skips the remaining handlers of this call and
    /// propagates unmodified, so partial delivery is possible.
    ///
    /// Must be called from the dispatch thread.
    pub fn publish<E: Event>(&self, event: E) -> EventResult<()> {
        self.publish_with_source(event, None)
    }

    /// [`publish`](EventBus::publish) with a source identifier forwarded
    /// to the observer, used by named channels.
    pub fn publish_from<E: Event>(&self, event: E, source: &str) -> EventResult<()> {
        self.publish_with_source(event, Some(source))
    }

    fn publish_with_source<E: Event>(&self, event: E, source: Option<&str>) -> EventResult<()> {
        self.notify_observer(&event, source);

        let snapshot = match self.shared.routes.get(&TypeId::of::<E>()) {
            Some(list) => list
                .as_any()
                .downcast_ref::<SubscriberList<E>>()
                .expect("subscriber list registered under its own TypeId")
                .snapshot(),
            None => return Ok(()),
        };

        for handler in &snapshot {
            handler.handle(&event)?;
        }
        Ok(())
    }

    /// Immediate publish for call sites that only know the payload behind
    /// `&dyn Any`, such as named channels raising boxed payloads.
    ///
    /// Resolves back to the typed handlers registered under `type_id`. No
    /// list for `type_id` is a no-op; a payload whose concrete type does
    /// not match the list fails with
    /// [`EventError::PayloadTypeMismatch`](crate::EventError).
    pub fn publish_boxed(&self, type_id: TypeId, payload: &dyn Any) -> EventResult<()> {
        let snapshot = match self.shared.routes.get(&type_id) {
            Some(list) => list.snapshot_erased(),
            None => return Ok(()),
        };
        snapshot.invoke(payload)
    }

    /// Queues `payload` for delivery during the next [`drain`](EventBus::drain).
    ///
    /// Callable from any thread. The payload is stored by value in a
    /// pooled envelope; no allocation happens unless the type's free list
    /// is empty.
    pub fn publish_queued<E: Event>(&self, payload: E) {
        self.publish_delayed(payload, 0);
    }

    /// Queues `payload` for delivery once `delay_ticks` further drains
    /// have run.
    ///
    /// Callable from any thread. A delay of zero behaves exactly like
    /// [`publish_queued`](EventBus::publish_queued). Accepted events are
    /// never dropped and never delivered before their target tick.
    pub fn publish_delayed<E: Event>(&self, payload: E, delay_ticks: u64) {
        let envelope = self.pool::<E>().get(payload);
        if delay_ticks == 0 {
            self.shared.immediate.push(envelope);
        } else {
            let due_tick = self.shared.tick.load(Ordering::Acquire) + delay_ticks;
            self.shared
                .delayed
                .lock()
                .push(DelayedEntry { due_tick, envelope });
        }
    }

    /// Promotes due delayed events and drains the immediate queue.
    ///
    /// Call exactly once per tick, from a single designated thread. Due
    /// delayed entries are appended behind whatever is already queued, in
    /// their stored order, then the queue is popped until empty and each
    /// envelope dispatched through the immediate path and returned to its
    /// pool. A handler error propagates to the caller; the failing
    /// envelope is still returned to its pool and the remaining entries
    /// stay queued for the next drain. The tick counter advances either
    /// way.
    pub fn drain(&self) -> EventResult<()> {
        let tick = self.shared.tick.load(Ordering::Acquire);

        {
            let mut delayed = self.shared.delayed.lock();
            let mut index = 0;
            while index < delayed.len() {
                if delayed[index].due_tick <= tick {
                    let entry = delayed.remove(index);
                    self.shared.immediate.push(entry.envelope);
                } else {
                    index += 1;
                }
            }
        }

        let mut result = Ok(());
        let mut dispatched = 0usize;
        while let Some(mut envelope) = self.shared.immediate.pop() {
            let outcome = envelope.dispatch(self);
            envelope.release();
            dispatched += 1;
            if outcome.is_err() {
                result = outcome;
                break;
            }
        }

        if self.shared.config.enable_logging && dispatched > 0 {
            debug!(tick, dispatched, "drained queued events");
        }

        self.shared.tick.fetch_add(1, Ordering::Release);
        result
    }

    /// Installs the observer notified for every immediate publish.
    pub fn set_observer(&self, observer: Arc<dyn EventObserver>) {
        *self.shared.observer.write() = Some(observer);
    }

    /// Removes the installed observer, if any.
    pub fn clear_observer(&self) {
        *self.shared.observer.write() = None;
    }

    /// Number of handlers currently registered for `E`.
    pub fn handler_count<E: Event>(&self) -> usize {
        self.shared
            .routes
            .get(&TypeId::of::<E>())
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Currently registered event types with their handler counts.
    pub fn registered_events(&self) -> Vec<(&'static str, usize)> {
        self.shared
            .routes
            .iter()
            .map(|entry| (entry.event_type_name(), entry.len()))
            .collect()
    }

    /// Envelopes sitting in the immediate queue.
    pub fn queued_len(&self) -> usize {
        self.shared.immediate.len()
    }

    /// Envelopes parked in the delayed schedule.
    pub fn delayed_len(&self) -> usize {
        self.shared.delayed.lock().len()
    }

    /// Current tick counter value. Ticks advance only via
    /// [`drain`](EventBus::drain); the first drain runs at tick 0.
    pub fn current_tick(&self) -> u64 {
        self.shared.tick.load(Ordering::Acquire)
    }

    fn pool<E: Event>(&self) -> Arc<EnvelopePool<E>> {
        let entry = self
            .shared
            .pools
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::new(EnvelopePool::<E>::new()));
        match entry.value().clone().downcast::<EnvelopePool<E>>() {
            Ok(pool) => pool,
            Err(_) => unreachable!("envelope pool registered under its own TypeId"),
        }
    }

    /// Observer failures are fire-and-forget: a panicking observer is
    /// logged and dispatch proceeds untouched.
    fn notify_observer<E: Event>(&self, event: &E, source: Option<&str>) {
        let observer = self.shared.observer.read().clone();
        let Some(observer) = observer else {
            return;
        };
        let record = PublishRecord {
            event_type: std::any::type_name::<E>(),
            payload: event,
            source,
            tick: self.shared.tick.load(Ordering::Acquire),
        };
        let notify = AssertUnwindSafe(|| observer.on_publish(&record));
        if panic::catch_unwind(notify).is_err() {
            warn!(event = record.event_type, "event observer panicked");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registration; releasing it removes exactly that handler.
///
/// Release is idempotent and dropping the token releases it, so a token
/// held in a struct unsubscribes when its owner goes away. Call
/// [`detach`](SubscriptionToken::detach) for registrations that should
/// outlive the token.
#[must_use = "dropping the token releases the subscription"]
pub struct SubscriptionToken {
    shared: Weak<Shared>,
    type_id: TypeId,
    handler_id: HandlerId,
    released: bool,
}

impl SubscriptionToken {
    /// Removes the registration. Safe to call more than once; only the
    /// first call has an effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.type_id, self.handler_id);
        }
    }

    /// Consumes the token without releasing the registration.
    pub fn detach(mut self) {
        self.released = true;
    }

    /// Whether this token has already been released.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        self.release();
    }
}

/// Event bus builder.
pub struct EventBusBuilder {
    config: EventBusConfig,
    observer: Option<Arc<dyn EventObserver>>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
            observer: None,
        }
    }

    /// Enable/disable `tracing` output.
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Install an observer notified for every immediate publish.
    pub fn observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the event bus.
    pub fn build(self) -> EventBus {
        let bus = EventBus::with_config(self.config);
        if let Some(observer) = self.observer {
            bus.set_observer(observer);
        }
        bus
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
