//! Tick-driven in-process event bus.
//!
//! This crate provides typed publish/subscribe routing for interactive,
//! tick-driven applications: producers publish value payloads, independent
//! consumers register per event type, and neither knows about the other.
//!
//! ## Features
//!
//! - **Typed routing** - events dispatch by `TypeId`; the set of event
//!   types is open
//! - **Immediate publish** - synchronous delivery on the dispatch thread
//! - **Queued publish** - thread-safe enqueue, delivered by the per-tick
//!   drain
//! - **Tick delays** - park an event until the n-th future drain
//! - **Envelope pooling** - queued payloads reuse a per-type free list, so
//!   steady-state queued publishing does not allocate
//! - **Inspection** - observer hook plus a bounded publish history
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickbus::{Event, EventBus};
//!
//! #[derive(Debug)]
//! struct PlayerSpawned {
//!     id: u32,
//! }
//!
//! impl Event for PlayerSpawned {}
//!
//! let bus = EventBus::new();
//!
//! // Subscribe; the token releases the registration on drop.
//! let token = bus.subscribe(|event: &PlayerSpawned| {
//!     println!("spawned {}", event.id);
//! });
//!
//! // Immediate, synchronous delivery on this thread.
//! bus.publish(PlayerSpawned { id: 7 })?;
//! ```
//!
//! ## Queued & Delayed Delivery
//!
//! `publish_queued` is the only entry point callable from any thread.
//! Delivery happens on the dispatch thread during `drain`, which the
//! application calls exactly once per tick:
//!
//! ```rust,ignore
//! // From a worker thread:
//! bus.publish_queued(ChunkLoaded { x, z });
//!
//! // Two ticks from now:
//! bus.publish_delayed(RespawnPlayer { id: 7 }, 2);
//!
//! // Once per tick, on the dispatch thread:
//! bus.drain()?;
//! ```
//!
//! ## Drain Driver
//!
//! [`TickDriver`] owns the drain cadence when the application does not
//! have its own update loop:
//!
//! ```rust,ignore
//! let handle = TickDriver::new(bus.clone()).spawn(Duration::from_millis(16));
//! // ...
//! handle.stop();
//! ```
//!
//! ## Channels
//!
//! [`EventChannel`] names one event type, keeps its own listener list and
//! optionally forwards raised payloads into the bus:
//!
//! ```rust,ignore
//! let clicked = EventChannel::with_bus("ui.clicked", bus.clone());
//! clicked.register(|event: &Clicked| { /* local listener */ });
//! clicked.raise(Clicked { x: 3, y: 4 })?;
//! ```
//!
//! ## Threading model
//!
//! One designated dispatch thread owns `subscribe`, token release,
//! `publish`, and `drain`. Any thread may call `publish_queued` /
//! `publish_delayed`. Within one event type, immediate publish reflects
//! the registration snapshot at call time, and queued delivery is FIFO
//! among entries that become ready in the same drain.

pub mod bus;
pub mod channel;
pub mod driver;
pub mod event;
pub mod observer;

mod envelope;
mod list;

pub use bus::{EventBus, EventBusBuilder, EventBusConfig, SubscriptionToken};
pub use channel::EventChannel;
pub use driver::{DriverHandle, TickDriver};
pub use event::{Event, EventError, EventHandler, EventResult};
pub use observer::{EventObserver, EventRecorder, PublishRecord, RecordedEvent};
