//! Event and handler definitions.

use std::fmt::Debug;

use thiserror::Error;

/// Result type for bus operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors surfaced by dispatch.
#[derive(Debug, Error)]
pub enum EventError {
    /// A handler reported a failure; remaining handlers of that dispatch
    /// pass are skipped and the error propagates to whoever triggered it
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A type-erased publish carried a payload of a different concrete
    /// type than the one the subscriber list was registered under
    #[error("Payload type mismatch: expected {expected}")]
    PayloadTypeMismatch {
        /// Type name the subscriber list was registered under
        expected: &'static str,
    },
}

/// Capability marker for event payloads.
///
/// Events are value-semantic payloads routed by their `TypeId`. The set of
/// event types is open; any `Send + Debug + 'static` type can opt in:
///
/// ```rust,ignore
/// #[derive(Debug)]
/// struct PlayerSpawned {
///     id: u32,
/// }
///
/// impl Event for PlayerSpawned {}
/// ```
///
/// The `Debug` bound feeds the observer surface; queued delivery moves the
/// payload across threads, hence `Send`.
pub trait Event: Send + Debug + 'static {}

/// Handler invoked for every delivered payload of its event type.
///
/// Plain `Fn(&E)` closures implement this trait as infallible handlers, so
/// most call sites never name it:
///
/// ```rust,ignore
/// let token = bus.subscribe(|event: &PlayerSpawned| {
///     println!("spawned {}", event.id);
/// });
/// ```
///
/// Implement it directly when a handler can fail; the first error aborts
/// the remaining handlers of the same dispatch pass.
pub trait EventHandler<E: Event>: Send + Sync {
    /// Handle one delivered payload.
    fn handle(&self, event: &E) -> EventResult<()>;
}

impl<E, F> EventHandler<E> for F
where
    E: Event,
    F: Fn(&E) + Send + Sync,
{
    fn handle(&self, event: &E) -> EventResult<()> {
        self(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Ping(u64);

    impl Event for Ping {}

    #[test]
    fn test_closure_is_infallible_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handler = move |event: &Ping| {
            c.fetch_add(event.0 as usize, Ordering::SeqCst);
        };

        assert!(handler.handle(&Ping(3)).is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_error_display() {
        let err = EventError::Handler("db offline".to_string());
        assert_eq!(err.to_string(), "Handler failed: db offline");

        let err = EventError::PayloadTypeMismatch { expected: "Ping" };
        assert_eq!(err.to_string(), "Payload type mismatch: expected Ping");
    }
}
