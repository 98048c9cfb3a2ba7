//! In-process event bus.
//!
//! Event types are declared on an [`EventRegistry`] during setup, optionally
//! as a subtype of a previously declared parent event. Listeners subscribe
//! per event type. Publication is sequential: listeners for the exact event
//! run first in registration order, then each ancestor's listeners receive
//! the event converted to their own type.
//!
//! # Example
//!
//! ```rust
//! use daedalus_core::bus::EventRegistry;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct UserCreated { name: String }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let seen = Arc::new(AtomicUsize::new(0));
//! let mut registry = EventRegistry::new();
//! registry.declare::<UserCreated>();
//! let counter = Arc::clone(&seen);
//! registry.listen::<UserCreated, _, _>(move |_event| {
//!     let counter = Arc::clone(&counter);
//!     async move { counter.fetch_add(1, Ordering::SeqCst); }
//! });
//!
//! let bus = registry.freeze().bus();
//! bus.publish(UserCreated { name: "a".into() }).await;
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! # });
//! ```

use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A type-erased event payload.
pub type EventPayload = Arc<dyn Any + Send + Sync>;

type Listener = Arc<dyn Fn(EventPayload) -> BoxFuture<'static, ()> + Send + Sync>;
type Converter = Arc<dyn Fn(&EventPayload) -> Option<EventPayload> + Send + Sync>;

/// Setup-time registry of event types and listeners.
///
/// Frozen into a [`BusTerminal`] at application setup; no declarations are
/// possible afterwards.
#[derive(Clone, Default)]
pub struct EventRegistry {
    names: HashMap<TypeId, &'static str>,
    parents: HashMap<TypeId, (TypeId, Converter)>,
    listeners: HashMap<TypeId, Vec<Listener>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an event type. Idempotent.
    pub fn declare<E: Send + Sync + 'static>(&mut self) {
        self.names
            .entry(TypeId::of::<E>())
            .or_insert_with(std::any::type_name::<E>);
    }

    /// Declares `E` as a subtype of the parent event `P`.
    ///
    /// When an `E` is published, listeners for `P` receive the event
    /// converted through `Into<P>`.
    pub fn declare_sub<E, P>(&mut self)
    where
        E: Clone + Into<P> + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        self.declare::<E>();
        self.declare::<P>();
        let converter: Converter = Arc::new(|payload: &EventPayload| {
            payload
                .downcast_ref::<E>()
                .map(|event| Arc::new(event.clone().into()) as EventPayload)
        });
        self.parents
            .insert(TypeId::of::<E>(), (TypeId::of::<P>(), converter));
    }

    /// Subscribes a listener for an event type.
    ///
    /// Listeners for one event run sequentially in registration order.
    pub fn listen<E, F, Fut>(&mut self, listener: F)
    where
        E: Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.declare::<E>();
        let erased: Listener = Arc::new(move |payload: EventPayload| {
            match payload.downcast::<E>() {
                Ok(event) => Box::pin(listener(event)),
                Err(_) => Box::pin(async {}),
            }
        });
        self.listeners
            .entry(TypeId::of::<E>())
            .or_default()
            .push(erased);
    }

    /// Freezes the registry into a shareable terminal.
    #[must_use]
    pub fn freeze(self) -> BusTerminal {
        BusTerminal {
            inner: Arc::new(self),
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.names.len())
            .field("listeners", &self.listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

/// The frozen, process-wide bus state.
///
/// Cheap to clone; hands out per-request [`EventBus`] handles.
#[derive(Clone, Debug)]
pub struct BusTerminal {
    inner: Arc<EventRegistry>,
}

impl BusTerminal {
    /// Creates a terminal with no declared events.
    #[must_use]
    pub fn empty() -> Self {
        EventRegistry::new().freeze()
    }

    /// Creates a bus handle for one request.
    #[must_use]
    pub fn bus(&self) -> EventBus {
        EventBus {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A publish handle injectable into handlers.
#[derive(Clone, Debug)]
pub struct EventBus {
    inner: Arc<EventRegistry>,
}

impl EventBus {
    /// Publishes an event.
    ///
    /// Listeners for the exact type run first in registration order; the
    /// event then walks its declared parent chain, with each ancestor's
    /// listeners receiving the converted event. The call returns once
    /// every listener has run.
    pub async fn publish<E: Send + Sync + 'static>(&self, event: E) {
        let mut payload: EventPayload = Arc::new(event);
        let mut current = TypeId::of::<E>();
        loop {
            if let Some(listeners) = self.inner.listeners.get(&current) {
                for listener in listeners {
                    listener(Arc::clone(&payload)).await;
                }
            }
            match self.inner.parents.get(&current) {
                Some((parent, convert)) => {
                    let Some(converted) = convert(&payload) else {
                        break;
                    };
                    payload = converted;
                    current = *parent;
                }
                None => break,
            }
        }
    }
}
