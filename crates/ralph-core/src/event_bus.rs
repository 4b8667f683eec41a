use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use ralph_types::EngineEvent;

/// A registered synchronous handler. Boxed so `On`/`OnAll` can each hold a
/// heterogeneous list (spec.md §4.1).
type Handler = Box<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    by_kind: HashMap<&'static str, Vec<Handler>>,
    wildcard: Vec<Handler>,
}

/// Typed publish/subscribe channel shared by every core component
/// (spec.md §4.1, §9 "make the Event Bus the only coupling point").
///
/// Two delivery paths, both grounded on the teacher's
/// `tandem-core/src/event_bus.rs` broadcast wrapper:
/// - `subscribe()` hands out a `broadcast::Receiver` for async consumers
///   (the UI, or any component that wants to `.await` on events) — FIFO
///   per subscriber, matching spec.md §8 property 5.
/// - `on`/`on_all`/`emit`/`remove_all` is a synchronous, in-process
///   dispatcher for components that must react to an event before the
///   `Emit` call returns (e.g. the Quota Manager reacting to its own
///   `quota-update`), matching the literal operations spec.md §4.1 names.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    handlers: Arc<Mutex<Handlers>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self {
            tx,
            handlers: Arc::new(Mutex::new(Handlers::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Registers a handler invoked synchronously for events whose `kind()`
    /// matches `kind`, in registration order.
    pub fn on(&self, kind: &'static str, handler: impl Fn(&EngineEvent) + Send + Sync + 'static) {
        self.handlers
            .lock()
            .expect("event bus handler lock poisoned")
            .by_kind
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    /// Registers a handler invoked synchronously for every event kind.
    pub fn on_all(&self, handler: impl Fn(&EngineEvent) + Send + Sync + 'static) {
        self.handlers
            .lock()
            .expect("event bus handler lock poisoned")
            .wildcard
            .push(Box::new(handler));
    }

    /// Drops every registered synchronous handler. Broadcast subscribers
    /// created via [`Self::subscribe`] are unaffected.
    pub fn remove_all(&self) {
        let mut handlers = self.handlers.lock().expect("event bus handler lock poisoned");
        handlers.by_kind.clear();
        handlers.wildcard.clear();
    }

    /// Publishes `event`: first runs synchronous handlers (per-kind, then
    /// wildcard, each in registration order), then broadcasts to async
    /// subscribers. Handlers must not block (spec.md §4.1).
    pub fn emit(&self, event: EngineEvent) {
        {
            let handlers = self.handlers.lock().expect("event bus handler lock poisoned");
            if let Some(list) = handlers.by_kind.get(event.kind()) {
                for handler in list {
                    handler(&event);
                }
            }
            for handler in &handlers.wildcard {
                handler(&event);
            }
        }
        let _ = self.tx.send(event);
    }

    /// Alias for [`Self::emit`], matching the teacher's naming.
    pub fn publish(&self, event: EngineEvent) {
        self.emit(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
