//! In-process event bus.
//!
//! [`EventBus`] routes [`Event`]s to handlers registered per [`EventKind`],
//! and JSON payloads to handlers registered under runtime string names.
//! Dispatch is synchronous and follows registration order. Each handler call
//! is isolated: an error or panic is handed to the bus's [`FaultReporter`]
//! and dispatch moves on to the next handler. Nothing propagates back to the
//! emitter.
//!
//! Handlers that need async work spawn a task and return immediately.
//!
//! A `tokio::sync::broadcast` tap ([`EventBus::subscribe`]) additionally sees
//! every typed event after its handlers ran.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::event::{Event, EventKind};
use crate::fault::{FaultCause, FaultReporter, HandlerFault, TracingFaultReporter};

/// What a handler returns; an `Err` is reported, never propagated.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type TypedHandler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;
type DynamicHandler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

pub(crate) type PendingReply = oneshot::Sender<Result<Value, String>>;

/// Identifies one registration, for [`EventBus::off`] / [`EventBus::off_dynamic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Registry<K, H> {
    handlers: RwLock<HashMap<K, Vec<(HandlerId, H)>>>,
}

impl<K: Eq + Hash, H: Clone> Registry<K, H> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, key: K, id: HandlerId, handler: H) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push((id, handler));
    }

    fn remove<Q>(&self, key: &Q, id: HandlerId) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(key);
        }
        removed
    }

    /// Clone the handler list so dispatch runs without holding the lock.
    fn snapshot<Q>(&self, key: &Q) -> Vec<(HandlerId, H)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast tap.
const DEFAULT_CAPACITY: usize = 1024;

/// Publish/subscribe hub shared as `Arc<EventBus>` by every service.
pub struct EventBus {
    typed: Registry<EventKind, TypedHandler>,
    dynamic: Registry<String, DynamicHandler>,
    next_id: AtomicU64,
    faults: Arc<dyn FaultReporter>,
    sender: broadcast::Sender<Event>,
    pub(crate) pending: Mutex<HashMap<String, PendingReply>>,
}

impl EventBus {
    /// Create a bus whose broadcast tap buffers `capacity` events.
    ///
    /// Slow tap receivers observe `RecvError::Lagged`; handler dispatch is
    /// unaffected.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            typed: Registry::new(),
            dynamic: Registry::new(),
            next_id: AtomicU64::new(1),
            faults: Arc::new(TracingFaultReporter),
            sender,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default [`TracingFaultReporter`].
    pub fn with_fault_reporter(mut self, reporter: Arc<dyn FaultReporter>) -> Self {
        self.faults = reporter;
        self
    }

    fn next_handler_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        self.typed.insert(kind, id, Arc::new(handler));
        id
    }

    /// Register an async handler: each event is handed to `handle` on a new
    /// tokio task together with a strong reference to `owner`.
    ///
    /// Once `owner` is dropped the handler ignores events. Emitting outside
    /// a tokio runtime is reported as a handler fault.
    pub fn on_spawn<S, F, Fut>(&self, kind: EventKind, owner: Weak<S>, handle: F) -> HandlerId
    where
        S: Send + Sync + 'static,
        F: Fn(Arc<S>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(kind, move |event| {
            let Some(owner) = owner.upgrade() else {
                return Ok(());
            };
            let runtime = tokio::runtime::Handle::try_current()?;
            runtime.spawn(handle(owner, event.clone()));
            Ok(())
        })
    }

    /// Remove a registration. Unknown ids are ignored.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.typed.remove(&kind, id)
    }

    /// Register a handler under a runtime name.
    ///
    /// Names matching a catalogue kind (`"TARGET_CREATED"`) also receive the
    /// JSON payload of every typed emit of that kind.
    pub fn on_dynamic<F>(&self, name: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        self.dynamic.insert(name.into(), id, Arc::new(handler));
        id
    }

    /// Remove a string-keyed registration. Unknown ids are ignored.
    pub fn off_dynamic(&self, name: &str, id: HandlerId) -> bool {
        self.dynamic.remove(name, id)
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.typed.count(&kind)
    }

    pub fn dynamic_handler_count(&self, name: &str) -> usize {
        self.dynamic.count(name)
    }

    /// Dispatch a typed event to its handlers, then to string handlers
    /// registered under its wire name, then to the broadcast tap.
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        tracing::debug!(event = %kind, "Dispatching event");

        for (id, handler) in self.typed.snapshot(&kind) {
            self.invoke(kind.as_str(), id, || handler(&event));
        }

        let dynamic = self.dynamic.snapshot(kind.as_str());
        if !dynamic.is_empty() {
            match event.payload_json() {
                Ok(payload) => self.dispatch_dynamic(kind.as_str(), dynamic, &payload),
                Err(e) => {
                    tracing::error!(event = %kind, error = %e, "Failed to serialize event payload");
                }
            }
        }

        // A send error only means there are no tap receivers.
        let _ = self.sender.send(event);
    }

    /// Dispatch a JSON payload to the handlers registered under `name`.
    pub fn emit_dynamic(&self, name: &str, payload: Value) {
        let handlers = self.dynamic.snapshot(name);
        if handlers.is_empty() {
            tracing::trace!(event = %name, "No handlers for dynamic event");
            return;
        }
        self.dispatch_dynamic(name, handlers, &payload);
    }

    /// Receive every typed event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn dispatch_dynamic(&self, name: &str, handlers: Vec<(HandlerId, DynamicHandler)>, payload: &Value) {
        for (id, handler) in handlers {
            self.invoke(name, id, || handler(payload));
        }
    }

    /// Run one handler inside the error boundary.
    fn invoke(&self, event: &str, id: HandlerId, call: impl FnOnce() -> HandlerResult) {
        let cause = match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => FaultCause::Error(e.to_string()),
            Err(payload) => FaultCause::from_panic(payload),
        };
        self.faults.report(&HandlerFault {
            event: event.to_string(),
            handler: id,
            cause,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("tap_receivers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TargetDeleted;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingReporter(Mutex<Vec<HandlerFault>>);

    impl FaultReporter for RecordingReporter {
        fn report(&self, fault: &HandlerFault) {
            self.0.lock().unwrap().push(fault.clone());
        }
    }

    fn deleted(id: &str) -> Event {
        Event::TargetDeleted(TargetDeleted { id: id.to_string() })
    }

    fn recording_bus() -> (EventBus, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let bus = EventBus::default().with_fault_reporter(reporter.clone());
        (bus, reporter)
    }

    #[tokio::test]
    async fn spawned_handler_runs_while_owner_lives() {
        let bus = EventBus::default();
        let owner = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        bus.on_spawn(EventKind::TargetDeleted, Arc::downgrade(&owner), move |owner, event| {
            let tx = tx.clone();
            async move {
                owner.lock().unwrap().push(event.kind());
                let _ = tx.send(());
            }
        });

        bus.emit(deleted("t1"));
        rx.recv().await.unwrap();
        assert_eq!(*owner.lock().unwrap(), vec![EventKind::TargetDeleted]);

        drop(owner);
        bus.emit(deleted("t2"));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn spawned_handler_outside_runtime_is_a_fault() {
        let (bus, reporter) = recording_bus();
        let owner = Arc::new(());
        bus.on_spawn(EventKind::TargetDeleted, Arc::downgrade(&owner), |_, _| async {});

        bus.emit(deleted("t1"));

        let faults = reporter.0.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0].cause, FaultCause::Error(_)));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::default();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for n in 1..=3 {
            let calls = calls.clone();
            bus.on(EventKind::TargetDeleted, move |_| {
                calls.lock().unwrap().push(n);
                Ok(())
            });
        }

        bus.emit(deleted("t1"));
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failing_handler_does_not_stop_dispatch() {
        let (bus, reporter) = recording_bus();
        let reached = Arc::new(Mutex::new(false));

        let failing = bus.on(EventKind::TargetDeleted, |_| Err("repository down".into()));
        let flag = reached.clone();
        bus.on(EventKind::TargetDeleted, move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        bus.emit(deleted("t1"));

        assert!(*reached.lock().unwrap());
        let faults = reporter.0.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].event, "TARGET_DELETED");
        assert_eq!(faults[0].handler, failing);
        assert_eq!(faults[0].cause, FaultCause::Error("repository down".to_string()));
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let (bus, reporter) = recording_bus();
        let reached = Arc::new(Mutex::new(0));

        bus.on(EventKind::TargetDeleted, |_| panic!("handler bug"));
        let count = reached.clone();
        bus.on(EventKind::TargetDeleted, move |_| {
            *count.lock().unwrap() += 1;
            Ok(())
        });

        bus.emit(deleted("t1"));
        bus.emit(deleted("t2"));

        assert_eq!(*reached.lock().unwrap(), 2);
        let faults = reporter.0.lock().unwrap();
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].cause, FaultCause::Panic("handler bug".to_string()));
    }

    #[test]
    fn off_removes_only_that_handler() {
        let bus = EventBus::default();
        let first = bus.on(EventKind::TargetDeleted, |_| Ok(()));
        bus.on(EventKind::TargetDeleted, |_| Ok(()));

        assert!(bus.off(EventKind::TargetDeleted, first));
        assert_eq!(bus.handler_count(EventKind::TargetDeleted), 1);
    }

    #[test]
    fn off_unknown_handler_is_noop() {
        let bus = EventBus::default();
        let id = bus.on(EventKind::TargetCreated, |_| Ok(()));

        assert!(!bus.off(EventKind::TargetDeleted, id));
        assert!(!bus.off_dynamic("NOPE", id));
        assert_eq!(bus.handler_count(EventKind::TargetCreated), 1);
    }

    #[test]
    fn registration_during_dispatch_applies_to_next_emit() {
        let bus = Arc::new(EventBus::default());
        let late_calls = Arc::new(Mutex::new(0));

        let inner_bus = bus.clone();
        let counter = late_calls.clone();
        bus.on(EventKind::TargetDeleted, move |_| {
            let counter = counter.clone();
            inner_bus.on(EventKind::TargetDeleted, move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            });
            Ok(())
        });

        bus.emit(deleted("t1"));
        assert_eq!(*late_calls.lock().unwrap(), 0);

        bus.emit(deleted("t2"));
        assert_eq!(*late_calls.lock().unwrap(), 1);
    }

    #[test]
    fn dynamic_handlers_see_catalogue_events_as_json() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on_dynamic("TARGET_DELETED", move |payload| {
            sink.lock().unwrap().push(payload.clone());
            Ok(())
        });

        bus.emit(deleted("t9"));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"id": "t9"})]);
    }

    #[test]
    fn emit_dynamic_reaches_only_matching_name() {
        let (bus, reporter) = recording_bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = bus.on_dynamic("TARGET_CREATED_r1", move |payload| {
            sink.lock().unwrap().push(payload.clone());
            Ok(())
        });
        bus.on_dynamic("TARGET_CREATED_r2", |_| Err("wrong channel".into()));

        bus.emit_dynamic("TARGET_CREATED_r1", json!({"id": "t1"}));
        bus.emit_dynamic("UNHEARD", json!(null));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(reporter.0.lock().unwrap().is_empty());

        assert!(bus.off_dynamic("TARGET_CREATED_r1", id));
        assert_eq!(bus.dynamic_handler_count("TARGET_CREATED_r1"), 0);
    }

    #[tokio::test]
    async fn broadcast_tap_receives_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(deleted("t1"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), EventKind::TargetDeleted);
    }

    #[test]
    fn emit_without_any_subscriber_is_fine() {
        let bus = EventBus::default();
        bus.emit(deleted("t1"));
        bus.emit_dynamic("ANYTHING", json!({}));
    }
}
