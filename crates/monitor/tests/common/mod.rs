#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netwatch_core::models::{NewTarget, Target, TargetUpdate};
use netwatch_db::memory::{MemoryProbeResultRepository, MemoryTargetRepository};
use netwatch_db::repositories::TargetRepository;
use netwatch_db::RepoError;
use netwatch_events::{Event, EventBus, EventKind};
use netwatch_monitor::probe::{Download, ProbeError, ProbeTransport};
use netwatch_monitor::{Clock, ManualClock, MonitorService, ProbeConfig, ProbeRunner};
use serde_json::Value;
use tokio::sync::broadcast;

/// Answers every probe instantly with a 1 MB body and records the URLs it
/// was asked to download. With `failing` set, every ping gets a 503.
#[derive(Default)]
pub struct StubTransport {
    pub downloads: Mutex<Vec<String>>,
    pub failing: AtomicBool,
}

impl StubTransport {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProbeTransport for StubTransport {
    async fn head(&self, _url: &str) -> Result<(), ProbeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProbeError::HttpStatus(503));
        }
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<Download, ProbeError> {
        self.downloads.lock().unwrap().push(url.to_string());
        Ok(Download::Buffered(vec![0; 1_000_000]))
    }
}

/// A target store whose backing database is down.
pub struct OfflineTargets;

fn offline() -> RepoError {
    RepoError::Unavailable("database offline".to_string())
}

#[async_trait]
impl TargetRepository for OfflineTargets {
    async fn find_by_id(&self, _id: &str) -> Result<Option<Target>, RepoError> {
        Err(offline())
    }

    async fn find_by_owner_id(&self, _owner_id: &str) -> Result<Vec<Target>, RepoError> {
        Err(offline())
    }

    async fn list_all(&self) -> Result<Vec<Target>, RepoError> {
        Err(offline())
    }

    async fn create(&self, _data: &NewTarget) -> Result<Target, RepoError> {
        Err(offline())
    }

    async fn update(&self, _id: &str, _data: &TargetUpdate) -> Result<Target, RepoError> {
        Err(offline())
    }

    async fn delete(&self, _id: &str) -> Result<(), RepoError> {
        Err(offline())
    }
}

pub struct Harness {
    pub bus: Arc<EventBus>,
    pub targets: Arc<MemoryTargetRepository>,
    pub results: Arc<MemoryProbeResultRepository>,
    pub transport: Arc<StubTransport>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<MonitorService>,
}

/// Service over in-memory stores, driven by a manual clock, with its bus
/// handlers registered.
pub fn harness() -> Harness {
    let targets = Arc::new(MemoryTargetRepository::new());
    let clock = Arc::new(ManualClock::new());
    build(targets.clone(), targets, clock.clone() as Arc<dyn Clock>, clock)
}

/// Same as [`harness`] but with the given target store and clock.
pub fn harness_with(targets: Arc<dyn TargetRepository>, clock: Arc<dyn Clock>) -> Harness {
    build(
        targets,
        Arc::new(MemoryTargetRepository::new()),
        clock,
        Arc::new(ManualClock::new()),
    )
}

fn build(
    targets: Arc<dyn TargetRepository>,
    memory_targets: Arc<MemoryTargetRepository>,
    clock: Arc<dyn Clock>,
    manual: Arc<ManualClock>,
) -> Harness {
    let bus = Arc::new(EventBus::default());
    let results = Arc::new(MemoryProbeResultRepository::new());
    let transport = Arc::new(StubTransport::default());
    let runner = ProbeRunner::new(transport.clone(), ProbeConfig::default());

    let service = Arc::new(MonitorService::new(
        targets,
        results.clone(),
        runner,
        clock,
        bus.clone(),
    ));
    service.register_handlers();

    Harness {
        bus,
        targets: memory_targets,
        results,
        transport,
        clock: manual,
        service,
    }
}

pub fn target(id: &str) -> Target {
    Target {
        id: id.to_string(),
        name: format!("Target {id}"),
        address: "https://example.com".to_string(),
        owner_id: "u1".to_string(),
    }
}

pub fn new_target(name: &str) -> NewTarget {
    NewTarget {
        name: name.to_string(),
        address: "https://example.com".to_string(),
        owner_id: "u1".to_string(),
    }
}

/// Wait (up to five seconds) for the next event of `kind` on the tap.
pub async fn next_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event tap closed");
            if event.kind() == kind {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind} event"))
}

/// Collect every payload emitted on a string channel.
pub fn capture(bus: &EventBus, channel: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.on_dynamic(channel, move |payload| {
        sink.lock().unwrap().push(payload.clone());
        Ok(())
    });
    seen
}

/// Poll `condition` until it holds, failing after five seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
