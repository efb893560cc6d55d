//! Request/reply over the bus.
//!
//! A caller emits a `*_REQUESTED` event carrying a fresh request id and
//! waits for the owning service to call [`EventBus::respond`] with that id.
//! The reply resolves the caller's pending future directly; it is also
//! emitted on the string channel `<REPLY_NAME>_<requestId>` for handlers
//! registered with [`EventBus::on_dynamic`].

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::event::{Event, EventKind};

/// How long [`EventBus::request`] callers usually wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome a service reports for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Completed { event: EventKind, payload: Value },
    Failed { event: EventKind, error: String },
}

impl Reply {
    pub fn completed(event: EventKind, payload: Value) -> Self {
        Self::Completed { event, payload }
    }

    pub fn failed(event: EventKind, error: impl std::fmt::Display) -> Self {
        Self::Failed {
            event,
            error: error.to_string(),
        }
    }

    /// Reply `completed` with the serialized value, or `failed` with the
    /// error message.
    pub fn from_result<T, E>(completed: EventKind, failed: EventKind, result: Result<T, E>) -> Self
    where
        T: serde::Serialize,
        E: std::fmt::Display,
    {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(payload) => Self::completed(completed, payload),
                Err(e) => Self::failed(failed, e),
            },
            Err(e) => Self::failed(failed, e),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    /// The service replied with a failure.
    #[error("{0}")]
    Failed(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The pending request was abandoned before any reply.
    #[error("request dropped without a reply")]
    Dropped,
}

/// Name of the per-request reply channel, e.g. `TARGET_CREATE_FAILED_r1`.
pub fn reply_channel(event: EventKind, request_id: &str) -> String {
    format!("{}_{request_id}", event.as_str())
}

impl EventBus {
    /// Emit the event built from a fresh request id and wait for its reply.
    ///
    /// The pending entry lives only as long as this future: a timeout or a
    /// caller that stops polling removes it, so a late reply is only seen by
    /// string handlers.
    pub async fn request<F>(&self, timeout: Duration, build: F) -> Result<Value, RequestError>
    where
        F: FnOnce(String) -> Event,
    {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(request_id.clone(), tx);
        let _pending = PendingGuard {
            bus: self,
            request_id: &request_id,
        };

        self.emit(build(request_id.clone()));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(payload))) => Ok(payload),
            Ok(Ok(Err(error))) => Err(RequestError::Failed(error)),
            Ok(Err(_)) => Err(RequestError::Dropped),
            Err(_) => {
                tracing::warn!(request_id = %request_id, ?timeout, "Request timed out");
                Err(RequestError::Timeout(timeout))
            }
        }
    }

    /// Deliver the reply for `request_id`.
    ///
    /// Failures are emitted on the reply channel as `{"error": message}`.
    pub fn respond(&self, request_id: &str, reply: Reply) {
        let (channel, payload, outcome) = match reply {
            Reply::Completed { event, payload } => {
                (reply_channel(event, request_id), payload.clone(), Ok(payload))
            }
            Reply::Failed { event, error } => (
                reply_channel(event, request_id),
                json!({ "error": error }),
                Err(error),
            ),
        };

        if let Some(waiter) = self.pending_map().remove(request_id) {
            // The receiver is gone if the caller stopped waiting.
            let _ = waiter.send(outcome);
        }
        self.emit_dynamic(&channel, payload);
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending_map().len()
    }

    /// Drop every pending request; waiters observe [`RequestError::Dropped`].
    pub fn abandon_pending(&self) -> usize {
        let mut pending = self.pending_map();
        let count = pending.len();
        pending.clear();
        count
    }

    fn pending_map(
        &self,
    ) -> std::sync::MutexGuard<'_, std::collections::HashMap<String, crate::bus::PendingReply>>
    {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Removes a request's pending entry when the waiting future ends.
struct PendingGuard<'a> {
    bus: &'a EventBus,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.bus.pending_map().remove(self.request_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
