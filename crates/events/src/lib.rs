//! In-process event bus coupling the monitoring, alerting and notification
//! services.
//!
//! - [`event`] — the fixed event catalogue ([`EventKind`], [`Event`]) and
//!   payload types.
//! - [`bus`] — [`EventBus`]: typed and string-keyed handler registries with
//!   synchronous, isolated dispatch plus a broadcast tap.
//! - [`correlation`] — request/reply over the bus keyed by request id.
//! - [`fault`] — where handler failures are reported.

pub mod bus;
pub mod correlation;
pub mod event;
pub mod fault;

pub use bus::{EventBus, HandlerId, HandlerResult};
pub use correlation::{reply_channel, Reply, RequestError, DEFAULT_REQUEST_TIMEOUT};
pub use event::{Event, EventKind};
pub use fault::{FaultCause, FaultReporter, HandlerFault, TracingFaultReporter};
