//! Target monitoring: probing, scheduling and the target service.
//!
//! - [`probe`] — one latency + throughput measurement against a target.
//! - [`speed_test`] — probe, persist, publish `SPEED_TEST_COMPLETED`.
//! - [`scheduler`] — one repeating task per monitored target.
//! - [`stats`] — run counters and the scheduler health report.
//! - [`service`] — target CRUD, monitoring control and the bus request
//!   handlers.

pub mod clock;
pub mod config;
pub mod error;
pub mod probe;
pub mod scheduler;
pub mod service;
pub mod speed_test;
pub mod stats;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::ProbeConfig;
pub use error::MonitorError;
pub use probe::{ProbeRunner, ProbeTransport, ReqwestTransport};
pub use scheduler::MonitorScheduler;
pub use service::MonitorService;
pub use speed_test::SpeedTester;
pub use stats::{HealthState, HealthStatus, SchedulerStats, TargetRunState};
