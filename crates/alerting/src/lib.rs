//! Alert rules and incidents.
//!
//! [`AlertingService`] checks every completed speed test against the
//! target's enabled rules and records an incident per breach. It also owns
//! the rule CRUD and incident resolution, and answers the
//! `ALERT_RULE_*_REQUESTED` bus requests.

pub mod error;
pub mod rules;
pub mod service;

pub use error::AlertingError;
pub use service::AlertingService;
