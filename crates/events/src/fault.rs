//! Reporting of failures raised inside bus handlers.

use std::any::Any;
use std::fmt;

use crate::bus::HandlerId;

/// How a handler failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCause {
    /// The handler returned an error.
    Error(String),
    /// The handler panicked; the payload message when it was a string.
    Panic(String),
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(message) => write!(f, "{message}"),
            Self::Panic(message) => write!(f, "panicked: {message}"),
        }
    }
}

impl FaultCause {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        Self::Panic(message)
    }
}

/// One failed handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    /// Wire name of the event being dispatched.
    pub event: String,
    pub handler: HandlerId,
    pub cause: FaultCause,
}

/// Receives every handler failure the bus isolates.
///
/// Called synchronously from the dispatch loop, so implementations must not
/// emit on the same bus.
pub trait FaultReporter: Send + Sync {
    fn report(&self, fault: &HandlerFault);
}

/// Logs handler failures at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report(&self, fault: &HandlerFault) {
        tracing::error!(
            event = %fault.event,
            handler = %fault.handler,
            error = %fault.cause,
            "Event handler failed",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let cause = FaultCause::from_panic(Box::new("boom"));
        assert_eq!(cause, FaultCause::Panic("boom".to_string()));

        let cause = FaultCause::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(cause.to_string(), "panicked: owned boom");

        let cause = FaultCause::from_panic(Box::new(42_u8));
        assert_eq!(cause, FaultCause::Panic("non-string panic payload".to_string()));
    }
}
