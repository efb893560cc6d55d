//! Netwatch domain core.
//!
//! Zero internal dependencies: shared types, domain models, the pure
//! alert-rule evaluation logic, and the built-in speed test URL catalogue.
//! Every other workspace crate builds on this one.

pub mod config;
pub mod error;
pub mod models;
pub mod rules;
pub mod speed_test_urls;
pub mod types;
