//! `sqlx` implementations of the repository traits.
//!
//! Queries are built at runtime (`sqlx::query_as`) so the crate compiles
//! without a live database. Enum columns are stored as their wire names and
//! parsed back on read; an unknown value surfaces as [`RepoError::Invalid`].

mod alert_rule_repo;
mod incident_repo;
mod notification_repo;
mod preference_repo;
mod probe_result_repo;
mod push_subscription_repo;
mod target_repo;

pub use alert_rule_repo::PgAlertRuleRepository;
pub use incident_repo::PgIncidentRepository;
pub use notification_repo::PgNotificationRepository;
pub use preference_repo::PgSpeedTestPreferenceRepository;
pub use probe_result_repo::PgProbeResultRepository;
pub use push_subscription_repo::PgPushSubscriptionRepository;
pub use target_repo::PgTargetRepository;

use crate::error::RepoError;

/// Parse a stored enum column, reporting the column on failure.
pub(crate) fn parse_column<T>(
    column: &'static str,
    value: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepoError> {
    parse(value).ok_or_else(|| RepoError::Invalid(format!("{column} = {value:?}")))
}
