/// Numeric primary keys (alert rules, incidents, notifications).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new opaque string identifier (targets, probe results,
/// push subscriptions).
pub fn new_string_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
