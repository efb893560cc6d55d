use serde::{Deserialize, Serialize};

/// A user's chosen download test file, by catalogue id
/// (see [`crate::speed_test_urls`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpeedTestPreference {
    pub user_id: String,
    pub speed_test_url_id: String,
}
