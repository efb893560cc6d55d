//! Per-owner download file preference.

use std::sync::Arc;

use async_trait::async_trait;
use netwatch_core::speed_test_urls;
use netwatch_db::repositories::SpeedTestPreferenceRepository;
use netwatch_db::RepoError;

/// Looks up the download URL a target owner prefers.
#[async_trait]
pub trait SpeedTestPreferences: Send + Sync {
    async fn preferred_url(&self, owner_id: &str) -> Result<Option<String>, RepoError>;
}

/// Maps the stored preference id through the built-in URL catalogue.
/// Ids of unknown or disabled entries resolve to no preference.
pub struct CatalogPreferences {
    repo: Arc<dyn SpeedTestPreferenceRepository>,
}

impl CatalogPreferences {
    pub fn new(repo: Arc<dyn SpeedTestPreferenceRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SpeedTestPreferences for CatalogPreferences {
    async fn preferred_url(&self, owner_id: &str) -> Result<Option<String>, RepoError> {
        let Some(preference) = self.repo.find_by_user_id(owner_id).await? else {
            return Ok(None);
        };
        let entry = speed_test_urls::find_enabled(&preference.speed_test_url_id);
        if entry.is_none() {
            tracing::debug!(
                owner_id,
                url_id = %preference.speed_test_url_id,
                "Preferred speed test URL is not in the catalogue",
            );
        }
        Ok(entry.map(|entry| entry.url.to_string()))
    }
}
