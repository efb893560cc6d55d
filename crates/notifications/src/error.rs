use netwatch_db::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl NotificationError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repo(e) if e.is_not_found())
    }
}
