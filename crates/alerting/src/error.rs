use netwatch_core::error::CoreError;
use netwatch_db::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum AlertingError {
    /// Rule input failed validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl AlertingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repo(e) if e.is_not_found())
    }
}
