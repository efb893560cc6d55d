use netwatch_db::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<validator::ValidationErrors> for MonitorError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl MonitorError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::TargetNotFound(_) => true,
            Self::Repo(e) => e.is_not_found(),
            Self::Validation(_) => false,
        }
    }
}
