/// Error type shared by every repository implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The underlying database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be mapped back onto the domain model.
    #[error("Invalid stored value: {0}")]
    Invalid(String),

    /// The backing store cannot serve requests right now.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = RepoError::not_found("target", "t-9");
        assert_eq!(err.to_string(), "target not found: t-9");
        assert!(err.is_not_found());
    }

    #[test]
    fn unavailable_display() {
        let err = RepoError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Repository unavailable: connection refused");
        assert!(!err.is_not_found());
    }
}
