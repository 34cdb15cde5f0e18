use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Request state leaked: {0}")]
    StateLeak(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl RouterError {
    /// True for malformed log position text.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::FormatError(_))
    }

    /// True when the datastore was unreachable or rejected a status query.
    pub fn is_datastore_error(&self) -> bool {
        matches!(self, Self::ConnectionError(_) | Self::QueryError(_))
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl<T> From<std::sync::PoisonError<T>> for RouterError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datastore_error_classification() {
        assert!(RouterError::ConnectionError("down".into()).is_datastore_error());
        assert!(RouterError::QueryError("bad sql".into()).is_datastore_error());
        assert!(!RouterError::FormatError("x".into()).is_datastore_error());
        assert!(RouterError::FormatError("x".into()).is_format_error());
    }

    #[test]
    fn test_display_includes_message() {
        let err = RouterError::QueryError("relation does not exist".into());
        assert_eq!(err.to_string(), "Query error: relation does not exist");
    }
}
