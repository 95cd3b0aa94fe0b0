use thiserror::Error;

use crate::pedigree::Rejection;

/// Main error type for Cattery
#[derive(Error, Debug)]
pub enum CatteryError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration script failed; nothing from it was applied
    #[error("Migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization of stored columns and snapshots
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cat not found
    #[error("Cat not found: {0}")]
    CatNotFound(String),

    /// Parentage edge not found
    #[error("Parentage edge not found: {0}")]
    EdgeNotFound(String),

    /// Any other record (reservation, video, snapshot) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A proposed parentage edge failed the consistency rules
    #[error("Relationship rejected: {0}")]
    Rejected(Rejection),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CatteryError {
    /// True for the not-found family, which reads treat as an empty result.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatteryError::CatNotFound(_) | CatteryError::EdgeNotFound(_) | CatteryError::NotFound(_)
        )
    }
}

impl From<Rejection> for CatteryError {
    fn from(rejection: Rejection) -> Self {
        CatteryError::Rejected(rejection)
    }
}

/// Convenient Result type using CatteryError
pub type Result<T> = std::result::Result<T, CatteryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatteryError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: CatteryError = rusqlite_err.into();
        assert!(matches!(err, CatteryError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CatteryError = io_err.into();
        assert!(matches!(err, CatteryError::Io(_)));
    }

    #[test]
    fn test_rejection_carries_reason() {
        let err: CatteryError = Rejection::SelfParent.into();
        assert!(err.to_string().contains("a cat cannot be its own parent"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_family() {
        assert!(CatteryError::CatNotFound("c1".into()).is_not_found());
        assert!(CatteryError::EdgeNotFound("e1".into()).is_not_found());
        assert!(CatteryError::NotFound("r1".into()).is_not_found());
        assert!(!CatteryError::InvalidInput("x".into()).is_not_found());
    }
}
