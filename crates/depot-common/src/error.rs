//! Error types for Depot
//!
//! Precondition failures (`NotFound`, `Conflict`, `ParentPathMissing`,
//! `NodeUnavailable`) are detected before any write and surfaced to the
//! caller synchronously. Failures inside asynchronous replication are
//! logged by the subscriber that hit them and never reach the original
//! caller, who has already been answered.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum DepotError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("parent path does not exist")]
    ParentPathMissing,

    #[error("nodes {} are unavailable", .0.join(","))]
    NodeUnavailable(Vec<String>),

    #[error("transfer failure: {0}")]
    TransferFailure(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DepotError {
    /// HTTP status the error maps to at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            DepotError::NotFound(_) => 404,
            DepotError::Conflict(_) => 409,
            DepotError::ParentPathMissing => 400,
            DepotError::NodeUnavailable(_) => 503,
            DepotError::TransferFailure(_) => 502,
            DepotError::Store(_) | DepotError::Config(_) => 500,
        }
    }
}

impl From<std::io::Error> for DepotError {
    fn from(value: std::io::Error) -> Self {
        DepotError::TransferFailure(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = DepotError::NotFound("user 42".to_string());
        assert_eq!(format!("{}", err), "user 42 not found");

        let err = DepotError::NodeUnavailable(vec!["a1".to_string(), "b2".to_string()]);
        assert_eq!(format!("{}", err), "nodes a1,b2 are unavailable");

        let err = DepotError::ParentPathMissing;
        assert_eq!(format!("{}", err), "parent path does not exist");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(DepotError::NotFound("x".into()).status_code(), 404);
        assert_eq!(
            DepotError::Conflict("entry at /a already exists".into()).status_code(),
            409
        );
        assert_eq!(DepotError::ParentPathMissing.status_code(), 400);
        assert_eq!(DepotError::NodeUnavailable(vec![]).status_code(), 503);
        assert_eq!(DepotError::TransferFailure("io".into()).status_code(), 502);
    }
}
