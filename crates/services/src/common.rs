/// Shared error type for record store operations.
/// These errors represent infrastructure concerns (database, connections, etc.)
/// rather than analytics logic.
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Database connection pool error: {0}")]
    PoolError(#[source] anyhow::Error),
    #[error("Database operation error: {0}")]
    DatabaseError(#[source] anyhow::Error),
    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Data validation failed: {0}")]
    ValidationFailed(String),
    #[error("Data conversion error: {0}")]
    DataConversionError(#[source] anyhow::Error),
}

impl RepositoryError {
    /// Whether the failure means the store could not be reached or did not
    /// answer, as opposed to answering with something unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::PoolError(_)
                | Self::DatabaseError(_)
                | Self::Timeout(_)
        )
    }
}
