use services::common::RepositoryError;
use tokio_postgres::error::SqlState;

/// Convert tokio_postgres::Error to RepositoryError
pub fn map_db_error(err: tokio_postgres::Error) -> RepositoryError {
    if err.is_closed() {
        return RepositoryError::ConnectionFailed("Connection closed".to_string());
    }

    if let Some(db_err) = err.as_db_error() {
        classify_sql_state(db_err.code(), db_err.message())
    } else {
        // Non-SQL errors (connection issues, etc.)
        RepositoryError::DatabaseError(err.into())
    }
}

/// Map a server-reported SQLSTATE onto a RepositoryError
pub fn classify_sql_state(code: &SqlState, message: &str) -> RepositoryError {
    match code {
        &SqlState::CONNECTION_EXCEPTION
        | &SqlState::CONNECTION_DOES_NOT_EXIST
        | &SqlState::CONNECTION_FAILURE
        | &SqlState::ADMIN_SHUTDOWN
        | &SqlState::CANNOT_CONNECT_NOW => RepositoryError::ConnectionFailed(message.to_string()),

        // Sums that do not fit the result column
        &SqlState::NUMERIC_VALUE_OUT_OF_RANGE => RepositoryError::DataConversionError(
            anyhow::anyhow!("Numeric value out of range: {message}"),
        ),

        &SqlState::QUERY_CANCELED => {
            RepositoryError::DatabaseError(anyhow::anyhow!("Query canceled: {message}"))
        }

        _ => RepositoryError::DatabaseError(anyhow::anyhow!(
            "Database error ({}): {}",
            code.code(),
            message
        )),
    }
}

pub fn map_pool_error(err: deadpool_postgres::PoolError) -> RepositoryError {
    RepositoryError::PoolError(err.into())
}
