//! Store error types.

use derive_more::{Display, Error};
use tracing::warn;

use crate::GameId;

/// Failure of a persistence or notification call.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum StoreError {
    /// No record with this id exists.
    #[display("Game {} not found", _0)]
    NotFound(#[error(not(source))] GameId),

    /// The update's precondition no longer held at write time.
    #[display("Condition failed: {}", _0)]
    ConditionFailed(#[error(not(source))] String),

    /// The store or the network is unavailable; the caller may retry.
    #[display("Store unavailable: {}", _0)]
    Transient(#[error(not(source))] String),

    /// A stored row could not be turned into a record.
    #[display("Malformed record: {}", _0)]
    Decode(#[error(not(source))] String),

    /// The backend refused the operation (missing schema, constraint,
    /// unusable database). Retrying the same call fails the same way.
    #[display("Store rejected operation: {}", _0)]
    Backend(#[error(not(source))] String),
}

impl StoreError {
    /// True for errors a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// SQLite reports lock contention as a generic error with this wording.
fn is_contention(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("busy")
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        let loc = std::panic::Location::caller();
        warn!(file = loc.file(), line = loc.line(), error = %err, "Diesel error");
        match err {
            Error::DeserializationError(e) => StoreError::Decode(format!("Row: {}", e)),
            Error::SerializationError(e) => StoreError::Decode(format!("Value: {}", e)),
            Error::DatabaseError(
                DatabaseErrorKind::ClosedConnection
                | DatabaseErrorKind::UnableToSendCommand
                | DatabaseErrorKind::SerializationFailure,
                info,
            ) => StoreError::Transient(info.message().to_string()),
            Error::DatabaseError(_, info) if is_contention(info.message()) => {
                StoreError::Transient(info.message().to_string())
            }
            Error::DatabaseError(_, info) => StoreError::Backend(info.message().to_string()),
            Error::NotFound | Error::QueryBuilderError(_) => {
                StoreError::Backend(format!("Diesel error: {}", err))
            }
            other => StoreError::Transient(format!("Diesel error: {}", other)),
        }
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        match err {
            diesel::ConnectionError::InvalidConnectionUrl(_)
            | diesel::ConnectionError::CouldntSetupConfiguration(_) => {
                StoreError::Backend(format!("Connection error: {}", err))
            }
            other => StoreError::Transient(format!("Connection error: {}", other)),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(format!("Board column: {}", err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Transient(format!("Store task failed: {}", err))
    }
}
