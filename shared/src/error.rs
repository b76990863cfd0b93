use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Infrastructure failures. Everything here is transient from the caller's
/// point of view except `Codec` and `Corrupt`, which point at bad data.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A unique constraint rejected a concurrent insert; the transaction was
    /// rolled back and can be replayed.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    #[error("stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("malformed payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unexpected stored value: {0}")]
    Corrupt(String),
}

pub type Result<T, E = InfraError> = std::result::Result<T, E>;

impl From<DieselError> for InfraError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                InfraError::Conflict(info.message().to_owned())
            }
            other => InfraError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<PoolError> for InfraError {
    fn from(e: PoolError) -> Self {
        InfraError::StoreUnavailable(e.to_string())
    }
}

impl From<bb8::RunError<PoolError>> for InfraError {
    fn from(e: bb8::RunError<PoolError>) -> Self {
        InfraError::StoreUnavailable(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for InfraError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        InfraError::StoreUnavailable("operation timed out".to_owned())
    }
}

impl From<KafkaError> for InfraError {
    fn from(e: KafkaError) -> Self {
        InfraError::StreamUnavailable(e.to_string())
    }
}

impl InfraError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, InfraError::Conflict(_))
    }
}
