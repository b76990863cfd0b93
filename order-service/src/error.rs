use shared::InfraError;
use thiserror::Error;
use uuid::Uuid;

use crate::service::MAX_DESCRIPTION_CHARS;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("empty user_id")]
    EmptyUserId,

    #[error("order amount should be greater than 0")]
    InvalidAmount,

    #[error("description should contain at most {max} characters", max = MAX_DESCRIPTION_CHARS)]
    DescriptionTooLong,

    #[error("no order {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Infra(#[from] InfraError),
}
