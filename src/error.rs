use thiserror::Error;

use crate::storage::StorageError;

pub type ServiceResult<T> = core::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Api(String),
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
}
