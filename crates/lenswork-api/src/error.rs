use thiserror::Error;

use lenswork_core::store::StoreError;
use lenswork_core::upstream::UpstreamError;
use lenswork_runtime::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    UnknownOperation,
    Conflict,
    Upstream,
    Internal,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::UnknownOperation(_) => ErrorCode::UnknownOperation,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Upstream(_) => ErrorCode::Upstream,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(format!("task {}", id)),
            StoreError::CapacityExceeded(_)
            | StoreError::TerminalState(_)
            | StoreError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            StoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::UnknownWorkflow(name) => {
                Self::InvalidArgument(format!("unknown workflow type '{}'", name))
            }
            RuntimeError::Store(store) => store.into(),
        }
    }
}
