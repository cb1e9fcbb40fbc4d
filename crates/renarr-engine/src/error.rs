//! Engine error types.

use thiserror::Error;

use renarr_models::ErrorCategory;
use renarr_services::{RetryClass, RetryClassify, ServiceError};
use renarr_store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid analysis response: {0}")]
    InvalidAnalysis(String),

    #[error("All segments failed, nothing to compose")]
    AllSegmentsFailed,

    #[error("Queue full: a job is already running")]
    QueueFull,

    #[error("Job {0} is already running")]
    AlreadyRunning(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_analysis(msg: impl Into<String>) -> Self {
        Self::InvalidAnalysis(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, EngineError::Service(ServiceError::Aborted))
    }

    /// Map the error onto the persisted failure classification.
    pub fn classify(&self) -> ErrorCategory {
        match self {
            EngineError::Service(ServiceError::Aborted) => ErrorCategory::Aborted,
            EngineError::Service(ServiceError::QuotaExceeded { .. }) => {
                ErrorCategory::QuotaExceeded
            }
            EngineError::Service(ServiceError::InvalidResponse(_))
            | EngineError::InvalidAnalysis(_) => ErrorCategory::InvalidAnalysis,
            EngineError::Service(ServiceError::InvalidInput(_))
            | EngineError::Validation(_)
            | EngineError::QueueFull
            | EngineError::AlreadyRunning(_) => ErrorCategory::Validation,
            EngineError::Service(_) => ErrorCategory::Transient,
            EngineError::AllSegmentsFailed => ErrorCategory::AllSegmentsFailed,
            EngineError::Store(_) | EngineError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl RetryClassify for EngineError {
    fn retry_class(&self) -> RetryClass {
        match self {
            EngineError::Service(e) => e.retry_class(),
            // The store already retried SQLITE_BUSY internally; one more
            // round at the step level covers a long contention spike.
            EngineError::Store(e) if e.is_busy() => RetryClass::Short,
            _ => RetryClass::Fatal,
        }
    }
}
