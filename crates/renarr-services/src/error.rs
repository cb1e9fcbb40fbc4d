//! Service error taxonomy.
//!
//! One classifier drives every retry decision in the system:
//! [`RetryClass::Short`] errors belong to the generic retry layer,
//! [`RetryClass::Long`] errors belong exclusively to the rate-limited
//! dispatcher, and [`RetryClass::Fatal`] errors are surfaced
//! immediately. Keeping quota handling out of the generic layer means
//! backoff never compounds across the two.

use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// How an error should be retried, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient: short bounded backoff in the generic retry layer
    Short,
    /// Quota-exceeded: long bounded backoff in the dispatcher only
    Long,
    /// Not retryable anywhere
    Fatal,
}

/// Pluggable classification hook for the unified retry layer.
///
/// Any error type the retry layer should understand implements this;
/// higher layers wrap [`ServiceError`] and delegate.
pub trait RetryClassify {
    fn retry_class(&self) -> RetryClass;
}

impl RetryClassify for ServiceError {
    fn retry_class(&self) -> RetryClass {
        ServiceError::retry_class(self)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        message: String,
        /// Server-provided retry-after hint, when present
        retry_after_ms: Option<u64>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation aborted")]
    Aborted,
}

impl ServiceError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self::QuotaExceeded {
            message: msg.into(),
            retry_after_ms,
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classify the error for retry purposes.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ServiceError::Network(_) | ServiceError::Timeout(_) | ServiceError::Server { .. } => {
                RetryClass::Short
            }
            ServiceError::QuotaExceeded { .. } => RetryClass::Long,
            ServiceError::InvalidResponse(_)
            | ServiceError::InvalidInput(_)
            | ServiceError::Aborted => RetryClass::Fatal,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ServiceError::QuotaExceeded { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ServiceError::Aborted)
    }

    /// Server-provided retry-after hint, when present.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ServiceError::QuotaExceeded { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ServiceError::network("reset").retry_class(),
            RetryClass::Short
        );
        assert_eq!(
            ServiceError::timeout("deadline").retry_class(),
            RetryClass::Short
        );
        assert_eq!(
            ServiceError::Server {
                status: 503,
                message: "unavailable".into()
            }
            .retry_class(),
            RetryClass::Short
        );
        assert_eq!(
            ServiceError::quota_exceeded("rpm", None).retry_class(),
            RetryClass::Long
        );
        assert_eq!(
            ServiceError::invalid_input("bad config").retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(ServiceError::Aborted.retry_class(), RetryClass::Fatal);
    }
}
