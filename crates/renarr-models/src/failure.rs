//! Error classification persisted on failed jobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a terminal job failure.
///
/// Stored alongside the human-readable message so a failed job can be
/// inspected later without re-parsing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network/timeout/5xx class errors that exhausted their retries
    Transient,
    /// The quota-constrained AI refused the call past the dispatcher's ceiling
    QuotaExceeded,
    /// Bad input or configuration; retrying cannot help
    Validation,
    /// The job was cancelled by an abort signal
    Aborted,
    /// Every segment pipeline failed; nothing to compose
    AllSegmentsFailed,
    /// The analysis response was structurally invalid
    InvalidAnalysis,
    /// Anything else (bug, unexpected state)
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Aborted => "aborted",
            ErrorCategory::AllSegmentsFailed => "all_segments_failed",
            ErrorCategory::InvalidAnalysis => "invalid_analysis",
            ErrorCategory::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(ErrorCategory::Transient),
            "quota_exceeded" => Some(ErrorCategory::QuotaExceeded),
            "validation" => Some(ErrorCategory::Validation),
            "aborted" => Some(ErrorCategory::Aborted),
            "all_segments_failed" => Some(ErrorCategory::AllSegmentsFailed),
            "invalid_analysis" => Some(ErrorCategory::InvalidAnalysis),
            "internal" => Some(ErrorCategory::Internal),
            _ => None,
        }
    }

    /// Human-readable guidance shown next to the failure.
    pub fn guidance(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => {
                "A downstream service kept failing. Retry the job later."
            }
            ErrorCategory::QuotaExceeded => {
                "The AI platform quota is exhausted. Wait for the quota window to reset or switch to the metered tier."
            }
            ErrorCategory::Validation => {
                "The job input or configuration is invalid. Fix it before resubmitting."
            }
            ErrorCategory::Aborted => "The job was cancelled.",
            ErrorCategory::AllSegmentsFailed => {
                "Every segment failed to render. Check the per-segment failure reasons."
            }
            ErrorCategory::InvalidAnalysis => {
                "The analysis response could not be interpreted. Re-run the job; if it persists, the source video may be unsupported."
            }
            ErrorCategory::Internal => "An internal error occurred. Check the logs.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
