//! Job definitions and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::failure::ErrorCategory;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// Transitions are forward-only: `pending -> processing -> {completed|failed}`.
/// The single backward transition is a full reset back to `pending`, which
/// also clears all checkpoint and history rows for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be admitted
    #[default]
    Pending,
    /// Job is being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed terminally
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a forward transition to `next` is allowed.
    ///
    /// A full reset (any status back to `pending`) is handled separately
    /// by the store because it also clears dependent rows.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform profile selector for the quota-constrained AI.
///
/// Chooses which static dispatcher profile governs the job's AI calls:
/// a conservative, heavily-throttled free tier or a permissive metered
/// tier. This is per-job configuration, not a dynamic policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Heavily throttled free tier
    #[default]
    FreeTier,
    /// Permissive metered tier
    Metered,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::FreeTier => "free_tier",
            Platform::Metered => "metered",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-job configuration bag, stored as JSON on the job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Concurrent segment pipelines within the render step (1-8)
    #[serde(default = "default_segment_concurrency")]
    pub segment_concurrency: usize,

    /// Desired number of output segments requested from analysis
    #[serde(default = "default_target_segment_count")]
    pub target_segment_count: usize,

    /// Narration language (BCP 47 tag)
    #[serde(default = "default_language")]
    pub language: String,

    /// Run the second-turn narration optimization call
    #[serde(default = "default_true")]
    pub optimize_narration: bool,

    /// Burn captions into each rendered segment
    #[serde(default)]
    pub burn_captions: bool,

    /// Which AI platform profile to dispatch through
    #[serde(default)]
    pub platform: Platform,
}

fn default_segment_concurrency() -> usize {
    3
}

fn default_target_segment_count() -> usize {
    12
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            segment_concurrency: default_segment_concurrency(),
            target_segment_count: default_target_segment_count(),
            language: default_language(),
            optimize_narration: true,
            burn_captions: false,
            platform: Platform::default(),
        }
    }
}

impl JobConfig {
    /// Segment concurrency clamped to the supported 1-8 range.
    pub fn effective_concurrency(&self) -> usize {
        self.segment_concurrency.clamp(1, 8)
    }
}

/// One end-to-end media-processing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Source video locations
    pub source_uris: Vec<String>,

    /// Per-job configuration
    #[serde(default)]
    pub config: JobConfig,

    /// Error classification (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(source_uris: Vec<String>, config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            source_uris,
            config,
            error_category: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Start processing the job.
    pub fn start(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark job as completed.
    pub fn complete(mut self) -> Self {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark job as failed with a classified error.
    pub fn fail(mut self, category: ErrorCategory, message: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error_category = Some(category);
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }
}
