//! Segment definitions.
//!
//! A segment is one re-timed unit of output video belonging to exactly
//! one job, keyed by (job_id, ordinal). Segments are created in bulk
//! once analysis completes (replace-all semantics) and mutated only by
//! the segment batch processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ArtifactRef;
use crate::job::JobId;

/// Segment processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Not processed yet
    #[default]
    Pending,
    /// A pipeline is working on it
    Processing,
    /// Rendered successfully; carries a final artifact
    Completed,
    /// The pipeline exhausted its local retries
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Processing => "processing",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SegmentStatus::Pending),
            "processing" => Some(SegmentStatus::Processing),
            "completed" => Some(SegmentStatus::Completed),
            "failed" => Some(SegmentStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A segment draft as produced by video analysis, before validation
/// and persistence. Ordinals are assigned when drafts become rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDraft {
    /// Ordinal-based id used by the AI's follow-up responses
    pub id: u32,
    /// Source range start (seconds)
    pub source_start: f64,
    /// Source range end (seconds)
    pub source_end: f64,
    /// Draft narration text
    pub narration: String,
    /// Optimized narration variants (one per speech-rate candidate),
    /// present only when narration optimization ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_variants: Option<Vec<String>>,
    /// Keep the original audio instead of synthesizing narration
    #[serde(default)]
    pub passthrough: bool,
}

impl SegmentDraft {
    /// A draft with a non-positive or inverted source range cannot be
    /// rendered and is excluded (skipped, not failed) at creation time.
    pub fn is_valid(&self) -> bool {
        self.source_start >= 0.0 && self.source_end > self.source_start
    }
}

/// One re-timed unit of output video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Owning job
    pub job_id: JobId,

    /// Position within the job's output; stable external id
    pub ordinal: u32,

    /// Source range start (seconds)
    pub source_start: f64,

    /// Source range end (seconds)
    pub source_end: f64,

    /// Intended output duration (seconds)
    pub target_duration: f64,

    /// Narration source text
    pub narration: String,

    /// Optimized narration variants, one per speech-rate candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_variants: Option<Vec<String>>,

    /// Keep the original audio instead of synthesizing narration
    #[serde(default)]
    pub passthrough: bool,

    /// Processing status
    #[serde(default)]
    pub status: SegmentStatus,

    /// Excluded by validation; distinct from failure
    #[serde(default)]
    pub skipped: bool,

    /// Why the pipeline failed (if it did)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Final rendered artifact, set on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<ArtifactRef>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    /// Build a segment row from a validated draft.
    pub fn from_draft(job_id: JobId, ordinal: u32, draft: &SegmentDraft) -> Self {
        let now = Utc::now();
        let skipped = !draft.is_valid();
        Self {
            job_id,
            ordinal,
            source_start: draft.source_start,
            source_end: draft.source_end,
            target_duration: (draft.source_end - draft.source_start).max(0.0),
            narration: draft.narration.clone(),
            narration_variants: draft.narration_variants.clone(),
            passthrough: draft.passthrough,
            status: SegmentStatus::Pending,
            skipped,
            failure_reason: None,
            final_artifact: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Source range duration (seconds).
    pub fn source_duration(&self) -> f64 {
        self.source_end - self.source_start
    }

    /// A segment is terminal-success once it carries a final artifact.
    /// This is the resume-safety marker the batch processor checks.
    pub fn is_terminal_success(&self) -> bool {
        self.status == SegmentStatus::Completed && self.final_artifact.is_some()
    }

    /// Whether the batch processor should pick this segment up.
    pub fn needs_processing(&self) -> bool {
        !self.skipped && !self.is_terminal_success()
    }

    /// Narration text for the candidate at `index`. Falls back to the
    /// draft narration when no optimized variant exists for it.
    pub fn narration_variant(&self, index: usize) -> &str {
        self.narration_variants
            .as_ref()
            .and_then(|v| v.get(index))
            .map(String::as_str)
            .unwrap_or(&self.narration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(start: f64, end: f64) -> SegmentDraft {
        SegmentDraft {
            id: 1,
            source_start: start,
            source_end: end,
            narration: "the hero returns".to_string(),
            narration_variants: None,
            passthrough: false,
        }
    }

    #[test]
    fn test_invalid_ranges_are_skipped_not_failed() {
        let inverted = Segment::from_draft(JobId::new(), 0, &draft(10.0, 5.0));
        assert!(inverted.skipped);
        assert_eq!(inverted.status, SegmentStatus::Pending);
        assert!(!inverted.needs_processing());

        let negative = Segment::from_draft(JobId::new(), 0, &draft(-1.0, 5.0));
        assert!(negative.skipped);
    }

    #[test]
    fn test_terminal_success_requires_artifact() {
        let mut seg = Segment::from_draft(JobId::new(), 3, &draft(0.0, 8.0));
        assert!(seg.needs_processing());

        seg.status = SegmentStatus::Completed;
        // Completed without an artifact is not terminal-success.
        assert!(!seg.is_terminal_success());

        seg.final_artifact = Some(ArtifactRef::new("file:///out/3.mp4"));
        assert!(seg.is_terminal_success());
        assert!(!seg.needs_processing());
    }
}
