//! Shared data models for the renarr pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and per-job configuration
//! - Segments and narration candidates
//! - Workflow stages, step kinds and step-scoped context
//! - Error classification persisted on failed jobs

pub mod artifact;
pub mod failure;
pub mod job;
pub mod narration;
pub mod segment;
pub mod step;

// Re-export common types
pub use artifact::ArtifactRef;
pub use failure::ErrorCategory;
pub use job::{Job, JobConfig, JobId, JobStatus, Platform};
pub use narration::{CandidateVersion, NarrationCandidate};
pub use segment::{Segment, SegmentDraft, SegmentStatus};
pub use step::{StageId, StepContext, StepKind, StepStatus, TokenUsage};
