//! Workflow stages, step kinds and step-scoped context.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ArtifactRef;
use crate::segment::SegmentDraft;

/// Identifier of a workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Analysis,
    Render,
    Compose,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Analysis => "analysis",
            StageId::Render => "render",
            StageId::Compose => "compose",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(StageId::Analysis),
            "render" => Some(StageId::Render),
            "compose" => Some(StageId::Compose),
            _ => None,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed catalogue of step kinds.
///
/// Steps are resolved through a match-based factory in the engine, not
/// a string-keyed registry, so an unknown kind is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    AnalyzeVideo,
    OptimizeNarration,
    CreateSegments,
    ProcessSegmentsParallel,
    ProcessSegmentsSequential,
    ComposeFinal,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::AnalyzeVideo => "analyze_video",
            StepKind::OptimizeNarration => "optimize_narration",
            StepKind::CreateSegments => "create_segments",
            StepKind::ProcessSegmentsParallel => "process_segments_parallel",
            StepKind::ProcessSegmentsSequential => "process_segments_sequential",
            StepKind::ComposeFinal => "compose_final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analyze_video" => Some(StepKind::AnalyzeVideo),
            "optimize_narration" => Some(StepKind::OptimizeNarration),
            "create_segments" => Some(StepKind::CreateSegments),
            "process_segments_parallel" => Some(StepKind::ProcessSegmentsParallel),
            "process_segments_sequential" => Some(StepKind::ProcessSegmentsSequential),
            "compose_final" => Some(StepKind::ComposeFinal),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a step-history attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(StepStatus::Running),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token accounting returned by the video-understanding AI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.output_tokens
    }
}

/// Step-scoped context stored on the checkpoint row.
///
/// A tagged union keyed by the step that produced it; each variant
/// carries its own strongly-typed payload instead of an open JSON map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepContext {
    /// Output of the analysis call. The literal prior exchange seeds
    /// the second turn of the narration-optimization conversation.
    Analysis {
        drafts: Vec<SegmentDraft>,
        prompt: String,
        raw_response_text: String,
        token_usage: TokenUsage,
    },
    /// Whether the second-turn optimization was applied or fell back
    /// to the draft narration.
    Narration {
        drafts: Vec<SegmentDraft>,
        optimized: bool,
        token_usage: TokenUsage,
    },
    /// Result of bulk segment creation.
    Segments { total: u32, skipped: u32 },
    /// Result of segment batch processing.
    Process {
        processed: u32,
        failed: Vec<u32>,
    },
    /// Final composition output.
    Compose { final_artifact: ArtifactRef },
}

impl StepContext {
    /// Which step kind produced this context.
    pub fn kind(&self) -> StepKind {
        match self {
            StepContext::Analysis { .. } => StepKind::AnalyzeVideo,
            StepContext::Narration { .. } => StepKind::OptimizeNarration,
            StepContext::Segments { .. } => StepKind::CreateSegments,
            // Parallel and sequential rendering produce the same shape;
            // the parallel kind is the canonical tag.
            StepContext::Process { .. } => StepKind::ProcessSegmentsParallel,
            StepContext::Compose { .. } => StepKind::ComposeFinal,
        }
    }

    /// The segment drafts carried by analysis or narration context.
    pub fn drafts(&self) -> Option<&[SegmentDraft]> {
        match self {
            StepContext::Analysis { drafts, .. } => Some(drafts),
            StepContext::Narration { drafts, .. } => Some(drafts),
            _ => None,
        }
    }
}
