//! Segment rendering step.

use async_trait::async_trait;

use renarr_models::{StepContext, StepKind};

use crate::batch;
use crate::error::EngineResult;
use crate::step::{JobContext, Step};

/// Delegates to the segment batch processor. The parallel and
/// sequential variants differ only in the concurrency they request;
/// which one runs is decided by the workflow condition.
pub struct ProcessSegmentsStep {
    kind: StepKind,
}

impl ProcessSegmentsStep {
    pub fn parallel() -> Self {
        Self {
            kind: StepKind::ProcessSegmentsParallel,
        }
    }

    pub fn sequential() -> Self {
        Self {
            kind: StepKind::ProcessSegmentsSequential,
        }
    }
}

#[async_trait]
impl Step for ProcessSegmentsStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, ctx: &JobContext) -> EngineResult<StepContext> {
        let concurrency = match self.kind {
            StepKind::ProcessSegmentsSequential => 1,
            _ => ctx.job.config.effective_concurrency(),
        };

        let outcome = batch::process_segments(ctx, self.kind, concurrency).await?;

        Ok(StepContext::Process {
            processed: outcome.processed,
            failed: outcome.failed,
        })
    }
}
