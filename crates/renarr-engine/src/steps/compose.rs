//! Final composition step.

use async_trait::async_trait;
use tracing::info;

use renarr_models::{ArtifactRef, StepContext, StepKind};
use renarr_store::CheckpointUpdate;

use crate::error::{EngineError, EngineResult};
use crate::step::{with_timeout, JobContext, Step};

/// Concatenate the rendered segments in ordinal order and re-encode
/// for delivery. Failed or skipped segments are simply absent from the
/// composition; their ordering among the survivors is preserved.
pub struct ComposeFinalStep;

#[async_trait]
impl Step for ComposeFinalStep {
    fn kind(&self) -> StepKind {
        StepKind::ComposeFinal
    }

    async fn execute(&self, ctx: &JobContext) -> EngineResult<StepContext> {
        ctx.abort.check()?;

        // list_segments orders by ordinal, so the composition order is
        // independent of completion order.
        let segments = ctx.store.list_segments(&ctx.job.id)?;
        let parts: Vec<ArtifactRef> = segments
            .iter()
            .filter(|s| s.is_terminal_success())
            .filter_map(|s| s.final_artifact.clone())
            .collect();

        if parts.is_empty() {
            return Err(EngineError::AllSegmentsFailed);
        }

        let media = &ctx.services.media;
        let concatenated = with_timeout(
            ctx.config.media_timeout,
            "concatenate",
            media.concatenate(&parts),
        )
        .await?;
        let final_artifact = with_timeout(
            ctx.config.media_timeout,
            "final reencode",
            media.reencode(&concatenated),
        )
        .await?;

        ctx.store.update_state(
            &ctx.job.id,
            &CheckpointUpdate {
                final_artifact: Some(final_artifact.clone()),
                intermediate_artifacts: Some(parts.clone()),
                ..Default::default()
            },
        )?;

        info!(
            job_id = %ctx.job.id,
            parts = parts.len(),
            artifact = final_artifact.as_str(),
            "Final composition complete"
        );

        Ok(StepContext::Compose { final_artifact })
    }
}
