//! Bulk segment creation step.

use async_trait::async_trait;
use tracing::info;

use renarr_models::{Segment, StepContext, StepKind};
use renarr_store::CheckpointUpdate;

use crate::error::{EngineError, EngineResult};
use crate::step::{JobContext, Step};

/// Turn the checkpointed drafts into segment rows.
///
/// Drafts with a non-positive or inverted source range are persisted
/// with the skip flag set; exclusion by validation is distinct from
/// failure. Creation is replace-all: rerunning the step replaces the
/// whole set, never patches it.
pub struct CreateSegmentsStep;

#[async_trait]
impl Step for CreateSegmentsStep {
    fn kind(&self) -> StepKind {
        StepKind::CreateSegments
    }

    async fn execute(&self, ctx: &JobContext) -> EngineResult<StepContext> {
        ctx.abort.check()?;

        let state = ctx.store.get_state(&ctx.job.id)?;
        let drafts = state
            .context
            .as_ref()
            .and_then(StepContext::drafts)
            .ok_or_else(|| {
                EngineError::validation("segment creation requires analysis or narration context")
            })?;

        let segments: Vec<Segment> = drafts
            .iter()
            .enumerate()
            .map(|(ordinal, draft)| Segment::from_draft(ctx.job.id.clone(), ordinal as u32, draft))
            .collect();

        let total = segments.len() as u32;
        let skipped = segments.iter().filter(|s| s.skipped).count() as u32;
        if skipped == total {
            return Err(EngineError::invalid_analysis(
                "every segment draft has an invalid time range",
            ));
        }

        ctx.store.replace_all_segments(&ctx.job.id, &segments)?;
        ctx.store.update_state(
            &ctx.job.id,
            &CheckpointUpdate {
                total_segments: Some(total),
                ..Default::default()
            },
        )?;

        info!(
            job_id = %ctx.job.id,
            total = total,
            skipped = skipped,
            "Segments created"
        );

        Ok(StepContext::Segments { total, skipped })
    }
}
