//! Video analysis step.

use async_trait::async_trait;
use tracing::info;

use renarr_models::{StepContext, StepKind};

use crate::error::{EngineError, EngineResult};
use crate::step::{with_timeout, JobContext, Step};

/// First turn of the AI conversation: propose segment drafts.
///
/// The literal prompt and raw response text are checkpointed because
/// the narration follow-up is a second turn seeded by this exchange.
pub struct AnalyzeVideoStep;

#[async_trait]
impl Step for AnalyzeVideoStep {
    fn kind(&self) -> StepKind {
        StepKind::AnalyzeVideo
    }

    async fn execute(&self, ctx: &JobContext) -> EngineResult<StepContext> {
        ctx.abort.check()?;

        if ctx.job.source_uris.is_empty() {
            return Err(EngineError::validation("job has no source videos"));
        }

        let prompt = ctx.config.analysis_prompt.clone();
        let analysis = ctx
            .services
            .dispatcher
            .execute(ctx.job.config.platform, || {
                with_timeout(
                    ctx.config.ai_timeout,
                    "video analysis",
                    ctx.services.ai.analyze_video(&ctx.job.source_uris, &prompt),
                )
            })
            .await?;

        if analysis.drafts.is_empty() {
            return Err(EngineError::invalid_analysis(
                "analysis returned zero segment drafts",
            ));
        }

        info!(
            job_id = %ctx.job.id,
            drafts = analysis.drafts.len(),
            tokens = analysis.token_usage.total(),
            "Video analysis complete"
        );

        Ok(StepContext::Analysis {
            drafts: analysis.drafts,
            prompt,
            raw_response_text: analysis.raw_response_text,
            token_usage: analysis.token_usage,
        })
    }
}
