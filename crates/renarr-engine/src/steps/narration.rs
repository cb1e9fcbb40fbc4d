//! Narration optimization step.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{info, warn};

use renarr_models::{SegmentDraft, StepContext, StepKind};
use renarr_services::NarrationOptimizationRequest;

use crate::error::{EngineError, EngineResult};
use crate::step::{with_timeout, JobContext, Step};

/// Second turn of the AI conversation: rewrite every draft narration in
/// three length variants, one per speech-rate candidate.
///
/// If the response does not line up with the drafts (count mismatch or
/// unknown ids), the whole batch falls back to the draft narration
/// rather than partially applying; a half-optimized batch is harder to
/// reason about than an unoptimized one.
pub struct OptimizeNarrationStep;

#[async_trait]
impl Step for OptimizeNarrationStep {
    fn kind(&self) -> StepKind {
        StepKind::OptimizeNarration
    }

    async fn execute(&self, ctx: &JobContext) -> EngineResult<StepContext> {
        ctx.abort.check()?;

        let state = ctx.store.get_state(&ctx.job.id)?;
        let (drafts, prompt, raw_response_text) = match state.context {
            Some(StepContext::Analysis {
                drafts,
                prompt,
                raw_response_text,
                ..
            }) => (drafts, prompt, raw_response_text),
            other => {
                return Err(EngineError::validation(format!(
                    "narration optimization requires analysis context, found {:?}",
                    other.map(|c| c.kind())
                )))
            }
        };

        let request = NarrationOptimizationRequest {
            analysis_prompt: prompt,
            analysis_response_text: raw_response_text,
            follow_up_prompt: ctx.config.narration_prompt.clone(),
            video_refs: ctx.job.source_uris.clone(),
        };

        let optimization = ctx
            .services
            .dispatcher
            .execute(ctx.job.config.platform, || {
                with_timeout(
                    ctx.config.ai_timeout,
                    "narration optimization",
                    ctx.services.ai.batch_optimize_narration(&request),
                )
            })
            .await?;

        let (drafts, optimized) = apply_optimization(&ctx.job.id.to_string(), drafts, &optimization);

        Ok(StepContext::Narration {
            drafts,
            optimized,
            token_usage: optimization.token_usage,
        })
    }
}

fn apply_optimization(
    job_id: &str,
    drafts: Vec<SegmentDraft>,
    optimization: &renarr_services::NarrationOptimization,
) -> (Vec<SegmentDraft>, bool) {
    if optimization.items.len() != drafts.len() {
        warn!(
            job_id = %job_id,
            expected = drafts.len(),
            received = optimization.items.len(),
            "Narration response count mismatch, keeping draft narration for the whole batch"
        );
        return (drafts, false);
    }

    let by_id: HashMap<u32, &renarr_services::OptimizedNarration> =
        optimization.items.iter().map(|item| (item.id, item)).collect();

    if drafts.iter().any(|d| !by_id.contains_key(&d.id)) {
        warn!(
            job_id = %job_id,
            "Narration response references unknown draft ids, keeping draft narration"
        );
        return (drafts, false);
    }

    let drafts = drafts
        .into_iter()
        .map(|mut draft| {
            if let Some(item) = by_id.get(&draft.id) {
                draft.narration_variants = Some(item.variants());
            }
            draft
        })
        .collect();

    info!(job_id = %job_id, "Narration optimization applied");
    (drafts, true)
}
