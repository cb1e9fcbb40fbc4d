//! Segment batch processor.
//!
//! Partitions a job's remaining segments into concurrency-bounded
//! batches and runs the per-segment pipeline for each. One segment's
//! failure never cancels its siblings or the job; only a run in which
//! nothing at all succeeded is job-fatal.

use futures::future::join_all;
use tracing::{info, warn};

use renarr_models::{Segment, StepKind};
use renarr_services::run_with_retry;

use crate::error::{EngineError, EngineResult};
use crate::pipeline;
use crate::step::JobContext;

/// Result of one batch-processing run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Segments newly processed by this run
    pub processed: u32,
    /// Ordinals whose pipelines exhausted their local retries
    pub failed: Vec<u32>,
}

/// Process every non-terminal segment of the job, `concurrency` at a
/// time. Already-terminal-success segments are skipped; that is what
/// makes re-entry after a crash safe. `kind` is the invoking step, so
/// per-segment history attempts are attributed to it.
pub async fn process_segments(
    ctx: &JobContext,
    kind: StepKind,
    concurrency: usize,
) -> EngineResult<BatchOutcome> {
    let concurrency = concurrency.clamp(1, 8);
    let segments = ctx.store.list_segments(&ctx.job.id)?;

    let already_done = segments.iter().filter(|s| s.is_terminal_success()).count();
    let remaining: Vec<Segment> = segments
        .into_iter()
        .filter(Segment::needs_processing)
        .collect();

    info!(
        job_id = %ctx.job.id,
        remaining = remaining.len(),
        already_done = already_done,
        concurrency = concurrency,
        "Processing segments"
    );

    let mut processed = 0u32;
    let mut failed: Vec<u32> = Vec::new();

    for batch in remaining.chunks(concurrency) {
        ctx.abort.check()?;

        let results = join_all(batch.iter().map(|segment| process_one(ctx, kind, segment))).await;

        for (segment, result) in batch.iter().zip(results) {
            match result {
                Ok(()) => processed += 1,
                // Abort is job-level, not a segment defect.
                Err(e) if e.is_aborted() => return Err(e),
                Err(e) => {
                    warn!(
                        job_id = %ctx.job.id,
                        segment = segment.ordinal,
                        "Segment failed: {}", e
                    );
                    ctx.store
                        .fail_segment(&ctx.job.id, segment.ordinal, &e.to_string())?;
                    failed.push(segment.ordinal);
                }
            }
        }
    }

    if processed == 0 && already_done == 0 {
        return Err(EngineError::AllSegmentsFailed);
    }

    failed.sort_unstable();
    info!(
        job_id = %ctx.job.id,
        processed = processed,
        failed = failed.len(),
        "Segment processing finished"
    );

    Ok(BatchOutcome { processed, failed })
}

/// Run one segment pipeline with its local retry budget, recording a
/// step-history attempt per try and persisting the terminal result.
async fn process_one(ctx: &JobContext, kind: StepKind, segment: &Segment) -> EngineResult<()> {
    let policy = ctx.config.segment_retry();

    let artifact = run_with_retry(&policy, "segment pipeline", || async move {
        let record_id = ctx.store.mark_step_started(
            &ctx.job.id,
            kind,
            Some(segment.ordinal),
            None,
        )?;
        ctx.store.mark_segment_processing(&ctx.job.id, segment.ordinal)?;

        match pipeline::render_segment(ctx, segment).await {
            Ok(artifact) => {
                ctx.store.mark_step_completed(
                    record_id,
                    Some(&serde_json::json!({ "artifact": artifact.as_str() })),
                )?;
                Ok(artifact)
            }
            Err(e) => {
                if let Err(mark_err) = ctx.store.mark_step_failed(record_id, &e.to_string()) {
                    warn!(
                        job_id = %ctx.job.id,
                        segment = segment.ordinal,
                        "Failed to record step failure: {}", mark_err
                    );
                }
                Err(e)
            }
        }
    })
    .await?;

    // Terminal success and the checkpoint counter commit together.
    let counter = ctx
        .store
        .complete_segment(&ctx.job.id, segment.ordinal, &artifact)?;
    info!(
        job_id = %ctx.job.id,
        segment = segment.ordinal,
        processed_total = counter,
        "Segment completed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use renarr_models::{ArtifactRef, SegmentStatus};
    use renarr_store::Store;

    use crate::test_support::{drafts_with_failures, fake_services, seeded_context, FakeAi};

    fn context_with_segments(total: u32, failing: &HashSet<u32>) -> crate::step::JobContext {
        let store = Store::in_memory().unwrap();
        let drafts = drafts_with_failures(total, failing);
        let ctx = seeded_context(&store, fake_services(FakeAi::with_drafts(drafts.clone())), |_| {});

        let segments: Vec<renarr_models::Segment> = drafts
            .iter()
            .enumerate()
            .map(|(i, d)| renarr_models::Segment::from_draft(ctx.job.id.clone(), i as u32, d))
            .collect();
        ctx.store.replace_all_segments(&ctx.job.id, &segments).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_partial_failure_yields_success_with_failed_list() {
        let failing: HashSet<u32> = [1, 3].into_iter().collect();
        let ctx = context_with_segments(5, &failing);

        let outcome = process_segments(&ctx, StepKind::ProcessSegmentsParallel, 3).await.unwrap();

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.failed, vec![1, 3]);

        let segments = ctx.store.list_segments(&ctx.job.id).unwrap();
        assert!(segments[1].failure_reason.is_some());
        assert_eq!(segments[1].status, SegmentStatus::Failed);
        assert!(segments[0].is_terminal_success());

        // Three candidates persisted per successful dubbed segment.
        assert_eq!(ctx.store.list_candidates(&ctx.job.id, 0).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_resume_processes_only_remaining_segments() {
        let ctx = context_with_segments(10, &HashSet::new());

        for ordinal in 0..4u32 {
            ctx.store
                .complete_segment(
                    &ctx.job.id,
                    ordinal,
                    &ArtifactRef::new(format!("file:///done/{ordinal}.mp4")),
                )
                .unwrap();
        }

        let outcome = process_segments(&ctx, StepKind::ProcessSegmentsParallel, 4).await.unwrap();

        assert_eq!(outcome.processed, 6);
        assert!(outcome.failed.is_empty());

        let state = ctx.store.get_state(&ctx.job.id).unwrap();
        assert_eq!(state.processed_segments, 10);

        // Pre-completed artifacts were not re-rendered.
        let segments = ctx.store.list_segments(&ctx.job.id).unwrap();
        assert_eq!(
            segments[2].final_artifact.as_ref().unwrap().as_str(),
            "file:///done/2.mp4"
        );
    }

    #[tokio::test]
    async fn test_every_candidate_carries_alignment_score() {
        let ctx = context_with_segments(1, &HashSet::new());

        process_segments(&ctx, StepKind::ProcessSegmentsParallel, 1)
            .await
            .unwrap();

        let candidates = ctx.store.list_candidates(&ctx.job.id, 0).unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.score.is_some()));

        // The selected candidate carries the best (lowest) score.
        let selected = candidates.iter().find(|c| c.selected).unwrap();
        assert!(candidates.iter().all(|c| selected.score <= c.score));
    }

    #[tokio::test]
    async fn test_zero_success_is_job_fatal() {
        let failing: HashSet<u32> = (0..3).collect();
        let ctx = context_with_segments(3, &failing);

        let err = process_segments(&ctx, StepKind::ProcessSegmentsParallel, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::AllSegmentsFailed));
    }

    #[tokio::test]
    async fn test_failed_segment_retries_locally_before_surfacing() {
        let failing: HashSet<u32> = [0].into_iter().collect();
        let ctx = context_with_segments(1, &failing);

        // With 2 of 2 non-failing segments absent, the run is fatal, but
        // the history must show one attempt record per local retry.
        let _ = process_segments(&ctx, StepKind::ProcessSegmentsParallel, 1).await;

        let attempts: Vec<_> = ctx
            .store
            .list_step_history(&ctx.job.id)
            .unwrap()
            .into_iter()
            .filter(|r| r.segment_ordinal == Some(0))
            .collect();
        assert_eq!(attempts.len() as u32, ctx.config.segment_max_attempts);
    }
}
