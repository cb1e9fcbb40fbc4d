//! Step contract and factory.
//!
//! Step kinds form a closed enum; the factory is a match, so an unknown
//! kind is a compile error rather than a runtime lookup failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use renarr_models::{Job, StepContext, StepKind};
use renarr_services::{
    AbortSignal, MediaTransform, RateLimitedDispatcher, ServiceError, ServiceResult,
    SpeechSynthesis, VideoUnderstanding,
};
use renarr_store::Store;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::steps;

/// External collaborators, constructed once at process start and
/// threaded through the execution context.
#[derive(Clone)]
pub struct Services {
    pub ai: Arc<dyn VideoUnderstanding>,
    pub media: Arc<dyn MediaTransform>,
    pub speech: Arc<dyn SpeechSynthesis>,
    pub dispatcher: Arc<RateLimitedDispatcher>,
}

/// Everything a step needs to run: the job, the store, the
/// collaborators and the abort signal.
#[derive(Clone)]
pub struct JobContext {
    pub store: Store,
    pub services: Services,
    pub config: EngineConfig,
    pub job: Job,
    pub abort: AbortSignal,
}

/// One executable unit of the workflow.
#[async_trait]
pub trait Step: Send + Sync {
    fn kind(&self) -> StepKind;

    /// Run the step, returning the context to checkpoint on success.
    async fn execute(&self, ctx: &JobContext) -> EngineResult<StepContext>;
}

/// Resolve a step kind to its implementation.
pub fn build_step(kind: StepKind) -> Box<dyn Step> {
    match kind {
        StepKind::AnalyzeVideo => Box::new(steps::AnalyzeVideoStep),
        StepKind::OptimizeNarration => Box::new(steps::OptimizeNarrationStep),
        StepKind::CreateSegments => Box::new(steps::CreateSegmentsStep),
        StepKind::ProcessSegmentsParallel => Box::new(steps::ProcessSegmentsStep::parallel()),
        StepKind::ProcessSegmentsSequential => {
            Box::new(steps::ProcessSegmentsStep::sequential())
        }
        StepKind::ComposeFinal => Box::new(steps::ComposeFinalStep),
    }
}

/// Apply a wall-clock timeout to an external call.
pub(crate) async fn with_timeout<T>(
    duration: Duration,
    operation: &str,
    fut: impl Future<Output = ServiceResult<T>>,
) -> ServiceResult<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::timeout(format!(
            "{operation} exceeded {}s",
            duration.as_secs()
        ))),
    }
}
