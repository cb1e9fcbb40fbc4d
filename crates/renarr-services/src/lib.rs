//! Collaborator contracts and call-discipline primitives.
//!
//! This crate owns everything about talking to external providers:
//! the error taxonomy and its retry classification, the generic
//! short-backoff retry layer, the per-platform rate-limited dispatcher
//! for quota-constrained AI calls, and the cooperative abort signal.

pub mod abort;
pub mod clients;
pub mod dispatcher;
pub mod error;
pub mod retry;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use clients::{
    MediaMetadata, MediaTransform, NarrationOptimization, NarrationOptimizationRequest,
    OptimizedNarration, SpeechSynthesis, SynthesizedSpeech, VideoAnalysis, VideoUnderstanding,
    VoiceOptions,
};
pub use dispatcher::{PlatformProfile, RateLimitedDispatcher};
pub use error::{RetryClass, RetryClassify, ServiceError, ServiceResult};
pub use retry::{run_with_retry, RetryPolicy};
