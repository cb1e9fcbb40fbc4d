//! Collaborator contracts.
//!
//! The engine only ever talks to the outside world through these
//! traits: video understanding (the multimodal AI), media transforms
//! (the local encoder toolchain) and speech synthesis. Tests hand the
//! engine scripted fakes; production wires real providers in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use renarr_models::{ArtifactRef, SegmentDraft, TokenUsage};

use crate::error::ServiceResult;

/// First-turn analysis result: segment drafts plus the raw exchange,
/// which the narration follow-up needs verbatim for conversational
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub drafts: Vec<SegmentDraft>,
    pub raw_response_text: String,
    pub token_usage: TokenUsage,
}

/// Follow-up request asking the AI to rewrite every draft narration
/// in three length variants. Carries the first turn verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationOptimizationRequest {
    pub analysis_prompt: String,
    pub analysis_response_text: String,
    pub follow_up_prompt: String,
    pub video_refs: Vec<String>,
}

/// Three rewritten narration texts for one draft, shortest to longest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedNarration {
    /// Draft id the rewrite belongs to
    pub id: u32,
    pub narration_a: String,
    pub narration_b: String,
    pub narration_c: String,
}

impl OptimizedNarration {
    pub fn variants(&self) -> Vec<String> {
        vec![
            self.narration_a.clone(),
            self.narration_b.clone(),
            self.narration_c.clone(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationOptimization {
    pub items: Vec<OptimizedNarration>,
    pub token_usage: TokenUsage,
}

/// Multimodal AI provider.
#[async_trait]
pub trait VideoUnderstanding: Send + Sync {
    /// Analyze the source videos and propose segment drafts.
    async fn analyze_video(&self, uris: &[String], prompt: &str) -> ServiceResult<VideoAnalysis>;

    /// Second conversational turn: rewrite all draft narrations at once.
    async fn batch_optimize_narration(
        &self,
        request: &NarrationOptimizationRequest,
    ) -> ServiceResult<NarrationOptimization>;
}

/// Probed media properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

/// Local media toolchain. Every operation takes artifact references in
/// and returns a new artifact reference out; nothing mutates in place.
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Cut `[start, end)` out of the source.
    async fn trim(&self, source: &ArtifactRef, start: f64, end: f64)
        -> ServiceResult<ArtifactRef>;

    async fn get_metadata(&self, source: &ArtifactRef) -> ServiceResult<MediaMetadata>;

    /// Retime video by `factor` (>1 is faster).
    async fn adjust_speed(&self, source: &ArtifactRef, factor: f64) -> ServiceResult<ArtifactRef>;

    /// Repeat the clip `count` times, then cut to `target_duration`.
    async fn loop_clip(
        &self,
        source: &ArtifactRef,
        count: u32,
        target_duration: f64,
    ) -> ServiceResult<ArtifactRef>;

    /// Replace the video's audio track with `audio`.
    async fn merge(&self, video: &ArtifactRef, audio: &ArtifactRef) -> ServiceResult<ArtifactRef>;

    /// Join clips back to back, in the given order.
    async fn concatenate(&self, sources: &[ArtifactRef]) -> ServiceResult<ArtifactRef>;

    /// Produce a subtitle track artifact for the narration text.
    async fn render_subtitles(
        &self,
        text: &str,
        duration_seconds: f64,
    ) -> ServiceResult<ArtifactRef>;

    /// Burn a subtitle track into the video.
    async fn burn_captions(
        &self,
        video: &ArtifactRef,
        subtitles: &ArtifactRef,
    ) -> ServiceResult<ArtifactRef>;

    /// Normalize codec parameters for concatenation.
    async fn reencode(&self, source: &ArtifactRef) -> ServiceResult<ArtifactRef>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceOptions {
    /// BCP-47 language tag
    pub language: String,
    /// Target speech rate, 1.0 is the provider default
    pub speech_rate: f64,
}

/// One synthesized utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedSpeech {
    pub audio: ArtifactRef,
    pub duration_seconds: f64,
}

/// Text-to-speech provider.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Synthesize several texts with the same voice options.
    ///
    /// Returns one entry per input text, in input order.
    async fn synthesize_many(
        &self,
        texts: &[String],
        options: &VoiceOptions,
    ) -> ServiceResult<Vec<SynthesizedSpeech>>;
}
