//! Scripted fake collaborators for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use renarr_models::{
    ArtifactRef, Job, JobConfig, Platform, SegmentDraft, TokenUsage,
};
use renarr_services::{
    AbortSignal, MediaMetadata, MediaTransform, NarrationOptimization,
    NarrationOptimizationRequest, OptimizedNarration, PlatformProfile, RateLimitedDispatcher,
    ServiceError, ServiceResult, SpeechSynthesis, SynthesizedSpeech, VideoAnalysis,
    VideoUnderstanding, VoiceOptions,
};
use renarr_store::Store;

use crate::config::EngineConfig;
use crate::step::{JobContext, Services};

pub fn draft(id: u32, start: f64, end: f64, narration: &str) -> SegmentDraft {
    SegmentDraft {
        id,
        source_start: start,
        source_end: end,
        narration: narration.to_string(),
        narration_variants: None,
        passthrough: false,
    }
}

/// Scripted AI: returns canned drafts, optionally with a response whose
/// item count does not match the request.
pub struct FakeAi {
    pub drafts: Vec<SegmentDraft>,
    pub mismatch_narration_count: bool,
    pub analyze_calls: AtomicU32,
}

impl FakeAi {
    pub fn with_drafts(drafts: Vec<SegmentDraft>) -> Self {
        Self {
            drafts,
            mismatch_narration_count: false,
            analyze_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl VideoUnderstanding for FakeAi {
    async fn analyze_video(&self, _uris: &[String], prompt: &str) -> ServiceResult<VideoAnalysis> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VideoAnalysis {
            drafts: self.drafts.clone(),
            raw_response_text: format!("response to: {prompt}"),
            token_usage: TokenUsage {
                prompt_tokens: 100,
                output_tokens: 50,
            },
        })
    }

    async fn batch_optimize_narration(
        &self,
        _request: &NarrationOptimizationRequest,
    ) -> ServiceResult<NarrationOptimization> {
        let mut items: Vec<OptimizedNarration> = self
            .drafts
            .iter()
            .map(|d| OptimizedNarration {
                id: d.id,
                narration_a: format!("{} (tight)", d.narration),
                narration_b: d.narration.clone(),
                narration_c: format!("{} with extra detail", d.narration),
            })
            .collect();
        if self.mismatch_narration_count {
            items.pop();
        }
        Ok(NarrationOptimization {
            items,
            token_usage: TokenUsage::default(),
        })
    }
}

/// Fake media toolchain producing deterministic artifact refs and
/// recording what gets concatenated.
#[derive(Default)]
pub struct FakeMedia {
    counter: AtomicU32,
    pub concatenated: Mutex<Vec<Vec<String>>>,
}

impl FakeMedia {
    fn artifact(&self, op: &str) -> ArtifactRef {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ArtifactRef::new(format!("file:///work/{op}-{n}.mp4"))
    }
}

#[async_trait]
impl MediaTransform for FakeMedia {
    async fn trim(&self, _source: &ArtifactRef, _start: f64, _end: f64) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("trim"))
    }

    async fn get_metadata(&self, _source: &ArtifactRef) -> ServiceResult<MediaMetadata> {
        Ok(MediaMetadata {
            duration_seconds: 10.0,
            width: 1080,
            height: 1920,
            has_audio: true,
        })
    }

    async fn adjust_speed(&self, _source: &ArtifactRef, _factor: f64) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("speed"))
    }

    async fn loop_clip(
        &self,
        _source: &ArtifactRef,
        _count: u32,
        _target_duration: f64,
    ) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("loop"))
    }

    async fn merge(&self, _video: &ArtifactRef, _audio: &ArtifactRef) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("merge"))
    }

    async fn concatenate(&self, sources: &[ArtifactRef]) -> ServiceResult<ArtifactRef> {
        self.concatenated
            .lock()
            .unwrap()
            .push(sources.iter().map(|s| s.as_str().to_string()).collect());
        Ok(self.artifact("concat"))
    }

    async fn render_subtitles(&self, _text: &str, _duration: f64) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("subs"))
    }

    async fn burn_captions(
        &self,
        _video: &ArtifactRef,
        _subtitles: &ArtifactRef,
    ) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("captioned"))
    }

    async fn reencode(&self, _source: &ArtifactRef) -> ServiceResult<ArtifactRef> {
        Ok(self.artifact("reencode"))
    }
}

/// Media fake whose `trim` parks until the test releases it, so a test
/// can abort a job while a render is provably in flight.
pub struct GatedMedia {
    inner: FakeMedia,
    pub entered: tokio::sync::Notify,
    release: tokio::sync::Semaphore,
}

impl Default for GatedMedia {
    fn default() -> Self {
        Self {
            inner: FakeMedia::default(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Semaphore::new(0),
        }
    }
}

impl GatedMedia {
    /// Let every parked (and future) `trim` call proceed.
    pub fn open_gate(&self) {
        self.release.add_permits(tokio::sync::Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl MediaTransform for GatedMedia {
    async fn trim(&self, source: &ArtifactRef, start: f64, end: f64) -> ServiceResult<ArtifactRef> {
        self.entered.notify_one();
        let _permit = self.release.acquire().await;
        self.inner.trim(source, start, end).await
    }

    async fn get_metadata(&self, source: &ArtifactRef) -> ServiceResult<MediaMetadata> {
        self.inner.get_metadata(source).await
    }

    async fn adjust_speed(&self, source: &ArtifactRef, factor: f64) -> ServiceResult<ArtifactRef> {
        self.inner.adjust_speed(source, factor).await
    }

    async fn loop_clip(
        &self,
        source: &ArtifactRef,
        count: u32,
        target_duration: f64,
    ) -> ServiceResult<ArtifactRef> {
        self.inner.loop_clip(source, count, target_duration).await
    }

    async fn merge(&self, video: &ArtifactRef, audio: &ArtifactRef) -> ServiceResult<ArtifactRef> {
        self.inner.merge(video, audio).await
    }

    async fn concatenate(&self, sources: &[ArtifactRef]) -> ServiceResult<ArtifactRef> {
        self.inner.concatenate(sources).await
    }

    async fn render_subtitles(&self, text: &str, duration: f64) -> ServiceResult<ArtifactRef> {
        self.inner.render_subtitles(text, duration).await
    }

    async fn burn_captions(
        &self,
        video: &ArtifactRef,
        subtitles: &ArtifactRef,
    ) -> ServiceResult<ArtifactRef> {
        self.inner.burn_captions(video, subtitles).await
    }

    async fn reencode(&self, source: &ArtifactRef) -> ServiceResult<ArtifactRef> {
        self.inner.reencode(source).await
    }
}

/// Fake synthesis: duration scales with text length and speech rate,
/// and texts containing `FAIL` always error, so a segment whose
/// narration carries the marker exhausts its local retries.
#[derive(Default)]
pub struct FakeSpeech {
    counter: AtomicU32,
}

#[async_trait]
impl SpeechSynthesis for FakeSpeech {
    async fn synthesize_many(
        &self,
        texts: &[String],
        options: &VoiceOptions,
    ) -> ServiceResult<Vec<SynthesizedSpeech>> {
        texts
            .iter()
            .map(|text| {
                if text.contains("FAIL") {
                    return Err(ServiceError::network("synthesis backend unreachable"));
                }
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                Ok(SynthesizedSpeech {
                    audio: ArtifactRef::new(format!("file:///tts/{n}.wav")),
                    duration_seconds: text.len() as f64 * 0.1 / options.speech_rate,
                })
            })
            .collect()
    }
}

/// Dispatcher with negligible pacing so tests run fast.
pub fn fast_dispatcher() -> RateLimitedDispatcher {
    let profile = |platform| PlatformProfile {
        platform,
        min_interval: Duration::from_millis(0),
        max_quota_attempts: 2,
        quota_base_delay: Duration::from_millis(1),
        max_quota_wait: Duration::from_millis(5),
    };
    RateLimitedDispatcher::with_profiles(vec![
        profile(Platform::FreeTier),
        profile(Platform::Metered),
    ])
}

/// Engine config with millisecond-scale delays.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        step_max_attempts: 2,
        step_base_delay: Duration::from_millis(1),
        segment_max_attempts: 2,
        segment_base_delay: Duration::from_millis(1),
        ai_timeout: Duration::from_secs(5),
        media_timeout: Duration::from_secs(5),
        speech_timeout: Duration::from_secs(5),
        analysis_prompt: "analyze".to_string(),
        narration_prompt: "optimize".to_string(),
    }
}

pub fn fake_services(ai: FakeAi) -> Services {
    Services {
        ai: std::sync::Arc::new(ai),
        media: std::sync::Arc::new(FakeMedia::default()),
        speech: std::sync::Arc::new(FakeSpeech::default()),
        dispatcher: std::sync::Arc::new(fast_dispatcher()),
    }
}

/// A processing job with its checkpoint row, ready for step execution.
pub fn seeded_context(store: &Store, services: Services, mut config_fn: impl FnMut(&mut JobConfig)) -> JobContext {
    let mut job_config = JobConfig::default();
    config_fn(&mut job_config);

    let job = Job::new(vec!["file:///source.mp4".to_string()], job_config);
    store.create_job(&job).unwrap();
    store
        .update_job_status(&job.id, renarr_models::JobStatus::Processing)
        .unwrap();
    store.init_state(&job.id).unwrap();
    let job = store.get_job(&job.id).unwrap();

    JobContext {
        store: store.clone(),
        services,
        config: fast_config(),
        job,
        abort: AbortSignal::never(),
    }
}

/// Narrations for ordinals in `failing` carry the FAIL marker.
pub fn drafts_with_failures(total: u32, failing: &HashSet<u32>) -> Vec<SegmentDraft> {
    (0..total)
        .map(|i| {
            let narration = if failing.contains(&i) {
                format!("segment {i} FAIL")
            } else {
                format!("segment {i} narration text")
            };
            draft(i + 1, i as f64 * 10.0, (i as f64 + 1.0) * 10.0, &narration)
        })
        .collect()
}
