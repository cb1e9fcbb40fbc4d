//! Engine configuration.

use std::time::Duration;

use renarr_services::RetryPolicy;

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts per non-segment step, including the first
    pub step_max_attempts: u32,
    /// Base delay between step attempts
    pub step_base_delay: Duration,
    /// Attempts per segment pipeline, including the first
    pub segment_max_attempts: u32,
    /// Base delay between segment pipeline attempts
    pub segment_base_delay: Duration,
    /// Wall-clock timeout for video-understanding AI calls. Long:
    /// large-media analysis legitimately runs for minutes.
    pub ai_timeout: Duration,
    /// Timeout for a single media-transform operation
    pub media_timeout: Duration,
    /// Timeout for a speech-synthesis call
    pub speech_timeout: Duration,
    /// Analysis prompt handed to the video-understanding client
    pub analysis_prompt: String,
    /// Follow-up prompt for the narration-optimization turn
    pub narration_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_max_attempts: 3,
            step_base_delay: Duration::from_secs(2),
            segment_max_attempts: 2,
            segment_base_delay: Duration::from_secs(1),
            ai_timeout: Duration::from_secs(900),
            media_timeout: Duration::from_secs(120),
            speech_timeout: Duration::from_secs(60),
            analysis_prompt: String::new(),
            narration_prompt: String::new(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            step_max_attempts: env_u32("RENARR_STEP_MAX_ATTEMPTS", 3),
            step_base_delay: env_secs("RENARR_STEP_BASE_DELAY_SECS", 2),
            segment_max_attempts: env_u32("RENARR_SEGMENT_MAX_ATTEMPTS", 2),
            segment_base_delay: env_secs("RENARR_SEGMENT_BASE_DELAY_SECS", 1),
            ai_timeout: env_secs("RENARR_AI_TIMEOUT_SECS", 900),
            media_timeout: env_secs("RENARR_MEDIA_TIMEOUT_SECS", 120),
            speech_timeout: env_secs("RENARR_SPEECH_TIMEOUT_SECS", 60),
            analysis_prompt: std::env::var("RENARR_ANALYSIS_PROMPT").unwrap_or_default(),
            narration_prompt: std::env::var("RENARR_NARRATION_PROMPT").unwrap_or_default(),
        }
    }

    /// Retry policy wrapped around every non-segment step.
    pub fn step_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.step_max_attempts, self.step_base_delay, 2.0)
    }

    /// Local retry policy inside each segment pipeline.
    pub fn segment_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.segment_max_attempts, self.segment_base_delay, 2.0)
    }
}
