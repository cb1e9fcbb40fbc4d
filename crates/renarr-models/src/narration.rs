//! Narration candidates.
//!
//! Each dubbed segment gets exactly three synthesized speech candidates
//! at distinct target speech rates; exactly one is selected once the
//! segment renders successfully.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ArtifactRef;

/// Which of the three speech-rate variants a candidate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateVersion {
    Slow,
    Normal,
    Fast,
}

impl CandidateVersion {
    pub const ALL: [CandidateVersion; 3] = [
        CandidateVersion::Slow,
        CandidateVersion::Normal,
        CandidateVersion::Fast,
    ];

    /// Target speech rate passed to the synthesis provider.
    pub fn speech_rate(&self) -> f64 {
        match self {
            CandidateVersion::Slow => 0.85,
            CandidateVersion::Normal => 1.0,
            CandidateVersion::Fast => 1.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateVersion::Slow => "slow",
            CandidateVersion::Normal => "normal",
            CandidateVersion::Fast => "fast",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slow" => Some(CandidateVersion::Slow),
            "normal" => Some(CandidateVersion::Normal),
            "fast" => Some(CandidateVersion::Fast),
            _ => None,
        }
    }
}

impl fmt::Display for CandidateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One synthesized speech track considered for a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationCandidate {
    /// Ordinal of the owning segment
    pub segment_ordinal: u32,

    /// Speech-rate variant
    pub version: CandidateVersion,

    /// Text that was synthesized
    pub text: String,

    /// Synthesized audio artifact
    pub audio: ArtifactRef,

    /// Measured audio duration (seconds)
    pub duration_seconds: f64,

    /// Speed-alignment score: |target/duration - 1|, lower is better
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Exactly one candidate per segment is selected on success
    #[serde(default)]
    pub selected: bool,
}

impl NarrationCandidate {
    pub fn new(
        segment_ordinal: u32,
        version: CandidateVersion,
        text: impl Into<String>,
        audio: ArtifactRef,
        duration_seconds: f64,
    ) -> Self {
        Self {
            segment_ordinal,
            version,
            text: text.into(),
            audio,
            duration_seconds,
            score: None,
            selected: false,
        }
    }
}
