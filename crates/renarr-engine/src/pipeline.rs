//! Per-segment rendering pipeline.
//!
//! Dubbed segments: trim the source range, synthesize three narration
//! candidates at distinct speech rates, pick the best timing match,
//! loop or pre-trim when the speed factor is out of range, re-time,
//! merge the audio, optionally burn captions. Passthrough segments keep
//! their original audio and only trim + re-encode.

use tracing::debug;

use renarr_models::{ArtifactRef, CandidateVersion, NarrationCandidate, Segment};
use renarr_services::{ServiceError, SynthesizedSpeech, VoiceOptions};

use crate::error::{EngineError, EngineResult};
use crate::speed::{self, SpeedMatch};
use crate::step::{with_timeout, JobContext};

/// Render one segment to its final artifact.
pub async fn render_segment(ctx: &JobContext, segment: &Segment) -> EngineResult<ArtifactRef> {
    ctx.abort.check()?;

    let source = ctx
        .job
        .source_uris
        .first()
        .map(|uri| ArtifactRef::new(uri.clone()))
        .ok_or_else(|| EngineError::validation("job has no source videos"))?;

    let media = &ctx.services.media;
    let clip = with_timeout(
        ctx.config.media_timeout,
        "trim",
        media.trim(&source, segment.source_start, segment.source_end),
    )
    .await?;

    if segment.passthrough {
        // Original audio stays; only normalize the cut.
        let artifact = with_timeout(ctx.config.media_timeout, "reencode", media.reencode(&clip))
            .await?;
        return Ok(artifact);
    }

    ctx.abort.check()?;
    let mut candidates = synthesize_candidates(ctx, segment).await?;
    for candidate in &mut candidates {
        if candidate.duration_seconds > 0.0 {
            candidate.score =
                Some((segment.target_duration / candidate.duration_seconds - 1.0).abs());
        }
    }
    ctx.store
        .replace_candidates(&ctx.job.id, segment.ordinal, &candidates)?;

    let durations: Vec<f64> = candidates.iter().map(|c| c.duration_seconds).collect();
    let matched = speed::select_best_match(segment.target_duration, &durations)?;
    let selected = &candidates[matched.candidate_index];

    debug!(
        job_id = %ctx.job.id,
        segment = segment.ordinal,
        version = %selected.version,
        raw_factor = matched.raw_factor,
        adjusted_factor = matched.adjusted_factor,
        "Speed match selected"
    );

    ctx.abort.check()?;
    let video = retime_clip(ctx, &clip, segment, selected, &matched).await?;

    let mut rendered = with_timeout(
        ctx.config.media_timeout,
        "merge",
        ctx.services.media.merge(&video, &selected.audio),
    )
    .await?;

    if ctx.job.config.burn_captions {
        ctx.abort.check()?;
        let subtitles = with_timeout(
            ctx.config.media_timeout,
            "render subtitles",
            ctx.services
                .media
                .render_subtitles(&selected.text, selected.duration_seconds),
        )
        .await?;
        rendered = with_timeout(
            ctx.config.media_timeout,
            "burn captions",
            ctx.services.media.burn_captions(&rendered, &subtitles),
        )
        .await?;
    }

    ctx.store.select_candidate(
        &ctx.job.id,
        segment.ordinal,
        selected.version,
        (matched.raw_factor - 1.0).abs(),
    )?;

    Ok(rendered)
}

/// Synthesize the three speech-rate candidates, one call per version so
/// each pairs its own text variant with its own rate. Synthesis targets
/// the quota-constrained AI, so each call goes through the dispatcher.
async fn synthesize_candidates(
    ctx: &JobContext,
    segment: &Segment,
) -> EngineResult<Vec<NarrationCandidate>> {
    let mut candidates = Vec::with_capacity(CandidateVersion::ALL.len());

    for (index, version) in CandidateVersion::ALL.iter().enumerate() {
        let text = segment.narration_variant(index).to_string();
        let options = VoiceOptions {
            language: ctx.job.config.language.clone(),
            speech_rate: version.speech_rate(),
        };

        let texts = vec![text.clone()];
        let mut speech = ctx
            .services
            .dispatcher
            .execute(ctx.job.config.platform, || {
                with_timeout(
                    ctx.config.speech_timeout,
                    "speech synthesis",
                    ctx.services.speech.synthesize_many(&texts, &options),
                )
            })
            .await?;

        let synthesized: SynthesizedSpeech = match speech.len() {
            1 => speech.remove(0),
            n => {
                return Err(EngineError::Service(ServiceError::invalid_response(
                    format!("expected 1 synthesized utterance, got {n}"),
                )))
            }
        };

        candidates.push(NarrationCandidate::new(
            segment.ordinal,
            *version,
            text,
            synthesized.audio,
            synthesized.duration_seconds,
        ));
    }

    Ok(candidates)
}

/// Apply the match's loop/trim correction, then re-time the clip so its
/// duration lands on the selected candidate's audio duration.
async fn retime_clip(
    ctx: &JobContext,
    clip: &ArtifactRef,
    segment: &Segment,
    selected: &NarrationCandidate,
    matched: &SpeedMatch,
) -> EngineResult<ArtifactRef> {
    let media = &ctx.services.media;

    let corrected = if let Some(count) = matched.loop_count {
        with_timeout(
            ctx.config.media_timeout,
            "loop clip",
            media.loop_clip(clip, count, segment.target_duration * count as f64),
        )
        .await?
    } else if matched.needs_trim {
        with_timeout(
            ctx.config.media_timeout,
            "pre-trim",
            media.trim(
                clip,
                0.0,
                selected.duration_seconds * speed::MAX_SPEED_FACTOR,
            ),
        )
        .await?
    } else {
        clip.clone()
    };

    let retimed = with_timeout(
        ctx.config.media_timeout,
        "adjust speed",
        media.adjust_speed(&corrected, matched.adjusted_factor),
    )
    .await?;

    Ok(retimed)
}
