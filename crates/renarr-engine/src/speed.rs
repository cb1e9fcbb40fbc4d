//! Segment speed matching.
//!
//! Picks the synthesized narration candidate whose measured duration is
//! closest to the segment's target duration, then normalizes the speed
//! factor into the range the encoder can honor. Pure function, no I/O.

use crate::error::{EngineError, EngineResult};

/// Lowest speed factor the encoder accepts; below this the clip is
/// looped until the factor clears the floor.
pub const MIN_SPEED_FACTOR: f64 = 0.5;

/// Highest speed factor the encoder accepts; above this the clip is
/// pre-trimmed to `audio duration * MAX_SPEED_FACTOR`.
pub const MAX_SPEED_FACTOR: f64 = 5.0;

/// Outcome of matching a candidate set against a target duration.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedMatch {
    /// Index into the input candidate slice
    pub candidate_index: usize,
    /// target / candidate duration, uncorrected
    pub raw_factor: f64,
    /// Factor to actually apply, always within [0.5, 5.0]
    pub adjusted_factor: f64,
    /// Loop the clip this many times before re-timing
    pub loop_count: Option<u32>,
    /// Pre-trim the clip to the candidate duration * 5.0 before re-timing
    pub needs_trim: bool,
}

/// Select the candidate minimizing `|target/duration - 1|`, ties broken
/// by first-encountered index. Candidates with a non-positive measured
/// duration are ignored; an error is returned if none remain.
pub fn select_best_match(
    target_duration: f64,
    candidate_durations: &[f64],
) -> EngineResult<SpeedMatch> {
    if target_duration <= 0.0 {
        return Err(EngineError::validation(format!(
            "target duration must be positive, got {target_duration}"
        )));
    }

    let mut best: Option<(usize, f64, f64)> = None;
    for (index, duration) in candidate_durations.iter().copied().enumerate() {
        if duration <= 0.0 {
            continue;
        }
        let factor = target_duration / duration;
        let distance = (factor - 1.0).abs();
        match best {
            Some((_, _, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, factor, distance)),
        }
    }

    let (candidate_index, raw_factor, _) = best.ok_or_else(|| {
        EngineError::validation("no narration candidate has a valid duration")
    })?;

    let mut adjusted_factor = raw_factor;
    let mut loop_count = None;
    let mut needs_trim = false;

    if raw_factor < MIN_SPEED_FACTOR {
        // Clip too short to stretch further: loop it first.
        let count = (MIN_SPEED_FACTOR / raw_factor).ceil() as u32;
        adjusted_factor = raw_factor * count as f64;
        loop_count = Some(count);
    } else if raw_factor > MAX_SPEED_FACTOR {
        // Clip too long: pre-trim, then compress at the ceiling.
        adjusted_factor = MAX_SPEED_FACTOR;
        needs_trim = true;
    }

    Ok(SpeedMatch {
        candidate_index,
        raw_factor,
        adjusted_factor,
        loop_count,
        needs_trim,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_candidate_closest_to_unit_factor() {
        let result = select_best_match(12.4, &[11.0, 12.0, 13.5]).unwrap();
        assert_eq!(result.candidate_index, 1);
        assert!((result.raw_factor - 12.4 / 12.0).abs() < 1e-9);
        assert_eq!(result.loop_count, None);
        assert!(!result.needs_trim);
        assert_eq!(result.adjusted_factor, result.raw_factor);
    }

    #[test]
    fn test_short_clip_gets_looped() {
        let result = select_best_match(2.0, &[20.0]).unwrap();
        assert_eq!(result.candidate_index, 0);
        assert!((result.raw_factor - 0.1).abs() < 1e-9);
        assert_eq!(result.loop_count, Some(5));
        assert!((result.adjusted_factor - 0.5).abs() < 1e-9);
        assert!(!result.needs_trim);
    }

    #[test]
    fn test_long_clip_gets_trimmed() {
        let result = select_best_match(100.0, &[5.0]).unwrap();
        assert!((result.raw_factor - 20.0).abs() < 1e-9);
        assert!(result.needs_trim);
        assert_eq!(result.adjusted_factor, 5.0);
        assert_eq!(result.loop_count, None);
    }

    #[test]
    fn test_ties_break_to_first_index() {
        // 8/10 = 0.8 and 8/6.666... = 1.2 are equidistant from 1.0.
        let result = select_best_match(8.0, &[10.0, 8.0 / 1.2]).unwrap();
        assert_eq!(result.candidate_index, 0);
    }

    #[test]
    fn test_invalid_durations_are_filtered() {
        let result = select_best_match(10.0, &[0.0, -3.0, 9.0]).unwrap();
        assert_eq!(result.candidate_index, 2);
    }

    #[test]
    fn test_no_valid_candidate_is_an_error() {
        assert!(select_best_match(10.0, &[0.0, -1.0]).is_err());
        assert!(select_best_match(10.0, &[]).is_err());
    }

    #[test]
    fn test_adjusted_factor_always_in_range() {
        for target in [0.1, 0.5, 1.0, 3.0, 12.4, 50.0, 400.0] {
            for duration in [0.2, 1.0, 5.0, 20.0, 90.0] {
                let result = select_best_match(target, &[duration]).unwrap();
                assert!(
                    result.adjusted_factor >= MIN_SPEED_FACTOR - 1e-9
                        && result.adjusted_factor <= MAX_SPEED_FACTOR + 1e-9,
                    "target {} duration {} gave factor {}",
                    target,
                    duration,
                    result.adjusted_factor
                );
            }
        }
    }
}
