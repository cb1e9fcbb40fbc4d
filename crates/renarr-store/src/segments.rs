//! Segment row operations.
//!
//! Segments are created in bulk with replace-all semantics (delete
//! then reinsert, never partial-patch) and mutated only by the segment
//! batch processor. A segment's terminal-success update and the
//! checkpoint counter increment commit in the same transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use renarr_models::{ArtifactRef, JobId, Segment, SegmentStatus};

use crate::checkpoint;
use crate::error::{StoreError, StoreResult};
use crate::Store;

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_segment(row: &Row<'_>) -> Result<Segment, rusqlite::Error> {
    let variants = row
        .get::<_, Option<String>>(6)?
        .and_then(|json| serde_json::from_str(&json).ok());
    Ok(Segment {
        job_id: JobId::from_string(row.get::<_, String>(0)?),
        ordinal: row.get(1)?,
        source_start: row.get(2)?,
        source_end: row.get(3)?,
        target_duration: row.get(4)?,
        narration: row.get(5)?,
        narration_variants: variants,
        passthrough: row.get(7)?,
        status: SegmentStatus::parse(&row.get::<_, String>(8)?).unwrap_or_default(),
        skipped: row.get(9)?,
        failure_reason: row.get(10)?,
        final_artifact: row.get::<_, Option<String>>(11)?.map(ArtifactRef::new),
        created_at: parse_ts(&row.get::<_, String>(12)?),
        updated_at: parse_ts(&row.get::<_, String>(13)?),
    })
}

const SEGMENT_COLUMNS: &str = "job_id, ordinal, source_start, source_end, target_duration, \
                               narration, narration_variants, passthrough, status, skipped, \
                               failure_reason, final_artifact, created_at, updated_at";

impl Store {
    /// Replace all segments for a job: delete then reinsert.
    pub fn replace_all_segments(&self, job_id: &JobId, segments: &[Segment]) -> StoreResult<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM narration_candidates WHERE job_id = ?",
                [job_id.as_str()],
            )?;
            tx.execute("DELETE FROM segments WHERE job_id = ?", [job_id.as_str()])?;

            let mut stmt = tx.prepare(
                "INSERT INTO segments (job_id, ordinal, source_start, source_end,
                        target_duration, narration, narration_variants, passthrough,
                        status, skipped, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for seg in segments {
                let variants = seg
                    .narration_variants
                    .as_ref()
                    .map(|v| serde_json::to_string(v))
                    .transpose()
                    .map_err(StoreError::from)?;
                stmt.execute(params![
                    job_id.as_str(),
                    seg.ordinal,
                    seg.source_start,
                    seg.source_end,
                    seg.target_duration,
                    seg.narration,
                    variants,
                    seg.passthrough,
                    seg.status.as_str(),
                    seg.skipped,
                    seg.created_at.to_rfc3339(),
                    seg.updated_at.to_rfc3339(),
                ])?;
            }
            Ok(())
        })
    }

    /// All segments for a job in ordinal order.
    pub fn list_segments(&self, job_id: &JobId) -> StoreResult<Vec<Segment>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM segments WHERE job_id = ? ORDER BY ordinal ASC",
                SEGMENT_COLUMNS
            ))?;
            let segments = stmt
                .query_map([job_id.as_str()], map_segment)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(segments)
        })
    }

    /// Fetch one segment by its composite key.
    pub fn get_segment(&self, job_id: &JobId, ordinal: u32) -> StoreResult<Segment> {
        self.read(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM segments WHERE job_id = ? AND ordinal = ?",
                    SEGMENT_COLUMNS
                ),
                params![job_id.as_str(), ordinal],
                map_segment,
            )
            .optional()?
            .ok_or(StoreError::not_found("segment"))
        })
    }

    /// Flag a segment as in-flight.
    pub fn mark_segment_processing(&self, job_id: &JobId, ordinal: u32) -> StoreResult<()> {
        self.set_segment_status(job_id, ordinal, SegmentStatus::Processing, None)
    }

    /// Terminal success: record the final artifact and bump the
    /// checkpoint's processed counter atomically.
    ///
    /// Returns the new counter value.
    pub fn complete_segment(
        &self,
        job_id: &JobId,
        ordinal: u32,
        artifact: &ArtifactRef,
    ) -> StoreResult<u32> {
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE segments
                 SET status = 'completed', final_artifact = ?, failure_reason = NULL,
                     updated_at = ?
                 WHERE job_id = ? AND ordinal = ?",
                params![
                    artifact.as_str(),
                    Utc::now().to_rfc3339(),
                    job_id.as_str(),
                    ordinal
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("segment"));
            }
            checkpoint::increment_in_tx(tx, job_id)
        })
    }

    /// Terminal failure: keep the reason on the row and continue.
    pub fn fail_segment(&self, job_id: &JobId, ordinal: u32, reason: &str) -> StoreResult<()> {
        self.set_segment_status(job_id, ordinal, SegmentStatus::Failed, Some(reason))
    }

    fn set_segment_status(
        &self,
        job_id: &JobId,
        ordinal: u32,
        status: SegmentStatus,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE segments
                 SET status = ?, failure_reason = COALESCE(?, failure_reason), updated_at = ?
                 WHERE job_id = ? AND ordinal = ?",
                params![
                    status.as_str(),
                    reason,
                    Utc::now().to_rfc3339(),
                    job_id.as_str(),
                    ordinal
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("segment"));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renarr_models::{Job, JobConfig, SegmentDraft};

    fn draft(id: u32, start: f64, end: f64) -> SegmentDraft {
        SegmentDraft {
            id,
            source_start: start,
            source_end: end,
            narration: format!("segment {}", id),
            narration_variants: None,
            passthrough: false,
        }
    }

    fn seeded_store(drafts: &[SegmentDraft]) -> (Store, JobId) {
        let store = Store::in_memory().unwrap();
        let job = Job::new(vec!["file:///in.mp4".to_string()], JobConfig::default());
        store.create_job(&job).unwrap();
        store.init_state(&job.id).unwrap();

        let segments: Vec<Segment> = drafts
            .iter()
            .enumerate()
            .map(|(i, d)| Segment::from_draft(job.id.clone(), i as u32, d))
            .collect();
        store.replace_all_segments(&job.id, &segments).unwrap();
        (store, job.id)
    }

    #[test]
    fn test_replace_all_is_destructive() {
        let (store, job_id) = seeded_store(&[draft(1, 0.0, 5.0), draft(2, 5.0, 9.0)]);
        assert_eq!(store.list_segments(&job_id).unwrap().len(), 2);

        let replacement = vec![Segment::from_draft(
            job_id.clone(),
            0,
            &draft(9, 0.0, 3.0),
        )];
        store.replace_all_segments(&job_id, &replacement).unwrap();

        let segments = store.list_segments(&job_id).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].narration, "segment 9");
    }

    #[test]
    fn test_complete_segment_bumps_counter_atomically() {
        let (store, job_id) = seeded_store(&[draft(1, 0.0, 5.0), draft(2, 5.0, 9.0)]);

        let counter = store
            .complete_segment(&job_id, 0, &ArtifactRef::new("file:///out/0.mp4"))
            .unwrap();
        assert_eq!(counter, 1);

        let counter = store
            .complete_segment(&job_id, 1, &ArtifactRef::new("file:///out/1.mp4"))
            .unwrap();
        assert_eq!(counter, 2);

        let seg = store.get_segment(&job_id, 0).unwrap();
        assert!(seg.is_terminal_success());
        assert_eq!(store.get_state(&job_id).unwrap().processed_segments, 2);
    }

    #[test]
    fn test_fail_segment_keeps_reason() {
        let (store, job_id) = seeded_store(&[draft(1, 0.0, 5.0)]);

        store.fail_segment(&job_id, 0, "mux failed").unwrap();

        let seg = store.get_segment(&job_id, 0).unwrap();
        assert_eq!(seg.status, SegmentStatus::Failed);
        assert_eq!(seg.failure_reason.as_deref(), Some("mux failed"));
        assert!(!seg.is_terminal_success());
    }

    #[test]
    fn test_skipped_drafts_are_marked() {
        let (store, job_id) = seeded_store(&[draft(1, 5.0, 2.0), draft(2, 0.0, 4.0)]);

        let segments = store.list_segments(&job_id).unwrap();
        assert!(segments[0].skipped);
        assert!(!segments[1].skipped);
    }
}
