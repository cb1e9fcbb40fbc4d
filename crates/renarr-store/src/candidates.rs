//! Narration candidate rows.

use rusqlite::{params, Row};

use renarr_models::{ArtifactRef, CandidateVersion, JobId, NarrationCandidate};

use crate::error::{StoreError, StoreResult};
use crate::Store;

fn map_candidate(row: &Row<'_>) -> Result<NarrationCandidate, rusqlite::Error> {
    Ok(NarrationCandidate {
        segment_ordinal: row.get(0)?,
        version: CandidateVersion::parse(&row.get::<_, String>(1)?)
            .unwrap_or(CandidateVersion::Normal),
        text: row.get(2)?,
        audio: ArtifactRef::new(row.get::<_, String>(3)?),
        duration_seconds: row.get(4)?,
        score: row.get(5)?,
        selected: row.get(6)?,
    })
}

const CANDIDATE_COLUMNS: &str =
    "segment_ordinal, version, text, audio, duration_seconds, score, selected";

impl Store {
    /// Replace the candidate set for one segment.
    ///
    /// A retried segment pipeline re-synthesizes all three candidates,
    /// so stale rows from the previous attempt are dropped first.
    pub fn replace_candidates(
        &self,
        job_id: &JobId,
        segment_ordinal: u32,
        candidates: &[NarrationCandidate],
    ) -> StoreResult<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM narration_candidates WHERE job_id = ? AND segment_ordinal = ?",
                params![job_id.as_str(), segment_ordinal],
            )?;
            let mut stmt = tx.prepare(
                "INSERT INTO narration_candidates
                     (job_id, segment_ordinal, version, text, audio, duration_seconds,
                      score, selected)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for c in candidates {
                stmt.execute(params![
                    job_id.as_str(),
                    segment_ordinal,
                    c.version.as_str(),
                    c.text,
                    c.audio.as_str(),
                    c.duration_seconds,
                    c.score,
                    c.selected,
                ])?;
            }
            Ok(())
        })
    }

    /// Mark exactly one candidate selected for a segment.
    pub fn select_candidate(
        &self,
        job_id: &JobId,
        segment_ordinal: u32,
        version: CandidateVersion,
        score: f64,
    ) -> StoreResult<()> {
        self.write(|tx| {
            tx.execute(
                "UPDATE narration_candidates SET selected = 0
                 WHERE job_id = ? AND segment_ordinal = ?",
                params![job_id.as_str(), segment_ordinal],
            )?;
            let updated = tx.execute(
                "UPDATE narration_candidates SET selected = 1, score = ?
                 WHERE job_id = ? AND segment_ordinal = ? AND version = ?",
                params![score, job_id.as_str(), segment_ordinal, version.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("narration candidate"));
            }
            Ok(())
        })
    }

    /// All candidates for a segment, in stored order.
    pub fn list_candidates(
        &self,
        job_id: &JobId,
        segment_ordinal: u32,
    ) -> StoreResult<Vec<NarrationCandidate>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM narration_candidates
                 WHERE job_id = ? AND segment_ordinal = ?
                 ORDER BY version ASC",
                CANDIDATE_COLUMNS
            ))?;
            let candidates = stmt
                .query_map(params![job_id.as_str(), segment_ordinal], map_candidate)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(candidates)
        })
    }
}
