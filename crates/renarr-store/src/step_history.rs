//! Step history ledger.
//!
//! Append-per-attempt audit trail of every step execution. At most one
//! `running` record may exist for a given (job, step) pair:
//! `mark_step_started` first fails any stale running record for the
//! same step before inserting the new attempt.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tracing::warn;

use renarr_models::{JobId, StepKind, StepStatus};

use crate::error::{StoreError, StoreResult};
use crate::Store;

/// One step attempt, as persisted.
#[derive(Debug, Clone)]
pub struct StepHistoryRecord {
    pub id: i64,
    pub job_id: JobId,
    pub step_kind: StepKind,
    pub segment_ordinal: Option<u32>,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_record(row: &Row<'_>) -> Result<StepHistoryRecord, rusqlite::Error> {
    Ok(StepHistoryRecord {
        id: row.get(0)?,
        job_id: JobId::from_string(row.get::<_, String>(1)?),
        step_kind: StepKind::parse(&row.get::<_, String>(2)?)
            .unwrap_or(StepKind::AnalyzeVideo),
        segment_ordinal: row.get(3)?,
        status: StepStatus::parse(&row.get::<_, String>(4)?).unwrap_or(StepStatus::Failed),
        started_at: parse_ts(&row.get::<_, String>(5)?),
        ended_at: row
            .get::<_, Option<String>>(6)?
            .as_deref()
            .map(parse_ts),
        duration_ms: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
        input: row
            .get::<_, Option<String>>(8)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        output: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(10)?,
    })
}

const RECORD_COLUMNS: &str = "id, job_id, step_kind, segment_ordinal, status, started_at, \
                              ended_at, duration_ms, input, output, error_message";

impl Store {
    /// Record the start of a step attempt, returning the record id.
    ///
    /// Any stale `running` record for the same (job, step) pair is
    /// first transitioned to `failed` with the reason "step was
    /// restarted", so a crash mid-step cannot leave two running rows.
    pub fn mark_step_started(
        &self,
        job_id: &JobId,
        step_kind: StepKind,
        segment_ordinal: Option<u32>,
        input: Option<&serde_json::Value>,
    ) -> StoreResult<i64> {
        let input_json = match input {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        self.write(|tx| {
            let now = Utc::now().to_rfc3339();

            let stale = tx.execute(
                "UPDATE step_history
                 SET status = 'failed', ended_at = ?, error_message = 'step was restarted'
                 WHERE job_id = ? AND step_kind = ? AND segment_ordinal IS ? AND status = 'running'",
                params![&now, job_id.as_str(), step_kind.as_str(), segment_ordinal],
            )?;
            if stale > 0 {
                warn!(
                    job_id = %job_id,
                    step = %step_kind,
                    stale_records = stale,
                    "Failed stale running step records before new attempt"
                );
            }

            tx.execute(
                "INSERT INTO step_history (job_id, step_kind, segment_ordinal, status, started_at, input)
                 VALUES (?, ?, ?, 'running', ?, ?)",
                params![
                    job_id.as_str(),
                    step_kind.as_str(),
                    segment_ordinal,
                    &now,
                    input_json.as_deref(),
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Mark a step attempt completed with its output snapshot.
    pub fn mark_step_completed(
        &self,
        record_id: i64,
        output: Option<&serde_json::Value>,
    ) -> StoreResult<()> {
        let output_json = match output {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        self.finish_step(record_id, StepStatus::Completed, output_json.as_deref(), None)
    }

    /// Mark a step attempt failed with its error message.
    pub fn mark_step_failed(&self, record_id: i64, error: &str) -> StoreResult<()> {
        self.finish_step(record_id, StepStatus::Failed, None, Some(error))
    }

    fn finish_step(
        &self,
        record_id: i64,
        status: StepStatus,
        output: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.write(|tx| {
            let now = Utc::now();
            let updated = tx.execute(
                "UPDATE step_history
                 SET status = ?,
                     ended_at = ?,
                     duration_ms = CAST(
                         (julianday(?) - julianday(started_at)) * 86400000 AS INTEGER),
                     output = COALESCE(?, output),
                     error_message = COALESCE(?, error_message)
                 WHERE id = ? AND status = 'running'",
                params![
                    status.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                    output,
                    error,
                    record_id,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("running step record"));
            }
            Ok(())
        })
    }

    /// All attempts for a job, oldest first.
    pub fn list_step_history(&self, job_id: &JobId) -> StoreResult<Vec<StepHistoryRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM step_history WHERE job_id = ? ORDER BY id ASC",
                RECORD_COLUMNS
            ))?;
            let records = stmt
                .query_map([job_id.as_str()], map_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    /// Count of `running` records for one (job, step) pair.
    pub fn running_record_count(&self, job_id: &JobId, step_kind: StepKind) -> StoreResult<u32> {
        self.read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM step_history
                 WHERE job_id = ? AND step_kind = ? AND status = 'running'",
                params![job_id.as_str(), step_kind.as_str()],
                |r| r.get(0),
            )
            .map_err(StoreError::Database)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renarr_models::{Job, JobConfig};

    fn seeded_store() -> (Store, JobId) {
        let store = Store::in_memory().unwrap();
        let job = Job::new(vec!["file:///in.mp4".to_string()], JobConfig::default());
        store.create_job(&job).unwrap();
        (store, job.id)
    }

    #[test]
    fn test_attempt_lifecycle() {
        let (store, job_id) = seeded_store();

        let input = serde_json::json!({"sources": 1});
        let id = store
            .mark_step_started(&job_id, StepKind::AnalyzeVideo, None, Some(&input))
            .unwrap();

        let output = serde_json::json!({"segments": 5});
        store.mark_step_completed(id, Some(&output)).unwrap();

        let history = store.list_step_history(&job_id).unwrap();
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.status, StepStatus::Completed);
        assert_eq!(record.input, Some(input));
        assert_eq!(record.output, Some(output));
        assert!(record.ended_at.is_some());
        assert!(record.duration_ms.is_some());
    }

    #[test]
    fn test_stale_running_record_is_failed() {
        let (store, job_id) = seeded_store();

        store
            .mark_step_started(&job_id, StepKind::CreateSegments, None, None)
            .unwrap();
        // Second start for the same step: the first running row must be
        // transitioned to failed, leaving exactly one running.
        store
            .mark_step_started(&job_id, StepKind::CreateSegments, None, None)
            .unwrap();

        assert_eq!(
            store
                .running_record_count(&job_id, StepKind::CreateSegments)
                .unwrap(),
            1
        );

        let history = store.list_step_history(&job_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, StepStatus::Failed);
        assert_eq!(
            history[0].error_message.as_deref(),
            Some("step was restarted")
        );
        assert_eq!(history[1].status, StepStatus::Running);
    }

    #[test]
    fn test_failed_attempt_keeps_error() {
        let (store, job_id) = seeded_store();

        let id = store
            .mark_step_started(&job_id, StepKind::ComposeFinal, None, None)
            .unwrap();
        store.mark_step_failed(id, "concatenate timed out").unwrap();

        let history = store.list_step_history(&job_id).unwrap();
        assert_eq!(history[0].status, StepStatus::Failed);
        assert_eq!(
            history[0].error_message.as_deref(),
            Some("concatenate timed out")
        );
    }

    #[test]
    fn test_finish_requires_running_record() {
        let (store, job_id) = seeded_store();

        let id = store
            .mark_step_started(&job_id, StepKind::ComposeFinal, None, None)
            .unwrap();
        store.mark_step_completed(id, None).unwrap();

        // Finishing twice is an error: the record is no longer running.
        let err = store.mark_step_failed(id, "late failure").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
