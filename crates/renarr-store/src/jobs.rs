//! Job row operations.
//!
//! The execution engine owns job status transitions; everything else
//! reads. Transitions are forward-only with the exception of
//! `reset_job`, which clears all dependent rows and returns the job to
//! `pending`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use renarr_models::{ErrorCategory, Job, JobConfig, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};
use crate::Store;

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn map_job(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let source_uris: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(2)?).unwrap_or_default();
    let config: JobConfig =
        serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default();

    Ok(Job {
        id: JobId::from_string(row.get::<_, String>(0)?),
        status: JobStatus::parse(&row.get::<_, String>(1)?).unwrap_or_default(),
        source_uris,
        config,
        error_category: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .and_then(ErrorCategory::parse),
        error_message: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
        started_at: parse_opt_ts(row.get(8)?),
        completed_at: parse_opt_ts(row.get(9)?),
    })
}

const JOB_COLUMNS: &str = "id, status, source_uris, config, error_category, error_message, \
                           created_at, updated_at, started_at, completed_at";

fn get_job_inner(conn: &Connection, id: &JobId) -> StoreResult<Job> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
        [id.as_str()],
        map_job,
    )
    .optional()?
    .ok_or(StoreError::not_found("job"))
}

impl Store {
    /// Insert a new job row.
    pub fn create_job(&self, job: &Job) -> StoreResult<()> {
        let source_uris = serde_json::to_string(&job.source_uris)?;
        let config = serde_json::to_string(&job.config)?;

        self.write(|tx| {
            tx.execute(
                "INSERT INTO jobs (id, status, source_uris, config, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    job.id.as_str(),
                    job.status.as_str(),
                    &source_uris,
                    &config,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetch a job by id.
    pub fn get_job(&self, id: &JobId) -> StoreResult<Job> {
        self.read(|conn| get_job_inner(conn, id))
    }

    /// Transition a job's status, enforcing forward-only transitions.
    pub fn update_job_status(&self, id: &JobId, next: JobStatus) -> StoreResult<()> {
        self.write(|tx| {
            let current: String = tx
                .query_row("SELECT status FROM jobs WHERE id = ?", [id.as_str()], |r| {
                    r.get(0)
                })
                .optional()?
                .ok_or(StoreError::not_found("job"))?;
            let current =
                JobStatus::parse(&current).ok_or(StoreError::not_found("job status"))?;

            if !current.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    from: current.as_str().to_string(),
                    to: next.as_str().to_string(),
                });
            }

            let now = Utc::now().to_rfc3339();
            match next {
                JobStatus::Processing => tx.execute(
                    "UPDATE jobs SET status = ?, started_at = ?, updated_at = ? WHERE id = ?",
                    params![next.as_str(), &now, &now, id.as_str()],
                )?,
                JobStatus::Completed => tx.execute(
                    "UPDATE jobs SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?",
                    params![next.as_str(), &now, &now, id.as_str()],
                )?,
                _ => tx.execute(
                    "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?",
                    params![next.as_str(), &now, id.as_str()],
                )?,
            };
            Ok(())
        })
    }

    /// Mark a job failed with its error classification.
    pub fn fail_job(
        &self,
        id: &JobId,
        category: ErrorCategory,
        message: &str,
    ) -> StoreResult<()> {
        self.write(|tx| {
            let now = Utc::now().to_rfc3339();
            let updated = tx.execute(
                "UPDATE jobs SET status = 'failed', error_category = ?, error_message = ?,
                        completed_at = ?, updated_at = ?
                 WHERE id = ? AND status = 'processing'",
                params![category.as_str(), message, &now, &now, id.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("processing job"));
            }
            Ok(())
        })
    }

    /// Update the job's liveness timestamp.
    ///
    /// Called before and after every step; a processing job whose
    /// heartbeat goes stale is assumed to have crashed.
    pub fn touch_heartbeat(&self, id: &JobId) -> StoreResult<()> {
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE jobs SET heartbeat_at = ? WHERE id = ?",
                params![Utc::now().to_rfc3339(), id.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("job"));
            }
            Ok(())
        })
    }

    /// Processing jobs whose heartbeat is older than `staleness`.
    ///
    /// Used by an external sweeper to detect zombie jobs left behind
    /// by a crashed process.
    pub fn find_stale_jobs(&self, staleness: std::time::Duration) -> StoreResult<Vec<JobId>> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(staleness).unwrap_or_else(|_| ChronoDuration::zero());
        let cutoff = cutoff.to_rfc3339();

        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM jobs
                 WHERE status = 'processing' AND (heartbeat_at IS NULL OR heartbeat_at < ?)",
            )?;
            let ids = stmt
                .query_map([&cutoff], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids.into_iter().map(JobId::from_string).collect())
        })
    }

    /// Full reset: back to `pending`, clearing the checkpoint, step
    /// history, segments and candidates. The only backward transition.
    pub fn reset_job(&self, id: &JobId) -> StoreResult<()> {
        self.write(|tx| {
            let now = Utc::now().to_rfc3339();
            let updated = tx.execute(
                "UPDATE jobs SET status = 'pending', error_category = NULL,
                        error_message = NULL, heartbeat_at = NULL, started_at = NULL,
                        completed_at = NULL, updated_at = ?
                 WHERE id = ?",
                params![&now, id.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("job"));
            }
            tx.execute("DELETE FROM checkpoints WHERE job_id = ?", [id.as_str()])?;
            tx.execute("DELETE FROM step_history WHERE job_id = ?", [id.as_str()])?;
            tx.execute(
                "DELETE FROM narration_candidates WHERE job_id = ?",
                [id.as_str()],
            )?;
            tx.execute("DELETE FROM segments WHERE job_id = ?", [id.as_str()])?;
            Ok(())
        })?;

        info!(job_id = %id, "Job reset to pending");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renarr_models::JobConfig;

    fn new_job() -> Job {
        Job::new(vec!["file:///in.mp4".to_string()], JobConfig::default())
    }

    #[test]
    fn test_create_and_get() {
        let store = Store::in_memory().unwrap();
        let job = new_job();
        store.create_job(&job).unwrap();

        let loaded = store.get_job(&job.id).unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.source_uris, job.source_uris);
    }

    #[test]
    fn test_get_missing() {
        let store = Store::in_memory().unwrap();
        let err = store.get_job(&JobId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_forward_only_transitions_enforced() {
        let store = Store::in_memory().unwrap();
        let job = new_job();
        store.create_job(&job).unwrap();

        store
            .update_job_status(&job.id, JobStatus::Processing)
            .unwrap();
        store
            .update_job_status(&job.id, JobStatus::Completed)
            .unwrap();

        let err = store
            .update_job_status(&job.id, JobStatus::Processing)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_fail_job_records_classification() {
        let store = Store::in_memory().unwrap();
        let job = new_job();
        store.create_job(&job).unwrap();
        store
            .update_job_status(&job.id, JobStatus::Processing)
            .unwrap();

        store
            .fail_job(&job.id, ErrorCategory::AllSegmentsFailed, "0 of 5 rendered")
            .unwrap();

        let loaded = store.get_job(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(
            loaded.error_category,
            Some(ErrorCategory::AllSegmentsFailed)
        );
        assert_eq!(loaded.error_message.as_deref(), Some("0 of 5 rendered"));
    }

    #[test]
    fn test_stale_job_detection() {
        let store = Store::in_memory().unwrap();
        let job = new_job();
        store.create_job(&job).unwrap();
        store
            .update_job_status(&job.id, JobStatus::Processing)
            .unwrap();

        // No heartbeat yet: stale by definition.
        let stale = store
            .find_stale_jobs(std::time::Duration::from_secs(60))
            .unwrap();
        assert_eq!(stale, vec![job.id.clone()]);

        store.touch_heartbeat(&job.id).unwrap();
        let stale = store
            .find_stale_jobs(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(stale.is_empty());

        // A zero staleness window flags even a fresh heartbeat.
        let stale = store
            .find_stale_jobs(std::time::Duration::from_secs(0))
            .unwrap();
        assert_eq!(stale.len(), 1);
    }

    #[test]
    fn test_reset_returns_to_pending() {
        let store = Store::in_memory().unwrap();
        let job = new_job();
        store.create_job(&job).unwrap();
        store
            .update_job_status(&job.id, JobStatus::Processing)
            .unwrap();
        store
            .fail_job(&job.id, ErrorCategory::Transient, "network down")
            .unwrap();

        store.reset_job(&job.id).unwrap();

        let loaded = store.get_job(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert!(loaded.error_category.is_none());
        assert!(loaded.error_message.is_none());
    }
}
