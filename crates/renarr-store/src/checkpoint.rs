//! Checkpoint/state store.
//!
//! One mutable row per job recording where the job is: current stage
//! and step, step-scoped context, segment counters and final artifact
//! pointers. The engine updates the stage/step pointers; the segment
//! batch processor bumps the processed counter.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};

use renarr_models::{ArtifactRef, JobId, StageId, StepContext, StepKind};

use crate::error::{StoreError, StoreResult};
use crate::Store;

/// The mutable "resume point" record for a job.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub job_id: JobId,
    pub stage: Option<StageId>,
    pub step: Option<StepKind>,
    pub context: Option<StepContext>,
    pub total_segments: u32,
    pub processed_segments: u32,
    pub final_artifact: Option<ArtifactRef>,
    pub intermediate_artifacts: Vec<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial field merge applied by [`Store::update_state`].
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CheckpointUpdate {
    pub stage: Option<StageId>,
    pub step: Option<StepKind>,
    pub context: Option<StepContext>,
    pub total_segments: Option<u32>,
    pub final_artifact: Option<ArtifactRef>,
    pub intermediate_artifacts: Option<Vec<ArtifactRef>>,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_checkpoint(row: &Row<'_>) -> Result<Checkpoint, rusqlite::Error> {
    let context = row
        .get::<_, Option<String>>(3)?
        .and_then(|s| serde_json::from_str(&s).ok());
    let intermediate: Vec<ArtifactRef> = row
        .get::<_, Option<String>>(7)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(Checkpoint {
        job_id: JobId::from_string(row.get::<_, String>(0)?),
        stage: row.get::<_, Option<String>>(1)?.as_deref().and_then(StageId::parse),
        step: row.get::<_, Option<String>>(2)?.as_deref().and_then(StepKind::parse),
        context,
        total_segments: row.get(4)?,
        processed_segments: row.get(5)?,
        final_artifact: row.get::<_, Option<String>>(6)?.map(ArtifactRef::new),
        intermediate_artifacts: intermediate,
        created_at: parse_ts(&row.get::<_, String>(8)?),
        updated_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

const CHECKPOINT_COLUMNS: &str = "job_id, stage, step, context, total_segments, \
                                  processed_segments, final_artifact, intermediate_artifacts, \
                                  created_at, updated_at";

/// Bump the processed counter inside an already-open transaction.
///
/// Exposed to the segments repository so a segment's terminal-success
/// update and the counter increment commit atomically.
pub(crate) fn increment_in_tx(tx: &Transaction, job_id: &JobId) -> StoreResult<u32> {
    let updated = tx.execute(
        "UPDATE checkpoints
         SET processed_segments = processed_segments + 1, updated_at = ?
         WHERE job_id = ?",
        params![Utc::now().to_rfc3339(), job_id.as_str()],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found("checkpoint"));
    }
    tx.query_row(
        "SELECT processed_segments FROM checkpoints WHERE job_id = ?",
        [job_id.as_str()],
        |r| r.get(0),
    )
    .map_err(StoreError::Database)
}

impl Store {
    /// Create the checkpoint row for a job if it does not exist yet.
    pub fn init_state(&self, job_id: &JobId) -> StoreResult<()> {
        self.write(|tx| {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO checkpoints (job_id, created_at, updated_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT(job_id) DO NOTHING",
                params![job_id.as_str(), &now, &now],
            )?;
            Ok(())
        })
    }

    /// Fetch the checkpoint for a job.
    pub fn get_state(&self, job_id: &JobId) -> StoreResult<Checkpoint> {
        self.read(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM checkpoints WHERE job_id = ?", CHECKPOINT_COLUMNS),
                [job_id.as_str()],
                map_checkpoint,
            )
            .optional()?
            .ok_or(StoreError::not_found("checkpoint"))
        })
    }

    /// Apply a partial field merge to the checkpoint.
    pub fn update_state(&self, job_id: &JobId, update: &CheckpointUpdate) -> StoreResult<()> {
        let context_json = match &update.context {
            Some(ctx) => Some(serde_json::to_string(ctx)?),
            None => None,
        };
        let intermediate_json = match &update.intermediate_artifacts {
            Some(refs) => Some(serde_json::to_string(refs)?),
            None => None,
        };

        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE checkpoints SET
                     stage = COALESCE(?, stage),
                     step = COALESCE(?, step),
                     context = COALESCE(?, context),
                     total_segments = COALESCE(?, total_segments),
                     final_artifact = COALESCE(?, final_artifact),
                     intermediate_artifacts = COALESCE(?, intermediate_artifacts),
                     updated_at = ?
                 WHERE job_id = ?",
                params![
                    update.stage.map(|s| s.as_str()),
                    update.step.map(|s| s.as_str()),
                    context_json.as_deref(),
                    update.total_segments,
                    update.final_artifact.as_ref().map(|a| a.as_str()),
                    intermediate_json.as_deref(),
                    Utc::now().to_rfc3339(),
                    job_id.as_str(),
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("checkpoint"));
            }
            Ok(())
        })
    }

    /// Atomically bump the processed-segment counter.
    ///
    /// Fails loudly if the checkpoint row does not exist; a missing row
    /// during segment processing means the job state is corrupt.
    pub fn increment_processed_segments(&self, job_id: &JobId) -> StoreResult<u32> {
        self.write(|tx| increment_in_tx(tx, job_id))
    }
}
