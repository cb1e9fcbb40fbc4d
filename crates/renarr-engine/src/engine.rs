//! Workflow execution engine.
//!
//! Walks the static workflow definition stage by stage, step by step,
//! with condition skipping, retry wrapping, checkpointing and step
//! history. A run always resolves to a terminal job status; no error
//! escapes past the engine's boundary.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use renarr_models::{ErrorCategory, Job, JobId, JobStatus, StageId};
use renarr_services::{abort_pair, run_with_retry, AbortHandle};
use renarr_store::{CheckpointUpdate, Store, StoreError};

use crate::admission::AdmissionQueue;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::JobLogger;
use crate::step::{build_step, JobContext, Services};
use crate::workflow::{StepSpec, WorkflowDefinition};

/// The orchestration engine. Constructed once at process start.
pub struct Engine {
    store: Store,
    services: Services,
    config: EngineConfig,
    admission: AdmissionQueue,
    running: Mutex<HashMap<JobId, AbortHandle>>,
}

/// Removes the per-job execution lock when the run ends.
struct RunGuard<'a> {
    running: &'a Mutex<HashMap<JobId, AbortHandle>>,
    job_id: JobId,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.job_id);
    }
}

impl Engine {
    pub fn new(store: Store, services: Services, config: EngineConfig) -> Self {
        Self {
            store,
            services,
            config,
            admission: AdmissionQueue::new(),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Run a pending job from the beginning.
    ///
    /// Rejects synchronously with [`EngineError::QueueFull`] when a job
    /// is already running process-wide, and with
    /// [`EngineError::AlreadyRunning`] when this job itself is running.
    /// Returns the job in its terminal state; in-run failures become a
    /// `failed` status, never an `Err`.
    pub async fn execute(
        &self,
        job_id: &JobId,
        workflow: &WorkflowDefinition,
    ) -> EngineResult<Job> {
        self.run(job_id, workflow, false).await
    }

    /// Re-enter a job at its checkpointed stage after a crash.
    pub async fn resume(&self, job_id: &JobId, workflow: &WorkflowDefinition) -> EngineResult<Job> {
        self.run(job_id, workflow, true).await
    }

    /// Request cancellation of a running job. Returns false if the job
    /// is not running in this process.
    pub fn abort(&self, job_id: &JobId) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.get(job_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Fail processing jobs whose heartbeat went stale: their process
    /// crashed without reaching a terminal status. Returns the ids it
    /// failed. Intended for a periodic external sweep.
    pub fn fail_stale_jobs(&self, staleness: Duration) -> EngineResult<Vec<JobId>> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let stale: Vec<JobId> = self
            .store
            .find_stale_jobs(staleness)?
            .into_iter()
            .filter(|id| !running.contains_key(id))
            .collect();
        drop(running);

        for id in &stale {
            warn!(job_id = %id, "Failing job with stale heartbeat");
            if let Err(e) = self.store.fail_job(
                id,
                ErrorCategory::Internal,
                "heartbeat went stale; the processing host likely crashed",
            ) {
                error!(job_id = %id, "Failed to mark stale job: {}", e);
            }
        }
        Ok(stale)
    }

    async fn run(
        &self,
        job_id: &JobId,
        workflow: &WorkflowDefinition,
        resume: bool,
    ) -> EngineResult<Job> {
        let _slot = self.admission.try_admit()?;
        let (abort, _lock) = self.lock_job(job_id)?;

        let job = self.store.get_job(job_id)?;
        match job.status {
            JobStatus::Pending => {
                self.store.update_job_status(job_id, JobStatus::Processing)?;
            }
            // A processing job can only be entered through resume; its
            // previous run crashed before reaching a terminal status.
            JobStatus::Processing if resume => {}
            JobStatus::Processing => {
                return Err(EngineError::AlreadyRunning(job_id.to_string()))
            }
            terminal => {
                return Err(EngineError::validation(format!(
                    "job is already {terminal}"
                )))
            }
        }
        self.store.init_state(job_id)?;

        let start_stage = if resume {
            self.store.get_state(job_id)?.stage
        } else {
            None
        };

        let job = self.store.get_job(job_id)?;
        let ctx = JobContext {
            store: self.store.clone(),
            services: self.services.clone(),
            config: self.config.clone(),
            job,
            abort,
        };

        let logger = JobLogger::new(job_id, "workflow");
        logger.log_start(if resume { "resuming" } else { "starting" });

        match self.run_workflow(&ctx, workflow, start_stage).await {
            Ok(()) => {
                self.store.update_job_status(job_id, JobStatus::Completed)?;
                logger.log_completion("all stages finished");
            }
            Err(e) => {
                let category = e.classify();
                logger.log_error(&format!("{} ({})", e, category));
                let message = format!("{}. {}", e, category.guidance());
                if let Err(store_err) = self.store.fail_job(job_id, category, &message) {
                    error!(
                        job_id = %job_id,
                        "Failed to persist terminal failure: {}", store_err
                    );
                }
            }
        }

        self.store.get_job(job_id).map_err(EngineError::from)
    }

    async fn run_workflow(
        &self,
        ctx: &JobContext,
        workflow: &WorkflowDefinition,
        start_stage: Option<StageId>,
    ) -> EngineResult<()> {
        let start_index = start_stage
            .and_then(|stage| workflow.position_of(stage))
            .unwrap_or(0);

        for stage in &workflow.stages[start_index..] {
            info!(job_id = %ctx.job.id, stage = %stage.id, "Stage started");
            self.store.update_state(
                &ctx.job.id,
                &CheckpointUpdate {
                    stage: Some(stage.id),
                    ..Default::default()
                },
            )?;

            for spec in &stage.steps {
                if !spec.condition.evaluate(&ctx.job.config) {
                    debug!(
                        job_id = %ctx.job.id,
                        step = %spec.kind,
                        "Step skipped by condition"
                    );
                    continue;
                }
                self.run_step(ctx, spec).await?;
            }
        }
        Ok(())
    }

    /// Run one step under its retry policy, recording a step-history
    /// attempt per try and checkpointing the output on success.
    async fn run_step(&self, ctx: &JobContext, spec: &StepSpec) -> EngineResult<()> {
        let step = build_step(spec.kind);
        self.store.touch_heartbeat(&ctx.job.id)?;

        let input = serde_json::to_value(&ctx.job.config)
            .map_err(StoreError::Serialization)?;

        let kind = spec.kind;
        let input = &input;
        let step = &*step;
        let output = run_with_retry(&spec.retry, kind.as_str(), || async move {
            let record_id = ctx
                .store
                .mark_step_started(&ctx.job.id, kind, None, Some(input))?;

            match step.execute(ctx).await {
                Ok(output) => {
                    let snapshot =
                        serde_json::to_value(&output).map_err(StoreError::Serialization)?;
                    ctx.store.mark_step_completed(record_id, Some(&snapshot))?;
                    Ok(output)
                }
                Err(e) => {
                    if let Err(mark_err) = ctx.store.mark_step_failed(record_id, &e.to_string()) {
                        warn!(
                            job_id = %ctx.job.id,
                            step = %kind,
                            "Failed to record step failure: {}", mark_err
                        );
                    }
                    Err(e)
                }
            }
        })
        .await?;

        self.store.update_state(
            &ctx.job.id,
            &CheckpointUpdate {
                step: Some(spec.kind),
                context: Some(output),
                ..Default::default()
            },
        )?;
        self.store.touch_heartbeat(&ctx.job.id)?;
        Ok(())
    }

    fn lock_job(
        &self,
        job_id: &JobId,
    ) -> EngineResult<(renarr_services::AbortSignal, RunGuard<'_>)> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.contains_key(job_id) {
            return Err(EngineError::AlreadyRunning(job_id.to_string()));
        }
        let (handle, signal) = abort_pair();
        running.insert(job_id.clone(), handle);
        Ok((
            signal,
            RunGuard {
                running: &self.running,
                job_id: job_id.clone(),
            },
        ))
    }
}
