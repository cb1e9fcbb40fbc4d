//! Workflow orchestration core.
//!
//! Walks a static stage/step workflow with checkpointed resume,
//! per-step retry policies, a bounded-concurrency segment batch
//! processor, rate-limited AI dispatch and deterministic segment
//! speed matching.

pub mod admission;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod speed;
pub mod step;
pub mod steps;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use admission::AdmissionQueue;
pub use batch::BatchOutcome;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use logging::{init_tracing, JobLogger};
pub use speed::{select_best_match, SpeedMatch};
pub use step::{build_step, JobContext, Services, Step};
pub use workflow::{default_workflow, Stage, StepCondition, StepSpec, WorkflowDefinition};
