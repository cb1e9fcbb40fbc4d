//! Static workflow definition.
//!
//! A workflow is a code-defined graph of stages, each an ordered list
//! of steps. Conditions are explicit predicates selected at definition
//! time, not a runtime expression language.

use renarr_models::{JobConfig, StageId, StepKind};
use renarr_services::RetryPolicy;

use crate::config::EngineConfig;

/// Condition evaluated against job configuration before a step runs.
/// A false condition skips the step silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCondition {
    Always,
    /// Segment concurrency is at least this value
    MinConcurrency(usize),
    /// Segment concurrency is below this value
    BelowConcurrency(usize),
    /// The narration-optimization toggle is on
    NarrationOptimizationEnabled,
}

impl StepCondition {
    pub fn evaluate(&self, config: &JobConfig) -> bool {
        match self {
            StepCondition::Always => true,
            StepCondition::MinConcurrency(n) => config.effective_concurrency() >= *n,
            StepCondition::BelowConcurrency(n) => config.effective_concurrency() < *n,
            StepCondition::NarrationOptimizationEnabled => config.optimize_narration,
        }
    }
}

/// One step slot in a stage.
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub kind: StepKind,
    pub condition: StepCondition,
    pub retry: RetryPolicy,
}

/// An ordered group of steps.
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub steps: Vec<StepSpec>,
}

/// The full static workflow. Not persisted; purely structural.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub stages: Vec<Stage>,
}

impl WorkflowDefinition {
    /// Index of a stage within the definition, for resume.
    pub fn position_of(&self, stage: StageId) -> Option<usize> {
        self.stages.iter().position(|s| s.id == stage)
    }
}

/// The standard three-stage pipeline: analysis, render, compose.
pub fn default_workflow(config: &EngineConfig) -> WorkflowDefinition {
    let retry = config.step_retry();
    // AI-free steps fail for structural reasons; retrying them only
    // delays the terminal status.
    let no_retry = RetryPolicy::none();

    WorkflowDefinition {
        stages: vec![
            Stage {
                id: StageId::Analysis,
                steps: vec![
                    StepSpec {
                        kind: StepKind::AnalyzeVideo,
                        condition: StepCondition::Always,
                        retry: retry.clone(),
                    },
                    StepSpec {
                        kind: StepKind::OptimizeNarration,
                        condition: StepCondition::NarrationOptimizationEnabled,
                        retry: retry.clone(),
                    },
                    StepSpec {
                        kind: StepKind::CreateSegments,
                        condition: StepCondition::Always,
                        retry: no_retry.clone(),
                    },
                ],
            },
            Stage {
                id: StageId::Render,
                steps: vec![
                    StepSpec {
                        kind: StepKind::ProcessSegmentsParallel,
                        condition: StepCondition::MinConcurrency(2),
                        retry: no_retry.clone(),
                    },
                    StepSpec {
                        kind: StepKind::ProcessSegmentsSequential,
                        condition: StepCondition::BelowConcurrency(2),
                        retry: no_retry,
                    },
                ],
            },
            Stage {
                id: StageId::Compose,
                steps: vec![StepSpec {
                    kind: StepKind::ComposeFinal,
                    condition: StepCondition::Always,
                    retry,
                }],
            },
        ],
    }
}
