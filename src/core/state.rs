//! Execution state models

use crate::core::{error::RunError, task::TaskRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Pipeline completed successfully
    Completed,
    /// Pipeline failed
    Failed,
}

/// State of one pipeline invocation
///
/// Created per run and discarded afterwards. It only tracks which task is
/// running and whether anything failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Name of the pipeline being run
    pub pipeline: String,

    /// Current execution status
    pub status: ExecutionStatus,

    /// Task currently running
    pub current: Option<TaskRef>,

    /// Whether any task has failed
    pub failed: bool,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            status: ExecutionStatus::Pending,
            current: None,
            failed: false,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the task now running
    pub fn enter(&mut self, task: &TaskRef) {
        self.current = Some(task.clone());
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.current = None;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed, keeping the failing task as current
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.failed = true;
        self.completed_at = Some(Utc::now());
    }

    /// Wall-clock duration of a finished run
    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}

/// Outcome of running a pipeline
#[derive(Debug)]
pub struct RunResult {
    pub succeeded: bool,

    /// Task whose operation failed, if any
    pub failed_at: Option<TaskRef>,

    pub error: Option<RunError>,

    /// Final run state
    pub run: PipelineRun,
}

impl RunResult {
    pub fn success(run: PipelineRun) -> Self {
        Self {
            succeeded: true,
            failed_at: None,
            error: None,
            run,
        }
    }

    pub fn failure(run: PipelineRun, failed_at: Option<TaskRef>, error: RunError) -> Self {
        Self {
            succeeded: false,
            failed_at,
            error: Some(error),
            run,
        }
    }

    /// Whether the run never started because a reference could not be resolved
    pub fn is_usage_error(&self) -> bool {
        matches!(self.error, Some(RunError::Task(_)))
    }
}
