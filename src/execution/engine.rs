//! Main execution engine - resolves and runs pipelines

use crate::{
    core::{
        error::{RunError, TaskError},
        ExecutionStatus, OperationKind, Pipeline, PipelineRun, RunResult, TaskRef, TaskRegistry,
    },
    execution::executor::{ExecutionResult, TaskExecutor},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        tasks: usize,
    },
    TaskStarted {
        task: TaskRef,
        index: usize,
        total: usize,
    },
    OperationCompleted {
        task: TaskRef,
        kind: OperationKind,
        files: usize,
    },
    TaskCompleted {
        task: TaskRef,
    },
    TaskFailed {
        task: TaskRef,
        error: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Anything that can run a resolved pipeline to completion
///
/// Runs are blocking; callers on an async runtime should use
/// `spawn_blocking`.
pub trait PipelineRunner: Send + Sync + 'static {
    fn run_pipeline(&self, pipeline: &Pipeline) -> RunResult;
}

/// Main pipeline execution engine
pub struct ExecutionEngine {
    registry: Arc<TaskRegistry>,
    executor: TaskExecutor,
    event_handlers: Vec<EventHandler>,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<TaskRegistry>, root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            executor: TaskExecutor::new(root),
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn root(&self) -> &Path {
        self.executor.root()
    }

    /// Resolve an alias or task name and run it
    pub fn run(&self, name: &str) -> RunResult {
        match self.registry.pipeline(name) {
            Ok(pipeline) => self.run_pipeline(&pipeline),
            Err(e) => self.rejected(name, e),
        }
    }

    /// Execute a pipeline
    ///
    /// The whole plan is resolved before any task runs, so an unknown
    /// reference fails without touching the filesystem. Execution stops at
    /// the first failing task.
    pub fn run_pipeline(&self, pipeline: &Pipeline) -> RunResult {
        let plan = match self.registry.expand(pipeline) {
            Ok(plan) => plan,
            Err(e) => return self.rejected(&pipeline.name, e),
        };

        if pipeline.is_empty() {
            info!("Pipeline {} has no tasks", pipeline.name);
        }

        let mut run = PipelineRun::new(&pipeline.name);
        let execution_id = run.execution_id;
        run.start();

        info!(
            "Starting pipeline execution: {} ({} tasks, {})",
            pipeline.name,
            plan.len(),
            execution_id
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            tasks: plan.len(),
        });

        let total = plan.len();
        for (index, definition) in plan.into_iter().enumerate() {
            let task = definition.task.clone();
            run.enter(&task);
            self.emit_event(ExecutionEvent::TaskStarted {
                task: task.clone(),
                index,
                total,
            });

            let result = self.executor.execute(definition, |report| {
                self.emit_event(ExecutionEvent::OperationCompleted {
                    task: task.clone(),
                    kind: report.kind,
                    files: report.files_read,
                });
            });

            match result {
                ExecutionResult::Success { .. } => {
                    self.emit_event(ExecutionEvent::TaskCompleted { task });
                }
                ExecutionResult::Failed { error, .. } => {
                    run.fail();
                    self.emit_event(ExecutionEvent::TaskFailed {
                        task: task.clone(),
                        error: error.to_string(),
                    });
                    self.emit_event(ExecutionEvent::PipelineCompleted {
                        execution_id,
                        status: ExecutionStatus::Failed,
                    });
                    error!("Pipeline {} failed at task {}", pipeline.name, task);

                    return RunResult::failure(
                        run,
                        Some(task.clone()),
                        RunError::Step {
                            task,
                            source: error,
                        },
                    );
                }
            }
        }

        run.complete();
        info!(
            "Pipeline execution finished: {} in {:?}",
            pipeline.name,
            run.duration().unwrap_or_default()
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: ExecutionStatus::Completed,
        });

        RunResult::success(run)
    }

    fn rejected(&self, name: &str, err: TaskError) -> RunResult {
        error!("Cannot run '{}': {}", name, err);
        let mut run = PipelineRun::new(name);
        run.fail();
        RunResult::failure(run, None, RunError::Task(err))
    }
}

impl PipelineRunner for ExecutionEngine {
    fn run_pipeline(&self, pipeline: &Pipeline) -> RunResult {
        ExecutionEngine::run_pipeline(self, pipeline)
    }
}
