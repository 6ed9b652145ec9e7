//! Task executor - runs the file operations of one task definition

use crate::{
    core::{error::StepError, task::TaskDefinition},
    execution::operations::{self, OperationReport},
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Result of executing a task
#[derive(Debug)]
pub enum ExecutionResult {
    /// Every operation completed
    Success { reports: Vec<OperationReport> },
    /// An operation failed; later operations were not attempted
    Failed {
        /// Index of the failing operation within the task
        operation: usize,
        /// Reports of the operations that completed before the failure
        reports: Vec<OperationReport>,
        error: StepError,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }
}

/// Executes a single task against a project root
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    root: PathBuf,
}

impl TaskExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run the task's operations in order, stopping at the first failure
    ///
    /// `on_operation` is called after each completed operation.
    pub fn execute<F>(&self, definition: &TaskDefinition, mut on_operation: F) -> ExecutionResult
    where
        F: FnMut(&OperationReport),
    {
        info!("Running task: {}", definition.task);

        let mut reports = Vec::with_capacity(definition.operations.len());
        for (index, op) in definition.operations.iter().enumerate() {
            debug!("{} operation {}: {}", definition.task, index + 1, op.kind());

            match operations::apply(op, &self.root, &definition.task) {
                Ok(report) => {
                    on_operation(&report);
                    reports.push(report);
                }
                Err(error) => {
                    error!("Task {} failed at {}: {}", definition.task, op.kind(), error);
                    return ExecutionResult::Failed {
                        operation: index,
                        reports,
                        error,
                    };
                }
            }
        }

        ExecutionResult::Success { reports }
    }
}
