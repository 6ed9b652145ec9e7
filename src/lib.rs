//! buildline - a declarative front-end build runner with watch mode

pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use core::{
    BuildConfig, ExecutionStatus, FileOperation, Pipeline, PipelineRun, RunResult, TaskDefinition,
    TaskRef, TaskRegistry,
};
pub use execution::{ExecutionEngine, ExecutionEvent, PipelineRunner, WatchEvent, WatchScheduler};
