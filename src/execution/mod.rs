//! Pipeline execution and watch mode

pub mod engine;
pub mod executor;
pub mod files;
pub mod operations;
pub mod scheduler;
pub mod watcher;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, PipelineRunner};
pub use executor::{ExecutionResult, TaskExecutor};
pub use operations::OperationReport;
pub use scheduler::{WatchEvent, WatchScheduler, WatchState};
pub use watcher::watch_project;
