//! Error types for configuration, registry, execution and watch mode

use crate::core::task::TaskRef;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or resolving the build description
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Placeholders that refer back to themselves, directly or through others
    #[error("Placeholder at '{path}' never resolves: {}", chain.join(" -> "))]
    Cycle { path: String, chain: Vec<String> },

    #[error("Placeholder at '{path}' references missing key '{reference}'")]
    MissingReference { path: String, reference: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the task registry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task '{0}' not found")]
    Unknown(TaskRef),

    #[error("Task '{0}' is registered more than once")]
    Duplicate(TaskRef),

    #[error("Alias '{0}' expands to itself")]
    AliasCycle(String),

    #[error("Invalid task reference '{0}'")]
    InvalidRef(String),
}

/// A single failure while executing a file operation
#[derive(Debug, Error)]
pub enum StepError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("No files matched {patterns:?}")]
    NoMatches { patterns: Vec<String> },

    #[error("Lint failed with {count} problem(s):\n{report}")]
    Lint { count: usize, report: String },

    #[error("Invalid include marker in {path}: {reason}")]
    IncludeMarker { path: PathBuf, reason: String },

    #[error("Refusing to delete {path}: outside the project or the project root itself")]
    UnsafeDelete { path: PathBuf },

    #[error("Invalid lint rule '{rule}': {source}")]
    LintRule {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

impl StepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StepError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a pipeline run did not succeed
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Task '{task}' failed: {source}")]
    Step {
        task: TaskRef,
        #[source]
        source: StepError,
    },
}

/// Errors raised by watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watch rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: StepError,
    },

    #[error("Baseline pipeline '{pipeline}' failed: {reason}")]
    Baseline { pipeline: String, reason: String },

    /// A watch-triggered run failed; recovered by the scheduler
    #[error("Watch rule '{rule}' run failed: {reason}")]
    Run { rule: String, reason: String },
}
