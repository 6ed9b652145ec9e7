//! Core domain models for buildline
//!
//! This module defines the build description, the placeholder resolver, the
//! task registry and the per-run state.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod task;
pub mod template;

pub use config::{BuildConfig, WatchRule};
pub use error::{ConfigError, RunError, StepError, TaskError, WatchError};
pub use pipeline::*;
pub use registry::TaskRegistry;
pub use state::*;
pub use task::*;
