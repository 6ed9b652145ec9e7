//! Pipeline domain model

use crate::core::task::TaskRef;
use serde::{Deserialize, Serialize};

/// A named, ordered list of task references
///
/// Order is significant: it encodes the dependency chain (clean before copy,
/// copy before inject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Tasks to run, in order
    pub tasks: Vec<TaskRef>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskRef>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
