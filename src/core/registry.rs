//! Task registry: named task definitions and aliases
//!
//! The registry is filled once at startup and only read afterwards; the
//! engine and the watch scheduler share it behind an `Arc`.

use crate::core::{
    error::TaskError,
    pipeline::Pipeline,
    task::{TaskDefinition, TaskRef},
};
use std::collections::HashMap;

/// Stores task definitions (in registration order) and aliases
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    definitions: Vec<TaskDefinition>,
    index: HashMap<TaskRef, usize>,
    aliases: HashMap<String, Pipeline>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a task definition
    ///
    /// A name is either a plain task or a set of targets, never both, and it
    /// may not clash with an alias.
    pub fn register(&mut self, definition: TaskDefinition) -> Result<(), TaskError> {
        let task = definition.task.clone();

        if self.index.contains_key(&task) || self.aliases.contains_key(&task.name) {
            return Err(TaskError::Duplicate(task));
        }
        let mixes_kinds = self.definitions.iter().any(|d| {
            d.task.name == task.name && d.task.target.is_none() != task.target.is_none()
        });
        if mixes_kinds {
            return Err(TaskError::Duplicate(TaskRef::new(&task.name)));
        }

        self.index.insert(task, self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    /// Store a named, ordered list of tasks
    pub fn register_alias(
        &mut self,
        name: impl Into<String>,
        tasks: Vec<TaskRef>,
    ) -> Result<(), TaskError> {
        let name = name.into();
        let clashes_with_task = self.definitions.iter().any(|d| d.task.name == name);
        if clashes_with_task || self.aliases.contains_key(&name) {
            return Err(TaskError::Duplicate(TaskRef::new(name)));
        }

        self.aliases.insert(name.clone(), Pipeline::new(name, tasks));
        Ok(())
    }

    /// Look up a single task definition
    pub fn lookup(&self, task: &TaskRef) -> Result<&TaskDefinition, TaskError> {
        self.index
            .get(task)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| TaskError::Unknown(task.clone()))
    }

    /// Expand a reference into the definitions it covers
    ///
    /// Without a target this is every registered target of the task, in
    /// registration order.
    pub fn expand_target(&self, task: &TaskRef) -> Result<Vec<&TaskDefinition>, TaskError> {
        if task.target.is_some() {
            return self.lookup(task).map(|d| vec![d]);
        }

        let matched: Vec<&TaskDefinition> = self
            .definitions
            .iter()
            .filter(|d| task.covers(&d.task))
            .collect();

        if matched.is_empty() {
            Err(TaskError::Unknown(task.clone()))
        } else {
            Ok(matched)
        }
    }

    /// Resolve an invocable name to a pipeline
    ///
    /// Aliases resolve to themselves; a task or task target resolves to a
    /// single-entry pipeline.
    pub fn pipeline(&self, name: &str) -> Result<Pipeline, TaskError> {
        if let Some(alias) = self.aliases.get(name) {
            return Ok(alias.clone());
        }

        let task: TaskRef = name.parse()?;
        self.expand_target(&task)?;
        Ok(Pipeline::new(name, vec![task]))
    }

    /// Flatten a pipeline into the ordered definitions it runs
    pub fn expand(&self, pipeline: &Pipeline) -> Result<Vec<&TaskDefinition>, TaskError> {
        let mut plan = Vec::new();
        let mut stack = vec![pipeline.name.clone()];
        self.expand_into(&pipeline.tasks, &mut stack, &mut plan)?;
        Ok(plan)
    }

    fn expand_into<'a>(
        &'a self,
        tasks: &[TaskRef],
        stack: &mut Vec<String>,
        plan: &mut Vec<&'a TaskDefinition>,
    ) -> Result<(), TaskError> {
        for task in tasks {
            let alias = match task.target {
                None => self.aliases.get(&task.name),
                Some(_) => None,
            };

            match alias {
                Some(alias) => {
                    if stack.contains(&alias.name) {
                        return Err(TaskError::AliasCycle(alias.name.clone()));
                    }
                    stack.push(alias.name.clone());
                    self.expand_into(&alias.tasks, stack, plan)?;
                    stack.pop();
                }
                None => plan.extend(self.expand_target(task)?),
            }
        }
        Ok(())
    }

    /// All task definitions in registration order
    pub fn definitions(&self) -> &[TaskDefinition] {
        &self.definitions
    }
}
