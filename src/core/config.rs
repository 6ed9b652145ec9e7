//! Build description loaded from YAML
//!
//! The whole document is a configuration tree. Placeholders are resolved
//! against it first, then the `tasks`, `aliases` and `watch` sections are read
//! as typed configuration. Every other top-level key is free-form data that
//! placeholders may refer to.

use crate::core::{
    error::{ConfigError, TaskError},
    pipeline::Pipeline,
    registry::TaskRegistry,
    task::{FileOperation, Patterns, TaskDefinition, TaskRef},
    template::{self, ConfigTree},
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use std::time::Duration;

/// Default build description file name
pub const DEFAULT_BUILD_FILE: &str = "Buildfile.yml";

/// Top-level build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Project name
    #[serde(default)]
    pub name: Option<String>,

    /// Task definitions, in registration order
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,

    /// Named task lists
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,

    /// Watch mode configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// The fully resolved configuration tree
    #[serde(skip)]
    pub tree: ConfigTree,
}

/// A task or task target as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub operations: Vec<FileOperation>,
}

/// A named list of tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    pub name: String,

    #[serde(default)]
    pub tasks: Vec<TaskRef>,
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period before a rule runs, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Default for emitting reload notifications after successful runs
    #[serde(default)]
    pub livereload: bool,

    /// Pipeline run once before watching starts
    #[serde(default = "default_baseline")]
    pub baseline: String,

    #[serde(default)]
    pub rules: Vec<WatchRuleConfig>,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_baseline() -> String {
    "development-build".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            livereload: false,
            baseline: default_baseline(),
            rules: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// A single watch rule as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRuleConfig {
    pub name: String,

    /// Files that trigger this rule
    pub files: Patterns,

    /// Tasks to re-run
    pub tasks: Vec<TaskRef>,

    /// Overrides the global livereload setting
    #[serde(default)]
    pub livereload: Option<bool>,

    /// When this rule matches a change, other matching rules are not scheduled
    #[serde(default, alias = "full_rebuild")]
    pub exclusive: bool,
}

/// A watch rule ready for the scheduler
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub name: String,
    pub files: Patterns,
    pub pipeline: Pipeline,
    pub livereload: bool,
    pub exclusive: bool,
}

impl BuildConfig {
    /// Load the build description from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_file_with_overrides(path, &[])
    }

    /// Load the build description, applying `key.path=value` overrides first
    pub fn from_file_with_overrides<P: AsRef<Path>>(
        path: P,
        overrides: &[(String, String)],
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_with_overrides(&content, overrides)
    }

    /// Parse a build description from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_with_overrides(yaml, &[])
    }

    pub fn from_yaml_with_overrides(
        yaml: &str,
        overrides: &[(String, String)],
    ) -> Result<Self, ConfigError> {
        let mut raw: ConfigTree = if yaml.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(yaml)?
        };
        if raw.is_null() {
            raw = Value::Mapping(Default::default());
        }
        if !raw.is_mapping() {
            return Err(ConfigError::Invalid(
                "build description must be a mapping".to_string(),
            ));
        }

        for (key, value) in overrides {
            template::set_path(&mut raw, key, override_value(value))?;
        }

        let tree = template::resolve(raw)?;
        let mut config: BuildConfig = serde_yaml::from_value(tree.clone())?;
        config.tree = tree;
        config.validate()?;
        Ok(config)
    }

    /// Validate the build configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let registry = self.to_registry().map_err(invalid)?;

        for alias in &self.aliases {
            let pipeline = registry.pipeline(&alias.name).map_err(invalid)?;
            registry.expand(&pipeline).map_err(invalid)?;
        }

        for rule in &self.watch.rules {
            if rule.files.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "watch rule '{}' has no file patterns",
                    rule.name
                )));
            }
            let pipeline = Pipeline::new(format!("watch:{}", rule.name), rule.tasks.clone());
            registry.expand(&pipeline).map_err(|e| {
                ConfigError::Invalid(format!("watch rule '{}': {}", rule.name, e))
            })?;
        }

        if !self.watch.rules.is_empty() {
            registry.pipeline(&self.watch.baseline).map_err(|e| {
                ConfigError::Invalid(format!("watch baseline: {}", e))
            })?;
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &self.watch.rules {
            if !seen.insert(&rule.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate watch rule '{}'",
                    rule.name
                )));
            }
        }

        Ok(())
    }

    /// Build the task registry described by this configuration
    pub fn to_registry(&self) -> Result<TaskRegistry, TaskError> {
        let mut registry = TaskRegistry::new();

        for task in &self.tasks {
            let task_ref = match &task.target {
                Some(target) => TaskRef::with_target(&task.name, target),
                None => TaskRef::new(&task.name),
            };
            registry.register(TaskDefinition::new(task_ref, task.operations.clone()))?;
        }

        for alias in &self.aliases {
            registry.register_alias(&alias.name, alias.tasks.clone())?;
        }

        Ok(registry)
    }

    /// Watch rules with global defaults applied
    pub fn watch_rules(&self) -> Vec<WatchRule> {
        self.watch
            .rules
            .iter()
            .map(|rule| WatchRule {
                name: rule.name.clone(),
                files: rule.files.clone(),
                pipeline: Pipeline::new(format!("watch:{}", rule.name), rule.tasks.clone()),
                livereload: rule.livereload.unwrap_or(self.watch.livereload),
                exclusive: rule.exclusive,
            })
            .collect()
    }

    /// Names of all declared aliases, in declaration order
    pub fn alias_names(&self) -> Vec<&str> {
        self.aliases.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Read an override as a YAML scalar so numbers and booleans keep their type
fn override_value(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::String(text.to_string());
    }
    serde_yaml::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn invalid(err: TaskError) -> ConfigError {
    ConfigError::Invalid(err.to_string())
}
