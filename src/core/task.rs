//! Task domain model: references, definitions and file operations

use crate::core::error::TaskError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A reference to a task, optionally scoped to one of its targets
///
/// Written as `name` or `name:target` in build descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskRef {
    pub name: String,
    pub target: Option<String>,
}

impl TaskRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }

    pub fn with_target(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: Some(target.into()),
        }
    }

    /// Whether `other` is this reference or one of its targets
    pub fn covers(&self, other: &TaskRef) -> bool {
        self.name == other.name && (self.target.is_none() || self.target == other.target)
    }
}

impl FromStr for TaskRef {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            None if !s.is_empty() => Ok(TaskRef::new(s)),
            Some((name, target))
                if !name.is_empty() && !target.is_empty() && !target.contains(':') =>
            {
                Ok(TaskRef::with_target(name, target))
            }
            _ => Err(TaskError::InvalidRef(s.to_string())),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.name, target),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Serialize for TaskRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An ordered list of glob patterns
///
/// Accepts a single string or an arbitrarily nested sequence of strings, which
/// is what a whole-value placeholder pointing at a list produces. Patterns
/// starting with `!` exclude previously matched files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Patterns(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternsRepr {
    One(String),
    Many(Vec<PatternsRepr>),
}

impl PatternsRepr {
    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            PatternsRepr::One(s) => out.push(s),
            PatternsRepr::Many(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for Patterns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = PatternsRepr::deserialize(deserializer)?;
        let mut patterns = Vec::new();
        repr.flatten_into(&mut patterns);
        Ok(Patterns(patterns))
    }
}

impl Patterns {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Patterns(patterns.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

/// The kind of transformation a file operation applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Copy,
    Concatenate,
    CompileTemplate,
    InjectReference,
    Lint,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Copy => "copy",
            OperationKind::Concatenate => "concatenate",
            OperationKind::CompileTemplate => "compile-template",
            OperationKind::InjectReference => "inject-reference",
            OperationKind::Lint => "lint",
            OperationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Rules checked by a lint operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintOptions {
    /// Longest allowed line, in characters
    #[serde(default)]
    pub max_line_length: Option<usize>,

    /// Reject lines ending in spaces or tabs
    #[serde(default)]
    pub trailing_whitespace: bool,

    /// Require the file to end with a newline
    #[serde(default)]
    pub final_newline: bool,

    /// Regular expressions that must not match any line
    #[serde(default)]
    pub forbid: Vec<String>,
}

fn default_separator() -> String {
    "\n".to_string()
}

/// One step of a task definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FileOperation {
    /// Copy matched files into `dest`
    Copy {
        src: Patterns,
        dest: String,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        expand: bool,
        #[serde(default)]
        flatten: bool,
        #[serde(default)]
        allow_empty: bool,
    },

    /// Join matched files into the single file `dest`
    Concatenate {
        src: Patterns,
        dest: String,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        allow_empty: bool,
    },

    /// Bundle template fragments into one template-cache script
    CompileTemplate {
        src: Patterns,
        dest: String,
        base: String,
        #[serde(default)]
        module: Option<String>,
        #[serde(default)]
        allow_empty: bool,
    },

    /// Rewrite a host document with references to built files
    InjectReference {
        src: String,
        dest: String,
        base_path: String,
        #[serde(default)]
        base_url: String,
    },

    /// Check matched files against lint rules
    Lint {
        src: Patterns,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        options: LintOptions,
        #[serde(default)]
        allow_empty: bool,
    },

    /// Remove paths recursively
    Delete { src: Patterns },
}

impl FileOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            FileOperation::Copy { .. } => OperationKind::Copy,
            FileOperation::Concatenate { .. } => OperationKind::Concatenate,
            FileOperation::CompileTemplate { .. } => OperationKind::CompileTemplate,
            FileOperation::InjectReference { .. } => OperationKind::InjectReference,
            FileOperation::Lint { .. } => OperationKind::Lint,
            FileOperation::Delete { .. } => OperationKind::Delete,
        }
    }
}

/// A named set of file operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub task: TaskRef,
    pub operations: Vec<FileOperation>,
}

impl TaskDefinition {
    pub fn new(task: TaskRef, operations: Vec<FileOperation>) -> Self {
        Self { task, operations }
    }
}
