//! Glob expansion and matching
//!
//! Expansion is deterministic: each pattern's matches are sorted
//! lexicographically, later patterns append files not seen yet, and `!`
//! patterns drop earlier matches.

use crate::core::{error::StepError, task::Patterns};
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A file selected by a glob expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    /// Full path on disk
    pub path: PathBuf,
    /// Path relative to the expansion directory, `/`-separated
    pub relative: String,
}

/// Render a path with forward slashes
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn compile(pattern: &str) -> Result<Pattern, StepError> {
    Pattern::new(pattern).map_err(|source| StepError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Split a pattern into (is_negated, glob)
fn split_negation(pattern: &str) -> (bool, &str) {
    match pattern.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start_matches("./")),
        None => (false, pattern.trim_start_matches("./")),
    }
}

/// Expand `patterns` relative to `cwd` into the ordered list of regular files
pub fn expand(cwd: &Path, patterns: &Patterns) -> Result<Vec<MatchedFile>, StepError> {
    let mut files: Vec<MatchedFile> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let base = Pattern::escape(&cwd.to_string_lossy());

    for raw in patterns.iter() {
        let (negated, pattern) = split_negation(raw);

        if negated {
            let exclude = compile(pattern)?;
            files.retain(|f| !exclude.matches_with(&f.relative, MATCH_OPTIONS));
            seen = files.iter().map(|f| f.relative.clone()).collect();
            continue;
        }

        let full = format!("{}/{}", base.trim_end_matches('/'), pattern);
        let entries = glob_with(&full, MATCH_OPTIONS).map_err(|source| StepError::Pattern {
            pattern: raw.clone(),
            source,
        })?;

        let mut matched: Vec<MatchedFile> = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .map(|path| {
                let relative = slash_path(path.strip_prefix(cwd).unwrap_or(&path));
                MatchedFile { path, relative }
            })
            .collect();
        matched.sort_by(|a, b| a.relative.cmp(&b.relative));

        for file in matched {
            if seen.insert(file.relative.clone()) {
                files.push(file);
            }
        }
    }

    tracing::debug!(
        cwd = %cwd.display(),
        count = files.len(),
        "expanded {:?}",
        patterns.0
    );
    Ok(files)
}

/// A compiled pattern list for matching single paths
#[derive(Debug, Clone)]
pub struct PatternSet {
    entries: Vec<(bool, Pattern)>,
}

impl PatternSet {
    pub fn new(patterns: &Patterns) -> Result<Self, StepError> {
        let entries = patterns
            .iter()
            .map(|raw| {
                let (negated, pattern) = split_negation(raw);
                compile(pattern).map(|p| (negated, p))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Whether a `/`-separated relative path is selected
    ///
    /// Patterns apply in order, so a later pattern overrides an earlier one.
    pub fn matches(&self, relative: &str) -> bool {
        let relative = relative.trim_start_matches("./");
        self.entries.iter().fold(false, |selected, (negated, pattern)| {
            if pattern.matches_with(relative, MATCH_OPTIONS) {
                !negated
            } else {
                selected
            }
        })
    }
}
