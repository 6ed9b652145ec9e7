//! File operation primitives
//!
//! Every primitive reads from the project root and writes only into its
//! configured destination. Relative paths in operations are resolved against
//! the project root.

use crate::core::{
    error::StepError,
    task::{FileOperation, LintOptions, OperationKind, Patterns, TaskRef},
};
use crate::execution::files::{self, slash_path, MatchedFile};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// What a single operation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub kind: OperationKind,
    /// Number of source files read
    pub files_read: usize,
    /// Paths written or removed
    pub outputs: Vec<PathBuf>,
}

impl OperationReport {
    fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            files_read: 0,
            outputs: Vec::new(),
        }
    }
}

/// Apply one file operation for `task` inside `root`
pub fn apply(
    op: &FileOperation,
    root: &Path,
    task: &TaskRef,
) -> Result<OperationReport, StepError> {
    match op {
        FileOperation::Copy {
            src,
            dest,
            cwd,
            expand,
            flatten,
            allow_empty,
        } => copy(root, src, dest, cwd.as_deref(), *expand && !*flatten, *allow_empty),
        FileOperation::Concatenate {
            src,
            dest,
            cwd,
            separator,
            allow_empty,
        } => concatenate(root, src, dest, cwd.as_deref(), separator, *allow_empty),
        FileOperation::CompileTemplate {
            src,
            dest,
            base,
            module,
            allow_empty,
        } => {
            let module = module.clone().unwrap_or_else(|| {
                format!("templates-{}", task.target.as_deref().unwrap_or(&task.name))
            });
            compile_templates(root, src, dest, base, &module, *allow_empty)
        }
        FileOperation::InjectReference {
            src,
            dest,
            base_path,
            base_url,
        } => inject_references(root, src, dest, base_path, base_url),
        FileOperation::Lint {
            src,
            cwd,
            options,
            allow_empty,
        } => lint(root, src, cwd.as_deref(), options, *allow_empty),
        FileOperation::Delete { src } => delete(root, src),
    }
}

/// Expand source patterns, enforcing the "must match something" rule
fn sources(
    cwd: &Path,
    src: &Patterns,
    allow_empty: bool,
    kind: OperationKind,
) -> Result<Vec<MatchedFile>, StepError> {
    if src.is_empty() {
        warn!("{} has no source patterns, skipping", kind);
        return Ok(Vec::new());
    }

    let matched = files::expand(cwd, src)?;
    if matched.is_empty() {
        if allow_empty {
            warn!("{} matched no files for {:?}", kind, src.0);
        } else {
            return Err(StepError::NoMatches {
                patterns: src.0.clone(),
            });
        }
    }
    Ok(matched)
}

fn working_dir(root: &Path, cwd: Option<&str>) -> PathBuf {
    match cwd {
        Some(cwd) if !cwd.is_empty() && cwd != "." => root.join(cwd),
        _ => root.to_path_buf(),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StepError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| StepError::io(path, e))
}

fn read_text(path: &Path) -> Result<String, StepError> {
    fs::read_to_string(path).map_err(|e| StepError::io(path, e))
}

fn copy(
    root: &Path,
    src: &Patterns,
    dest: &str,
    cwd: Option<&str>,
    preserve_structure: bool,
    allow_empty: bool,
) -> Result<OperationReport, StepError> {
    let mut report = OperationReport::new(OperationKind::Copy);
    let dest_dir = root.join(dest);

    for file in sources(&working_dir(root, cwd), src, allow_empty, OperationKind::Copy)? {
        let target = if preserve_structure {
            dest_dir.join(&file.relative)
        } else {
            match file.path.file_name() {
                Some(name) => dest_dir.join(name),
                None => continue,
            }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StepError::io(parent, e))?;
        }
        fs::copy(&file.path, &target).map_err(|e| StepError::io(&file.path, e))?;
        debug!("copied {} -> {}", file.path.display(), target.display());

        report.files_read += 1;
        report.outputs.push(target);
    }

    Ok(report)
}

fn concatenate(
    root: &Path,
    src: &Patterns,
    dest: &str,
    cwd: Option<&str>,
    separator: &str,
    allow_empty: bool,
) -> Result<OperationReport, StepError> {
    let mut report = OperationReport::new(OperationKind::Concatenate);
    let files = sources(
        &working_dir(root, cwd),
        src,
        allow_empty,
        OperationKind::Concatenate,
    )?;
    if files.is_empty() {
        return Ok(report);
    }

    let mut joined: Vec<u8> = Vec::new();
    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(separator.as_bytes());
        }
        let contents = fs::read(&file.path).map_err(|e| StepError::io(&file.path, e))?;
        joined.extend_from_slice(&contents);
        report.files_read += 1;
    }

    let target = root.join(dest);
    write_file(&target, &joined)?;
    report.outputs.push(target);
    Ok(report)
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn compile_templates(
    root: &Path,
    src: &Patterns,
    dest: &str,
    base: &str,
    module: &str,
    allow_empty: bool,
) -> Result<OperationReport, StepError> {
    let mut report = OperationReport::new(OperationKind::CompileTemplate);
    let files = sources(root, src, allow_empty, OperationKind::CompileTemplate)?;
    let base_dir = root.join(base);

    let mut keys = Vec::with_capacity(files.len());
    let mut records = Vec::with_capacity(files.len());
    for file in &files {
        let key = match file.path.strip_prefix(&base_dir) {
            Ok(relative) => slash_path(relative),
            Err(_) => file.relative.clone(),
        };
        let content = read_text(&file.path)?;

        records.push(format!(
            "angular.module({key}, []).run([\"$templateCache\", function($templateCache) {{\n  $templateCache.put({key}, {content});\n}}]);\n",
            key = js_string(&key),
            content = js_string(&content),
        ));
        keys.push(js_string(&key));
        report.files_read += 1;
    }

    let mut script = format!(
        "angular.module({}, [{}]);\n",
        js_string(module),
        keys.join(", ")
    );
    for record in records {
        script.push('\n');
        script.push_str(&record);
    }

    let target = root.join(dest);
    write_file(&target, script.as_bytes())?;
    report.outputs.push(target);
    Ok(report)
}

/// Parsed body of an `<!-- include: ... -->` marker
#[derive(Debug, Deserialize)]
struct IncludeMarker {
    #[serde(rename = "type")]
    kind: String,
    files: Patterns,
}

fn include_regex() -> &'static Regex {
    static INCLUDE: OnceLock<Regex> = OnceLock::new();
    INCLUDE.get_or_init(|| Regex::new(r"([ \t]*)<!--\s*include:(.*?)-->").unwrap())
}

fn reference_tag(kind: &str, url: &str) -> Option<String> {
    match kind {
        "js" => Some(format!("<script src=\"{}\"></script>", url)),
        "css" => Some(format!("<link rel=\"stylesheet\" href=\"{}\" />", url)),
        _ => None,
    }
}

fn inject_references(
    root: &Path,
    src: &str,
    dest: &str,
    base_path: &str,
    base_url: &str,
) -> Result<OperationReport, StepError> {
    let mut report = OperationReport::new(OperationKind::InjectReference);
    let host_path = root.join(src);
    let host = read_text(&host_path)?;
    let base_dir = root.join(base_path);

    let mut out = String::with_capacity(host.len());
    let mut last = 0;
    for captures in include_regex().captures_iter(&host) {
        let Some(marker) = captures.get(0) else { continue };
        let indent = &captures[1];
        let body = captures[2].trim();

        let parsed: IncludeMarker = serde_json::from_str(&format!("{{{}}}", body)).map_err(|e| {
            StepError::IncludeMarker {
                path: host_path.clone(),
                reason: format!("{} in '{}'", e, body),
            }
        })?;

        let mut tags = Vec::new();
        for file in files::expand(&base_dir, &parsed.files)? {
            let url = format!("{}{}", base_url, file.relative);
            let tag = reference_tag(&parsed.kind, &url).ok_or_else(|| StepError::IncludeMarker {
                path: host_path.clone(),
                reason: format!("unknown include type '{}'", parsed.kind),
            })?;
            tags.push(format!("{}{}", indent, tag));
            report.files_read += 1;
        }

        out.push_str(&host[last..marker.start()]);
        out.push_str(&tags.join("\n"));
        last = marker.end();
    }
    out.push_str(&host[last..]);

    let target = root.join(dest);
    write_file(&target, out.as_bytes())?;
    report.outputs.push(target);
    Ok(report)
}

fn lint(
    root: &Path,
    src: &Patterns,
    cwd: Option<&str>,
    options: &LintOptions,
    allow_empty: bool,
) -> Result<OperationReport, StepError> {
    let mut report = OperationReport::new(OperationKind::Lint);
    let forbidden = options
        .forbid
        .iter()
        .map(|rule| {
            Regex::new(rule).map_err(|source| StepError::LintRule {
                rule: rule.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut problems = Vec::new();
    for file in sources(&working_dir(root, cwd), src, allow_empty, OperationKind::Lint)? {
        let text = read_text(&file.path)?;
        report.files_read += 1;

        for (n, line) in text.lines().enumerate() {
            let location = format!("{}:{}", file.relative, n + 1);
            if let Some(max) = options.max_line_length {
                let len = line.chars().count();
                if len > max {
                    problems.push(format!(
                        "{}: line is {} characters (max {})",
                        location, len, max
                    ));
                }
            }
            if options.trailing_whitespace && line.ends_with([' ', '\t']) {
                problems.push(format!("{}: trailing whitespace", location));
            }
            for rule in &forbidden {
                if rule.is_match(line) {
                    problems.push(format!(
                        "{}: matches forbidden pattern '{}'",
                        location,
                        rule.as_str()
                    ));
                }
            }
        }

        if options.final_newline && !text.is_empty() && !text.ends_with('\n') {
            problems.push(format!("{}: missing final newline", file.relative));
        }
    }

    if problems.is_empty() {
        Ok(report)
    } else {
        Err(StepError::Lint {
            count: problems.len(),
            report: problems.join("\n"),
        })
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// A delete target must be strictly inside the root
fn check_inside_root(root: &Path, relative: &str) -> Result<PathBuf, StepError> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    let is_root = path.components().all(|c| matches!(c, Component::CurDir));
    if escapes || is_root {
        return Err(StepError::UnsafeDelete {
            path: root.join(path),
        });
    }
    Ok(root.join(path))
}

fn remove_path(path: &Path) -> Result<bool, StepError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StepError::io(path, e)),
    }
}

fn delete(root: &Path, src: &Patterns) -> Result<OperationReport, StepError> {
    let mut report = OperationReport::new(OperationKind::Delete);

    for pattern in src.iter() {
        let target = check_inside_root(root, pattern)?;

        let targets = if is_glob(pattern) {
            let full = format!("{}/{}", glob::Pattern::escape(&root.to_string_lossy()), pattern);
            let mut matched: Vec<PathBuf> = glob::glob(&full)
                .map_err(|source| StepError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?
                .filter_map(Result::ok)
                .collect();
            matched.sort();
            matched
        } else {
            vec![target]
        };

        for path in targets {
            if remove_path(&path)? {
                debug!("removed {}", path.display());
                report.outputs.push(path);
            } else {
                debug!("{} already absent", path.display());
            }
        }
    }

    Ok(report)
}
