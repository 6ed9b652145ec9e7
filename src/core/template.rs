//! Placeholder resolution for configuration trees
//!
//! Any string in the tree may embed `<%= path.to.key %>` tokens. A token is
//! replaced by the value found at that dotted path in the same tree. When a
//! string consists of exactly one token the value is substituted as-is, so a
//! token pointing at a list keeps it a list. Embedded tokens are rendered to
//! text, with lists joined by commas.
//!
//! Before any substitution the references between placeholders are checked
//! for cycles, so a self-referential tree is rejected without being expanded.
//! Resolution then runs in passes until no token is left, bounded by
//! [`MAX_RESOLVE_PASSES`].

use crate::core::error::ConfigError;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A build configuration tree
pub type ConfigTree = Value;

/// Upper bound on substitution passes before giving up
pub const MAX_RESOLVE_PASSES: usize = 32;

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"<%=\s*([A-Za-z0-9_$\-]+(?:\.[A-Za-z0-9_$\-]+)*)\s*%>").unwrap()
    })
}

/// Whether a string contains at least one placeholder token
pub fn has_placeholder(text: &str) -> bool {
    token_regex().is_match(text)
}

/// Resolve every placeholder in `tree`, producing a new tree
pub fn resolve(tree: ConfigTree) -> Result<ConfigTree, ConfigError> {
    check_references(&tree)?;
    let mut current = tree;

    for pass in 1..=MAX_RESOLVE_PASSES {
        if find_placeholder(&current, "").is_none() {
            return Ok(current);
        }
        let next = substitute(&current, &current, "")?;
        tracing::trace!(pass, "placeholder resolution pass complete");
        current = next;
    }

    match find_placeholder(&current, "") {
        None => Ok(current),
        Some(path) => Err(ConfigError::Cycle {
            chain: vec![path.clone(), path.clone()],
            path,
        }),
    }
}

/// A string in the tree holding placeholders, with the paths it references
struct Placeholder {
    path: Vec<String>,
    references: Vec<Vec<String>>,
}

fn segments(path: &str) -> Vec<String> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').map(str::to_string).collect()
    }
}

fn references(text: &str) -> Vec<Vec<String>> {
    token_regex()
        .captures_iter(text)
        .map(|captures| segments(&captures[1]))
        .collect()
}

fn collect_placeholders(node: &Value, path: &str, out: &mut Vec<Placeholder>) {
    match node {
        Value::String(s) if has_placeholder(s) => out.push(Placeholder {
            path: segments(path),
            references: references(s),
        }),
        Value::Sequence(seq) => {
            for (i, item) in seq.iter().enumerate() {
                collect_placeholders(item, &child_path(path, &i.to_string()), out);
            }
        }
        Value::Mapping(map) => {
            for (key, value) in map {
                let here = child_path(path, &key_label(key));
                if let Value::String(k) = key {
                    if has_placeholder(k) {
                        out.push(Placeholder {
                            path: segments(&here),
                            references: references(k),
                        });
                    }
                }
                collect_placeholders(value, &here, out);
            }
        }
        Value::Tagged(tagged) => collect_placeholders(&tagged.value, path, out),
        _ => {}
    }
}

/// Whether one path contains the other
fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y)
}

/// Reject placeholders that depend on themselves
///
/// A placeholder depends on every other placeholder inside, above, or at the
/// path it references. Any cycle in that graph would expand forever.
fn check_references(tree: &ConfigTree) -> Result<(), ConfigError> {
    let mut placeholders = Vec::new();
    collect_placeholders(tree, "", &mut placeholders);

    let edges: Vec<Vec<usize>> = placeholders
        .iter()
        .map(|from| {
            placeholders
                .iter()
                .enumerate()
                .filter(|(_, to)| from.references.iter().any(|r| overlaps(r, &to.path)))
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let mut state: HashMap<usize, bool> = HashMap::new();
    let mut stack = Vec::new();
    for start in 0..placeholders.len() {
        if let Some(cycle) = find_cycle(start, &edges, &mut state, &mut stack) {
            let chain: Vec<String> = cycle
                .iter()
                .map(|&i| placeholders[i].path.join("."))
                .collect();
            return Err(ConfigError::Cycle {
                path: chain[0].clone(),
                chain,
            });
        }
    }
    Ok(())
}

/// Depth-first search; `state` holds `false` while a node is on the stack
fn find_cycle(
    node: usize,
    edges: &[Vec<usize>],
    state: &mut HashMap<usize, bool>,
    stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    match state.get(&node).copied() {
        Some(true) => return None,
        Some(false) => {
            let start = stack.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle = stack[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        None => {}
    }

    state.insert(node, false);
    stack.push(node);
    for &next in &edges[node] {
        if let Some(cycle) = find_cycle(next, edges, state, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    state.insert(node, true);
    None
}

/// Look up a dotted path in the tree
///
/// Mapping keys are matched as strings; numeric segments also index sequences.
pub fn lookup<'a>(tree: &'a ConfigTree, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(tree, |node, segment| match node {
        Value::Mapping(map) => map.get(Value::String(segment.to_string())),
        Value::Sequence(seq) => segment.parse::<usize>().ok().and_then(|i| seq.get(i)),
        Value::Tagged(tagged) => lookup(&tagged.value, segment),
        _ => None,
    })
}

/// Set a value at a dotted path, creating intermediate mappings as needed
///
/// Numeric segments index into existing sequences.
pub fn set_path(tree: &mut ConfigTree, path: &str, value: Value) -> Result<(), ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::Invalid(format!("invalid override path '{}'", path)));
    }

    let mut node = tree;
    for segment in &segments {
        node = child_mut(node, segment)
            .ok_or_else(|| ConfigError::Invalid(format!("cannot set '{}'", path)))?;
    }
    *node = value;
    Ok(())
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    let key = Value::String(segment.to_string());
    match node {
        Value::Sequence(seq) => seq.get_mut(segment.parse::<usize>().ok()?),
        Value::Mapping(map) => Some(map.entry(key).or_insert(Value::Null)),
        other => {
            *other = Value::Mapping(Mapping::new());
            other
                .as_mapping_mut()
                .map(|map| map.entry(key).or_insert(Value::Null))
        }
    }
}

fn child_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => render_scalar(other).unwrap_or_else(|| "?".to_string()),
    }
}

/// First path in the tree still holding a placeholder, if any
fn find_placeholder(node: &Value, path: &str) -> Option<String> {
    match node {
        Value::String(s) if has_placeholder(s) => Some(path.to_string()),
        Value::Sequence(seq) => seq
            .iter()
            .enumerate()
            .find_map(|(i, item)| find_placeholder(item, &child_path(path, &i.to_string()))),
        Value::Mapping(map) => map.iter().find_map(|(key, value)| {
            let here = child_path(path, &key_label(key));
            match key {
                Value::String(k) if has_placeholder(k) => Some(here),
                _ => find_placeholder(value, &here),
            }
        }),
        Value::Tagged(tagged) => find_placeholder(&tagged.value, path),
        _ => None,
    }
}

/// One substitution pass over `node`, looking values up in `root`
fn substitute(node: &Value, root: &ConfigTree, path: &str) -> Result<Value, ConfigError> {
    match node {
        Value::String(s) => substitute_string(s, root, path),
        Value::Sequence(seq) => seq
            .iter()
            .enumerate()
            .map(|(i, item)| substitute(item, root, &child_path(path, &i.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, value) in map {
                let here = child_path(path, &key_label(key));
                let key = match key {
                    Value::String(k) if has_placeholder(k) => {
                        Value::String(render_embedded(k, root, &here)?)
                    }
                    other => other.clone(),
                };
                let value = substitute(value, root, &here)?;
                if out.insert(key.clone(), value).is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "key '{}' appears twice under '{}' after resolution",
                        key_label(&key),
                        path
                    )));
                }
            }
            Ok(Value::Mapping(out))
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.as_ref().clone();
            tagged.value = substitute(&tagged.value, root, path)?;
            Ok(Value::Tagged(Box::new(tagged)))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(text: &str, root: &ConfigTree, path: &str) -> Result<Value, ConfigError> {
    let regex = token_regex();

    if let Some(captures) = regex.captures(text.trim()) {
        let whole = captures.get(0).map(|m| m.as_str().len()).unwrap_or(0);
        if whole == text.trim().len() {
            let reference = &captures[1];
            return lookup(root, reference).cloned().ok_or_else(|| {
                ConfigError::MissingReference {
                    path: path.to_string(),
                    reference: reference.to_string(),
                }
            });
        }
    }

    if !regex.is_match(text) {
        return Ok(Value::String(text.to_string()));
    }
    render_embedded(text, root, path).map(Value::String)
}

fn render_embedded(text: &str, root: &ConfigTree, path: &str) -> Result<String, ConfigError> {
    let regex = token_regex();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for captures in regex.captures_iter(text) {
        let Some(token) = captures.get(0) else { continue };
        let reference = &captures[1];
        let value = lookup(root, reference).ok_or_else(|| ConfigError::MissingReference {
            path: path.to_string(),
            reference: reference.to_string(),
        })?;

        out.push_str(&text[last..token.start()]);
        out.push_str(&render_embedded_value(value).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "'{}' at '{}' refers to a mapping and cannot be embedded in a string",
                reference, path
            ))
        })?);
        last = token.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Text form of a value embedded in a larger string
fn render_embedded_value(value: &Value) -> Option<String> {
    match value {
        Value::Sequence(seq) => seq
            .iter()
            .map(render_embedded_value)
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(",")),
        Value::Mapping(_) => None,
        Value::Tagged(tagged) => render_embedded_value(&tagged.value),
        scalar => render_scalar(scalar),
    }
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
