//! Workflow template loading and slot substitution.
//!
//! Backend job graphs are stored as JSON templates with `{{slot}}`
//! placeholders. Rendering replaces placeholders with run-specific values:
//! a string that is exactly one placeholder takes the bound value with its
//! JSON type intact (so numeric seeds stay numbers), while placeholders
//! embedded in longer strings are interpolated as text. Rendering is strict
//! in both directions: a placeholder without a binding and a binding without
//! a placeholder are both errors, catching template/config drift before
//! anything reaches the backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read workflow template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow template {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("workflow slot '{{{{{0}}}}}' has no bound value")]
    UnboundSlot(String),

    #[error("slot value '{0}' does not appear in the workflow template")]
    UnusedSlot(String),
}

/// Load a workflow template from disk.
pub fn load_template(path: &Path) -> Result<Value, WorkflowError> {
    let content = fs::read_to_string(path).map_err(|source| WorkflowError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| WorkflowError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Render a template by substituting every `{{slot}}` placeholder.
pub fn render(
    template: &Value,
    slots: &BTreeMap<String, Value>,
) -> Result<Value, WorkflowError> {
    let mut used = BTreeSet::new();
    let rendered = render_value(template, slots, &mut used)?;

    for name in slots.keys() {
        if !used.contains(name) {
            return Err(WorkflowError::UnusedSlot(name.clone()));
        }
    }

    Ok(rendered)
}

fn render_value(
    value: &Value,
    slots: &BTreeMap<String, Value>,
    used: &mut BTreeSet<String>,
) -> Result<Value, WorkflowError> {
    match value {
        Value::String(s) => render_string(s, slots, used),
        Value::Array(items) => {
            let rendered: Result<Vec<Value>, WorkflowError> = items
                .iter()
                .map(|item| render_value(item, slots, used))
                .collect();
            Ok(Value::Array(rendered?))
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(key.clone(), render_value(item, slots, used)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn render_string(
    s: &str,
    slots: &BTreeMap<String, Value>,
    used: &mut BTreeSet<String>,
) -> Result<Value, WorkflowError> {
    if slot_refs(s).is_empty() {
        return Ok(Value::String(s.to_string()));
    }

    // A string that is exactly one placeholder takes the value's JSON type.
    if let Some(name) = whole_placeholder(s) {
        let value = slots
            .get(name)
            .ok_or_else(|| WorkflowError::UnboundSlot(name.to_string()))?;
        used.insert(name.to_string());
        return Ok(value.clone());
    }

    // Otherwise interpolate as text, rebuilding around each placeholder.
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = match after.find("}}") {
            Some(end) => end,
            None => break,
        };
        let name = after[..end].trim();
        out.push_str(&rest[..start]);
        if name.is_empty() {
            out.push_str(&rest[start..start + end + 4]);
        } else {
            let value = slots
                .get(name)
                .ok_or_else(|| WorkflowError::UnboundSlot(name.to_string()))?;
            used.insert(name.to_string());
            match value {
                Value::String(text) => out.push_str(text),
                other => out.push_str(&other.to_string()),
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(Value::String(out))
}

/// The slot name when the whole string is a single placeholder.
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    let name = inner.trim();
    if name.is_empty() || name.contains('{') || name.contains('}') {
        return None;
    }
    Some(name)
}

/// Slot names referenced by a string, in order of appearance.
fn slot_refs(s: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = s;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if !name.is_empty() {
                    refs.push(name.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }

    refs
}
