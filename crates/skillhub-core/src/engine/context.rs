//! Workflow reference resolution.
//!
//! Node inputs may reference upstream results with `${node}` or
//! `${node.field}` (dotted paths walk nested objects). A string that is
//! exactly one placeholder substitutes structurally, preserving the JSON
//! type of the referenced value; a placeholder embedded in a longer string
//! substitutes as text. A reference to a missing node or field is an error
//! raised before the node is ever launched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_\-]+)(?:\.([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*))?\}")
        .expect("placeholder pattern")
});

/// A `${...}` reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    pub reference: String,
}

impl std::fmt::Display for MissingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unresolved reference {}", self.reference)
    }
}

/// Completed node results, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    results: HashMap<String, Value>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&mut self, node_id: impl Into<String>, output: Value) {
        self.results.insert(node_id.into(), output);
    }

    pub fn result(&self, node_id: &str) -> Option<&Value> {
        self.results.get(node_id)
    }

    pub fn results(&self) -> &HashMap<String, Value> {
        &self.results
    }

    /// Substitute every placeholder in `template`, recursing through
    /// objects and arrays.
    pub fn resolve(&self, template: &Value) -> Result<Value, MissingReference> {
        match template {
            Value::String(text) => self.resolve_string(text),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, text: &str) -> Result<Value, MissingReference> {
        // A whole-string placeholder substitutes structurally so objects
        // and arrays survive intact.
        if let Some(caps) = PLACEHOLDER.captures(text) {
            if caps.get(0).map(|m| m.as_str()) == Some(text) {
                return self.lookup(&caps).cloned();
            }
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0");
            out.push_str(&text[last..whole.start()]);
            out.push_str(&stringify(self.lookup(&caps)?));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(Value::String(out))
    }

    fn lookup(&self, caps: &regex::Captures<'_>) -> Result<&Value, MissingReference> {
        let node = caps.get(1).expect("node capture").as_str();
        let reference = caps.get(0).expect("capture 0").as_str().to_string();
        let missing = || MissingReference {
            reference: reference.clone(),
        };

        let mut current = self.results.get(node).ok_or_else(missing)?;
        if let Some(path) = caps.get(2) {
            for part in path.as_str().split('.') {
                current = match current {
                    Value::Object(map) => map.get(part).ok_or_else(missing)?,
                    _ => return Err(missing()),
                };
            }
        }
        Ok(current)
    }
}

/// Embedded scalars read naturally inside strings; structured values keep
/// their JSON rendering.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Node ids referenced anywhere inside a template. Used to validate that
/// references only point upstream.
pub fn referenced_nodes(template: &Value) -> HashSet<String> {
    let mut found = HashSet::new();
    collect(template, &mut found);
    found
}

fn collect(value: &Value, found: &mut HashSet<String>) {
    match value {
        Value::String(text) => {
            for caps in PLACEHOLDER.captures_iter(text) {
                found.insert(caps.get(1).expect("node capture").as_str().to_string());
            }
        }
        Value::Object(map) => map.values().for_each(|v| collect(v, found)),
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        _ => {}
    }
}
