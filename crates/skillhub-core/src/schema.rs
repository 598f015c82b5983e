//! JSON Schema validation (draft-07).
//!
//! Two call sites: the registry meta-validates submitted schemas at
//! registration, the scheduler validates inputs before dispatch and outputs
//! after a successful run. An absent or empty (`{}`) schema is permissive.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// One schema violation: where, which keyword, and why.
#[derive(Debug, Clone)]
pub struct Violation {
    /// JSON pointer into the offending document.
    pub path: String,
    /// The schema keyword that failed.
    pub keyword: String,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.message, self.keyword)
    }
}

/// Render a violation list as a single detail string.
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Whether a schema constrains anything at all.
fn is_permissive(schema: &Value) -> bool {
    match schema {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Check that `schema` is itself a well-formed draft-07 schema document.
pub fn check_schema(schema: &Value) -> Result<(), String> {
    if is_permissive(schema) {
        return Ok(());
    }
    if !schema.is_object() && !schema.is_boolean() {
        return Err("schema must be an object".to_string());
    }
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Validate `document` against `schema`. `None` and `{}` accept everything.
pub fn validate(document: &Value, schema: Option<&Value>) -> Result<(), Vec<Violation>> {
    let schema = match schema {
        Some(s) if !is_permissive(s) => s,
        _ => return Ok(()),
    };

    let compiled = match JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
    {
        Ok(c) => c,
        // Schemas are meta-validated at registration; a compile failure
        // here still must not pass the document through unchecked.
        Err(e) => {
            return Err(vec![Violation {
                path: "/".to_string(),
                keyword: "$schema".to_string(),
                message: e.to_string(),
            }]);
        }
    };

    let result = compiled.validate(document);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors
            .map(|err| {
                let path = err.instance_path.to_string();
                let keyword = err
                    .schema_path
                    .to_string()
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                Violation {
                    path: if path.is_empty() { "/".to_string() } else { path },
                    keyword,
                    message: err.to_string(),
                }
            })
            .collect()),
    }
}
