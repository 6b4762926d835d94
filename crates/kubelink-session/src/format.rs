//! Result rendering.
//!
//! Operations hand documents to a [`Formatter`]; typed entities are
//! marshalled to JSON first. [`PlainFormatter`] is the built-in rendering.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

/// Renders documents into the text returned to the tool layer.
pub trait Formatter: Send + Sync {
    /// Render one object.
    fn object(&self, document: &Value) -> String;

    /// Render a list of objects of one resource type.
    fn list(&self, resource: &str, documents: &[Value]) -> String;
}

/// Pretty JSON for single objects, one summary line per listed object.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn object(&self, document: &Value) -> String {
        serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string())
    }

    fn list(&self, resource: &str, documents: &[Value]) -> String {
        let mut out = format!("{} {resource}:", documents.len());
        for document in documents {
            out.push_str("\n- ");
            out.push_str(&summary(document));
        }
        out
    }
}

/// `namespace/name` followed by the status phase, if any.
fn summary(document: &Value) -> String {
    let field = |pointer: &str| document.pointer(pointer).and_then(Value::as_str);

    let name = field("/metadata/name").unwrap_or("<unnamed>");
    let mut line = match field("/metadata/namespace").filter(|ns| !ns.is_empty()) {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_string(),
    };
    if let Some(phase) = field("/status/phase") {
        line.push_str(" (");
        line.push_str(phase);
        line.push(')');
    } else if let Some(ready) = document.pointer("/status/readyReplicas").and_then(Value::as_i64) {
        let desired = document
            .pointer("/spec/replicas")
            .and_then(Value::as_i64)
            .unwrap_or(ready);
        let _ = write!(line, " ({ready}/{desired} ready)");
    }
    line
}

/// Marshal typed entities into documents.
///
/// Entities that fail to serialize are skipped.
#[must_use]
pub fn to_documents<T: Serialize>(items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect()
}
