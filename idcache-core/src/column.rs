//! Dotted column names and nested JSON extraction.
//!
//! A requested column such as `"profile.address.city"` names a stored base
//! column (`profile`) and a path into the JSON document held by that column
//! (`address.city`). Parsing splits once, at the first dot, and keeps the
//! remainder verbatim; the remainder is only split into segments when a value
//! is actually navigated.

use crate::{JsonPathError, Value};

/// Separator between the base column and the JSON path, and between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Split a column name at its first dot.
///
/// `"a..b"` yields `("a", Some(".b"))`; `"col."` yields `("col", Some(""))`.
pub fn parse_column(column: &str) -> (&str, Option<&str>) {
    match column.split_once(PATH_SEPARATOR) {
        Some((base, path)) => (base, Some(path)),
        None => (column, None),
    }
}

/// A requested column, decomposed into base column and optional JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnName {
    raw: String,
    base: String,
    path: Option<String>,
}

impl ColumnName {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (base, path) = parse_column(&raw);
        let base = base.to_string();
        let path = path.map(str::to_string);
        Self { raw, base, path }
    }

    /// The name exactly as requested.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The stored column this name reads from.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The literal remainder after the first dot.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        self.path.is_some()
    }
}

/// Extract the value at `path` from a JSON-bearing cell.
///
/// Text cells are decoded as JSON first; structured cells must be objects.
/// An empty path returns the whole decoded document.
pub fn extract(value: &Value, path: &str) -> Result<Value, JsonPathError> {
    let decoded = match value {
        Value::Text(s) => serde_json::from_str::<serde_json::Value>(s).map_err(|e| {
            JsonPathError::Decode {
                reason: e.to_string(),
            }
        })?,
        Value::Json(doc @ serde_json::Value::Object(_)) => doc.clone(),
        other => {
            return Err(JsonPathError::UnsupportedType {
                type_name: other.type_name(),
            })
        }
    };

    if path.is_empty() {
        return Ok(Value::from_json(decoded));
    }

    let mut current = &decoded;
    for key in path.split(PATH_SEPARATOR) {
        let object = current.as_object().ok_or_else(|| JsonPathError::Navigation {
            key: key.to_string(),
            type_name: json_type_name(current),
        })?;
        current = object.get(key).ok_or_else(|| JsonPathError::PathNotFound {
            path: path.to_string(),
            key: key.to_string(),
        })?;
    }
    Ok(Value::from_json(current.clone()))
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
