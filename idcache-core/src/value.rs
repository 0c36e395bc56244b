//! Cell values, rows, and result frames.
//!
//! A cell holds one of a closed set of shapes. Nested JSON is kept either as
//! raw encoded text ([`Value::Text`]) or as an already-structured document
//! ([`Value::Json`]); projection handles both.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Name of the identifier column every row and store carries.
pub const ID_COLUMN: &str = "id";

static NULL: Value = Value::Null;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Structured JSON (object or array).
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload. Only [`Value::Int`] qualifies; floats and booleans do not.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Json(serde_json::Value::Object(_)) => "json object",
            Value::Json(serde_json::Value::Array(_)) => "json array",
            Value::Json(_) => "json scalar",
        }
    }

    /// Convert a decoded JSON document into a cell.
    ///
    /// Integral numbers become [`Value::Int`], other numbers [`Value::Float`],
    /// strings [`Value::Text`], and objects/arrays stay structured.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s),
            structured @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Value::Json(structured)
            }
        }
    }

    /// Encode this cell as a JSON document. Non-finite floats encode as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// ROW
// ============================================================================

/// A set of named cells for one identifier.
///
/// Cells are kept in column-name order; the requested output order lives on
/// [`Frame`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a row holding only its identifier.
    pub fn with_id(id: i64) -> Self {
        Self::new().with(ID_COLUMN, id)
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.cells.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    /// Cell value, treating an absent column as null.
    pub fn value(&self, column: &str) -> &Value {
        self.cells.get(column).unwrap_or(&NULL)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    /// The integer identifier, if the `id` cell holds one.
    pub fn id(&self) -> Option<i64> {
        self.cells.get(ID_COLUMN).and_then(Value::as_i64)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// A row holding exactly `columns`; absent cells become null.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Row {
        columns
            .iter()
            .map(|c| {
                let name = c.as_ref();
                (name.to_string(), self.value(name).clone())
            })
            .collect()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ============================================================================
// FRAME
// ============================================================================

/// Ordered result of a read: `id` first, then the requested columns in the
/// order the caller gave them, rows ascending by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// The empty result returned for an empty id list.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().filter_map(Row::id).collect()
    }

    /// Values down one column, in row order.
    pub fn column(&self, name: &str) -> Vec<&Value> {
        self.rows.iter().map(|r| r.value(name)).collect()
    }

    /// The row for `id`, if present.
    pub fn get(&self, id: i64) -> Option<&Row> {
        self.rows.iter().find(|r| r.id() == Some(id))
    }

    /// Cell values of one row in column order.
    pub fn row_values(&self, index: usize) -> Option<Vec<&Value>> {
        let row = self.rows.get(index)?;
        Some(self.columns.iter().map(|c| row.value(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_name_distinguishes_json_payloads() {
        assert_eq!(Value::Json(json!({"a": 1})).type_name(), "json object");
        assert_eq!(Value::Json(json!([1, 2])).type_name(), "json array");
        assert_eq!(Value::Json(json!(5)).type_name(), "json scalar");
        assert_eq!(Value::Json(json!(null)).type_name(), "json scalar");
    }

    #[test]
    fn test_from_json_number_kinds() {
        assert_eq!(Value::from_json(json!(3)), Value::Int(3));
        assert_eq!(Value::from_json(json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from_json(json!("x")), Value::Text("x".into()));
        assert_eq!(Value::from_json(json!(null)), Value::Null);
        assert!(matches!(Value::from_json(json!({"a": 1})), Value::Json(_)));
        assert!(matches!(Value::from_json(json!([1, 2])), Value::Json(_)));
    }

    #[test]
    fn test_to_json_non_finite_float_is_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Float(1.5).to_json(), json!(1.5));
    }

    #[test]
    fn test_accessors_are_strict() {
        assert_eq!(Value::Int(4).as_i64(), Some(4));
        assert_eq!(Value::Float(4.0).as_i64(), None);
        assert_eq!(Value::Bool(true).as_i64(), None);
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Text("a".into()).as_str(), Some("a"));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
    }

    #[test]
    fn test_row_id_requires_integer() {
        assert_eq!(Row::with_id(7).id(), Some(7));
        assert_eq!(Row::new().with("id", "7").id(), None);
        assert_eq!(Row::new().with("name", "x").id(), None);
    }

    #[test]
    fn test_row_project_fills_nulls() {
        let row = Row::with_id(1).with("name", "Alice");
        let projected = row.project(&["id", "name", "age"]);
        assert_eq!(projected.len(), 3);
        assert_eq!(projected.get("age"), Some(&Value::Null));
        assert_eq!(projected.get("name"), Some(&Value::Text("Alice".into())));
    }

    #[test]
    fn test_row_serializes_as_object() {
        let row = Row::with_id(1).with("name", "A");
        let encoded = serde_json::to_value(&row).unwrap();
        assert_eq!(encoded, json!({"id": 1, "name": "A"}));
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(
            vec!["id".into(), "name".into()],
            vec![
                Row::with_id(1).with("name", "A"),
                Row::with_id(2).with("name", "B"),
            ],
        );
        assert_eq!(frame.ids(), vec![1, 2]);
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.column("name"),
            vec![&Value::Text("A".into()), &Value::Text("B".into())]
        );
        assert_eq!(frame.get(2).and_then(|r| r.get("name")), Some(&Value::Text("B".into())));
        assert_eq!(
            frame.row_values(0),
            Some(vec![&Value::Int(1), &Value::Text("A".into())])
        );
        assert!(Frame::empty().is_empty());
    }
}
