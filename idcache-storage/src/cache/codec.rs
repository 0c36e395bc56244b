//! Row <-> Arrow record batch conversion for cache files.
//!
//! Each column gets a physical type inferred from its cells:
//!
//! | cells (nulls ignored) | Arrow type |
//! |---|---|
//! | all bool | `Boolean` |
//! | all int | `Int64` |
//! | all float | `Float64` |
//! | all text, or all null | `Utf8` |
//! | anything else, including int mixed with float | `Utf8`, JSON-encoded, tagged `idcache.encoding = json` |
//!
//! `id` is always a non-nullable `Int64`. Mixed numeric columns stay JSON so
//! that integers keep their exact value and kind across rewrites.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use idcache_core::{Row, StorageError, Value, ID_COLUMN};

/// Field metadata key marking JSON-encoded text columns.
pub const ENCODING_KEY: &str = "idcache.encoding";
pub const JSON_ENCODING: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Json,
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut kind = None;
    for value in values {
        let next = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Int(_) => ColumnKind::Int64,
            Value::Float(_) => ColumnKind::Float64,
            Value::Text(_) => ColumnKind::Utf8,
            Value::Json(_) => return ColumnKind::Json,
        };
        kind = Some(match (kind, next) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            _ => return ColumnKind::Json,
        });
    }
    kind.unwrap_or(ColumnKind::Utf8)
}

fn encode_error(reason: impl Into<String>) -> StorageError {
    StorageError::Encode {
        reason: reason.into(),
    }
}

/// Encode rows into one record batch with the given column order.
///
/// `columns[0]` must be `id` and every row must carry an integer id.
///
/// JSON has no NaN or infinity, so a non-finite float in a JSON-encoded
/// column is stored as null. An all-float column keeps them in `Float64`.
pub fn encode_rows(columns: &[String], rows: &[Row]) -> Result<RecordBatch, StorageError> {
    if columns.first().map(String::as_str) != Some(ID_COLUMN) {
        return Err(encode_error("first column must be 'id'"));
    }

    let ids = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.id()
                .ok_or_else(|| encode_error(format!("row {} has no integer id", i)))
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let mut fields = vec![Field::new(ID_COLUMN, DataType::Int64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(ids))];

    for name in &columns[1..] {
        let cells = move || rows.iter().map(move |row| row.value(name));
        let (field, array): (Field, ArrayRef) = match infer_kind(cells()) {
            ColumnKind::Boolean => (
                Field::new(name, DataType::Boolean, true),
                Arc::new(BooleanArray::from(
                    cells().map(Value::as_bool).collect::<Vec<_>>(),
                )),
            ),
            ColumnKind::Int64 => (
                Field::new(name, DataType::Int64, true),
                Arc::new(Int64Array::from(
                    cells().map(Value::as_i64).collect::<Vec<_>>(),
                )),
            ),
            ColumnKind::Float64 => (
                Field::new(name, DataType::Float64, true),
                Arc::new(Float64Array::from(
                    cells().map(Value::as_f64).collect::<Vec<_>>(),
                )),
            ),
            ColumnKind::Utf8 => (
                Field::new(name, DataType::Utf8, true),
                Arc::new(StringArray::from(
                    cells().map(Value::as_str).collect::<Vec<_>>(),
                )),
            ),
            ColumnKind::Json => (
                Field::new(name, DataType::Utf8, true).with_metadata(HashMap::from([(
                    ENCODING_KEY.to_string(),
                    JSON_ENCODING.to_string(),
                )])),
                Arc::new(StringArray::from(
                    cells()
                        .map(|v| (!v.is_null()).then(|| v.to_json().to_string()))
                        .collect::<Vec<_>>(),
                )),
            ),
        };
        fields.push(field);
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| encode_error(format!("failed to build record batch: {}", e)))
}

/// Column names of a stored schema, in order.
pub fn schema_columns(schema: &SchemaRef) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

fn decode_column(field: &Field, array: &ArrayRef) -> Result<Vec<Value>, StorageError> {
    let mismatch = || {
        encode_error(format!(
            "column '{}' does not match its declared type {}",
            field.name(),
            field.data_type()
        ))
    };
    let len = array.len();
    let values = match field.data_type() {
        DataType::Int64 => {
            let a = array.as_any().downcast_ref::<Int64Array>().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Int(a.value(i)) })
                .collect()
        }
        DataType::Float64 => {
            let a = array.as_any().downcast_ref::<Float64Array>().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Float(a.value(i)) })
                .collect()
        }
        DataType::Boolean => {
            let a = array.as_any().downcast_ref::<BooleanArray>().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Bool(a.value(i)) })
                .collect()
        }
        DataType::Utf8 => {
            let a = array.as_any().downcast_ref::<StringArray>().ok_or_else(mismatch)?;
            let is_json = field.metadata().get(ENCODING_KEY).map(String::as_str)
                == Some(JSON_ENCODING);
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                if a.is_null(i) {
                    out.push(Value::Null);
                } else if is_json {
                    let doc: serde_json::Value = serde_json::from_str(a.value(i)).map_err(|e| {
                        encode_error(format!("column '{}' row {}: {}", field.name(), i, e))
                    })?;
                    out.push(Value::from_json(doc));
                } else {
                    out.push(Value::Text(a.value(i).to_string()));
                }
            }
            out
        }
        other => {
            return Err(encode_error(format!(
                "column '{}' has unsupported type {}",
                field.name(),
                other
            )))
        }
    };
    Ok(values)
}

/// Decode a record batch back into rows. Every column is present in every row.
pub fn decode_batch(batch: &RecordBatch) -> Result<Vec<Row>, StorageError> {
    let schema = batch.schema();
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        columns.push((field.name().clone(), decode_column(field, array)?));
    }

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row: Row = columns
            .iter()
            .map(|(name, values)| (name.clone(), values[i].clone()))
            .collect();
        if row.id().is_none() {
            return Err(encode_error(format!("stored row {} has no integer id", i)));
        }
        rows.push(row);
    }
    Ok(rows)
}
