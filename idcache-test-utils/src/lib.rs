//! idcache Test Utilities
//!
//! Shared test infrastructure for the idcache workspace:
//! - Mock row sources and fetchers with scripted failures
//! - Proptest generators for cell values, rows, and column names
//! - Fixtures for common tables and cache roots
//! - Assertions for idcache error variants

pub use idcache_core::{
    BoxError, CacheSettings, Frame, IdCacheError, IdCacheResult, Row, RowFetcher, TableName,
    ValidationError, Value,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

// ============================================================================
// MOCK SOURCES
// ============================================================================

/// In-memory database keyed by table name, then id.
///
/// Fetching returns the rows it holds for the requested ids, in request
/// order, and silently skips ids it does not hold.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    tables: HashMap<String, BTreeMap<i64, Row>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bulk insert. Rows without an integer id are ignored.
    pub fn with_rows(mut self, table: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        for row in rows {
            self.insert(table, row);
        }
        self
    }

    pub fn insert(&mut self, table: &str, row: Row) {
        if let Some(id) = row.id() {
            self.tables
                .entry(table.to_string())
                .or_default()
                .insert(id, row);
        }
    }

    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, BTreeMap::len)
    }
}

impl RowFetcher for MockSource {
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError> {
        let Some(rows) = self.tables.get(table.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }
}

/// Fetcher that fails every call with the same message.
#[derive(Debug, Clone)]
pub struct FailingFetcher {
    message: String,
}

impl FailingFetcher {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingFetcher {
    fn default() -> Self {
        Self::new("source unavailable")
    }
}

impl RowFetcher for FailingFetcher {
    fn fetch(&self, _ids: &[i64], _table: &TableName) -> Result<Vec<Row>, BoxError> {
        Err(self.message.clone().into())
    }
}

/// One call observed by a [`RecordingFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub ids: Vec<i64>,
    pub table: String,
}

/// Wraps a fetcher and records every call made through it.
#[derive(Debug, Default)]
pub struct RecordingFetcher<F> {
    inner: F,
    calls: Mutex<Vec<FetchCall>>,
}

impl<F> RecordingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every id requested so far, in call order.
    pub fn requested_ids(&self) -> Vec<i64> {
        self.calls().into_iter().flat_map(|c| c.ids).collect()
    }
}

impl<F: RowFetcher> RowFetcher for RecordingFetcher<F> {
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FetchCall {
                ids: ids.to_vec(),
                table: table.to_string(),
            });
        self.inner.fetch(ids, table)
    }
}

/// Delegates to `inner` except on the listed zero-based call numbers, which fail.
#[derive(Debug)]
pub struct FailOnCalls<F> {
    inner: F,
    failing: Vec<usize>,
    seen: Mutex<usize>,
}

impl<F> FailOnCalls<F> {
    pub fn new(inner: F, failing: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner,
            failing: failing.into_iter().collect(),
            seen: Mutex::new(0),
        }
    }
}

impl<F: RowFetcher> RowFetcher for FailOnCalls<F> {
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError> {
        let call = {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            let call = *seen;
            *seen += 1;
            call
        };
        if self.failing.contains(&call) {
            return Err(format!("scripted failure on call {}", call).into());
        }
        self.inner.fetch(ids, table)
    }
}

/// Delegates to `inner`, then removes one column from every returned row.
#[derive(Debug, Clone)]
pub struct DropColumn<F> {
    inner: F,
    column: String,
}

impl<F> DropColumn<F> {
    pub fn new(inner: F, column: impl Into<String>) -> Self {
        Self {
            inner,
            column: column.into(),
        }
    }
}

impl<F: RowFetcher> RowFetcher for DropColumn<F> {
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError> {
        let rows = self.inner.fetch(ids, table)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(k, _)| *k != self.column)
                    .collect::<Row>()
            })
            .collect())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for idcache values and requests.

    use super::*;
    use proptest::prelude::*;

    /// A scalar cell value, including null.
    pub fn arb_scalar_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1.0e9f64..1.0e9).prop_map(Value::Float),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
        ]
    }

    /// A plain column identifier without dots.
    pub fn arb_column_ident() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,10}"
    }

    /// A column name that may carry a dotted JSON path.
    pub fn arb_column_name() -> impl Strategy<Value = String> {
        (
            arb_column_ident(),
            proptest::collection::vec(arb_column_ident(), 0..3),
        )
            .prop_map(|(base, path)| {
                std::iter::once(base)
                    .chain(path)
                    .collect::<Vec<_>>()
                    .join(".")
            })
    }

    /// A valid `namespace.name` table identifier.
    pub fn arb_table_name() -> impl Strategy<Value = String> {
        (arb_column_ident(), arb_column_ident()).prop_map(|(ns, name)| format!("{}.{}", ns, name))
    }

    /// A row with the given id and scalar cells for `columns`.
    pub fn arb_row(id: i64, columns: Vec<String>) -> impl Strategy<Value = Row> {
        proptest::collection::vec(arb_scalar_value(), columns.len()).prop_map(move |values| {
            columns
                .iter()
                .cloned()
                .zip(values)
                .fold(Row::with_id(id), |row, (c, v)| row.with(c, v))
        })
    }

    /// A non-empty set of distinct ids.
    pub fn arb_ids(max: usize) -> impl Strategy<Value = Vec<i64>> {
        proptest::collection::btree_set(0i64..100_000, 1..=max)
            .prop_map(|ids| ids.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows, sources, and cache roots.

    use super::*;
    use serde_json::json;

    pub const USERS_TABLE: &str = "public.users";
    pub const ORDERS_TABLE: &str = "public.orders";

    /// A user row with a JSON-encoded text `profile`.
    pub fn user(id: i64) -> Row {
        let city = ["NYC", "Boston", "Austin", "Denver"][id.unsigned_abs() as usize % 4];
        Row::with_id(id)
            .with("name", format!("User{}", id))
            .with("age", 20 + id % 50)
            .with("email", format!("user{}@example.com", id))
            .with(
                "profile",
                json!({
                    "address": {"city": city, "zip": format!("{:05}", id)},
                    "preferences": {"theme": if id % 2 == 0 { "dark" } else { "light" }}
                })
                .to_string(),
            )
    }

    /// An order row with a structured `items` cell.
    pub fn order(id: i64) -> Row {
        Row::with_id(id)
            .with("user_id", 1 + id % 10)
            .with("total", id as f64 * 9.99)
            .with("shipped", id % 3 == 0)
            .with("items", Value::Json(json!({"count": id % 5 + 1})))
    }

    /// Source holding users and orders for ids `1..=n`.
    pub fn mock_source(n: i64) -> MockSource {
        MockSource::new()
            .with_rows(USERS_TABLE, (1..=n).map(user))
            .with_rows(ORDERS_TABLE, (1..=n).map(order))
    }

    /// Settings rooted inside a fresh temporary directory.
    ///
    /// The directory is deleted when the returned guard drops.
    pub fn temp_settings() -> (tempfile::TempDir, CacheSettings) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create temp dir: {}", e));
        let settings = CacheSettings::with_root(dir.path().join("cached_data"));
        (dir, settings)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on idcache results.

    use super::*;

    /// Assert that a read failed with `DataNotFound` naming exactly `ids`.
    #[track_caller]
    pub fn assert_data_not_found<T: std::fmt::Debug>(result: &IdCacheResult<T>, ids: &[i64]) {
        match result {
            Err(IdCacheError::DataNotFound { ids: got }) => {
                assert_eq!(got.as_slice(), ids, "Wrong ids in DataNotFound");
            }
            other => panic!("Expected DataNotFound {:?}, got: {:?}", ids, other),
        }
    }

    /// Assert that a read failed with `ColumnNotFound` naming exactly `columns`.
    #[track_caller]
    pub fn assert_column_not_found<T: std::fmt::Debug>(
        result: &IdCacheResult<T>,
        columns: &[&str],
    ) {
        match result {
            Err(IdCacheError::ColumnNotFound { columns: got }) => {
                assert_eq!(got, columns, "Wrong columns in ColumnNotFound");
            }
            other => panic!("Expected ColumnNotFound {:?}, got: {:?}", columns, other),
        }
    }

    /// Assert that a read failed with a validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &IdCacheResult<T>) {
        match result {
            Err(IdCacheError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a read failed in the fetch stage with every batch failing.
    #[track_caller]
    pub fn assert_all_batches_failed<T: std::fmt::Debug>(result: &IdCacheResult<T>) {
        match result {
            Err(err @ IdCacheError::FetchStage { .. }) => {
                assert!(
                    matches!(err.root(), IdCacheError::AllBatchesFailed { .. }),
                    "Expected AllBatchesFailed inside FetchStage, got: {:?}",
                    err
                );
            }
            other => panic!("Expected FetchStage error, got: {:?}", other),
        }
    }

    /// Assert that a frame holds exactly `ids`, ascending.
    #[track_caller]
    pub fn assert_frame_ids(frame: &Frame, ids: &[i64]) {
        assert_eq!(frame.ids(), ids, "Unexpected frame ids");
    }
}
