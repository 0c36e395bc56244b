//! Read-through orchestration: validate, look up, backfill, project.

use std::collections::{BTreeSet, HashSet};

use idcache_core::{
    extract, CacheSettings, ColumnName, Frame, IdCacheError, IdCacheResult, JsonPathError, Row,
    RowFetcher, TableName, ValidationError, Value, ID_COLUMN,
};

use super::batch::fetch_missing;
use super::store::{CacheLookup, CacheStore};

// ============================================================================
// PROJECTION
// ============================================================================

/// Outcome of resolving one dotted column against one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Value(Value),
    /// The cell resolves to null. `reason` is set when the base cell held
    /// data that could not be decoded or navigated.
    Null { reason: Option<JsonPathError> },
}

impl Projection {
    pub fn into_value(self) -> Value {
        match self {
            Projection::Value(value) => value,
            Projection::Null { .. } => Value::Null,
        }
    }

    pub fn reason(&self) -> Option<&JsonPathError> {
        match self {
            Projection::Null { reason } => reason.as_ref(),
            Projection::Value(_) => None,
        }
    }
}

/// Resolve `path` inside a base cell without ever failing.
pub fn project_field(cell: &Value, path: &str) -> Projection {
    if cell.is_null() {
        return Projection::Null { reason: None };
    }
    match extract(cell, path) {
        Ok(value) => Projection::Value(value),
        Err(e) => Projection::Null { reason: Some(e) },
    }
}

/// Validate dynamically typed ids. Only `Value::Int` is accepted.
pub fn ids_from_values(values: &[Value]) -> Result<Vec<i64>, ValidationError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value.as_i64().ok_or_else(|| ValidationError::NonIntegerId {
                index,
                value: format!("{} ({})", value, value.type_name()),
            })
        })
        .collect()
}

// ============================================================================
// READ-THROUGH CACHE
// ============================================================================

/// Id-keyed read-through cache over a [`CacheStore`].
///
/// Rows absent from the cache are fetched from the caller's source in
/// batches, persisted, and then served from the cache.
pub struct ReadThroughCache {
    store: CacheStore,
}

impl ReadThroughCache {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub fn with_settings(settings: &CacheSettings) -> Self {
        Self::new(CacheStore::new(settings))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Return `ids` from `table` with `id` plus `columns`, sorted by id.
    ///
    /// `columns` may name nested JSON fields as `base.path.to.field`; those
    /// cells resolve to null when the path cannot be followed. Requested
    /// columns are deduplicated, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// - [`IdCacheError::Validation`] for empty `columns` or a malformed `table`
    /// - [`IdCacheError::DataNotFound`] when the source lacks some ids
    /// - [`IdCacheError::ColumnNotFound`] when the source lacks a base column
    /// - [`IdCacheError::FetchStage`] for any other failure while backfilling
    pub fn get_data<S, F>(
        &self,
        ids: &[i64],
        columns: &[S],
        table: &str,
        fetcher: &F,
    ) -> IdCacheResult<Frame>
    where
        S: AsRef<str>,
        F: RowFetcher + ?Sized,
    {
        if ids.is_empty() {
            return Ok(Frame::empty());
        }
        if columns.is_empty() {
            return Err(ValidationError::EmptyColumns.into());
        }
        let table = TableName::parse(table)?;
        self.read(ids, columns, &table, fetcher)
    }

    /// [`get_data`](Self::get_data) for ids that arrive as dynamic values.
    pub fn get_data_from_values<S, F>(
        &self,
        ids: &[Value],
        columns: &[S],
        table: &str,
        fetcher: &F,
    ) -> IdCacheResult<Frame>
    where
        S: AsRef<str>,
        F: RowFetcher + ?Sized,
    {
        if ids.is_empty() {
            return Ok(Frame::empty());
        }
        if columns.is_empty() {
            return Err(ValidationError::EmptyColumns.into());
        }
        let table = TableName::parse(table)?;
        let ids = ids_from_values(ids)?;
        self.read(&ids, columns, &table, fetcher)
    }

    fn read<S, F>(
        &self,
        ids: &[i64],
        columns: &[S],
        table: &TableName,
        fetcher: &F,
    ) -> IdCacheResult<Frame>
    where
        S: AsRef<str>,
        F: RowFetcher + ?Sized,
    {
        let requested = dedup_columns(columns);
        let base_columns: BTreeSet<&str> = requested.iter().map(ColumnName::base).collect();
        let lookup_columns: Vec<&str> = base_columns.iter().copied().collect();

        let mut lookup = self.store.lookup(ids, &lookup_columns, table);
        if !lookup.is_complete() {
            let missing: Vec<i64> = lookup.missing.iter().copied().collect();
            self.backfill(&missing, &base_columns, table, fetcher)
                .map_err(IdCacheError::fetch_stage)?;
            lookup = self.store.lookup(ids, &lookup_columns, table);
        }

        let CacheLookup { mut hits, missing } = lookup;
        if !missing.is_empty() {
            return Err(IdCacheError::DataNotFound {
                ids: missing.into_iter().collect(),
            });
        }

        hits.sort_by_key(Row::id);
        let rows = hits
            .iter()
            .map(|row| project_row(row, &requested, table))
            .collect();

        let mut frame_columns = vec![ID_COLUMN.to_string()];
        frame_columns.extend(requested.iter().map(|c| c.raw().to_string()));
        Ok(Frame::new(frame_columns, rows))
    }

    /// Fetch `missing`, check it is complete, and persist it.
    fn backfill<F>(
        &self,
        missing: &[i64],
        base_columns: &BTreeSet<&str>,
        table: &TableName,
        fetcher: &F,
    ) -> IdCacheResult<()>
    where
        F: RowFetcher + ?Sized,
    {
        let fetched = fetch_missing(missing, table, fetcher)?;
        let Some(first) = fetched.first() else {
            return Err(IdCacheError::DataNotFound {
                ids: missing.to_vec(),
            });
        };

        let returned: HashSet<i64> = fetched.iter().filter_map(Row::id).collect();
        let still_missing: Vec<i64> = missing
            .iter()
            .copied()
            .filter(|id| !returned.contains(id))
            .collect();
        if !still_missing.is_empty() {
            return Err(IdCacheError::DataNotFound { ids: still_missing });
        }

        let absent: Vec<String> = base_columns
            .iter()
            .filter(|c| !first.contains(c))
            .map(|c| c.to_string())
            .collect();
        if !absent.is_empty() {
            return Err(IdCacheError::ColumnNotFound { columns: absent });
        }

        self.store.upsert(fetched, table)?;
        Ok(())
    }
}

/// Requested columns in first-seen order; `id` is always emitted first anyway.
fn dedup_columns<S: AsRef<str>>(columns: &[S]) -> Vec<ColumnName> {
    let mut seen = HashSet::from([ID_COLUMN]);
    columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| seen.insert(*c))
        .map(ColumnName::parse)
        .collect()
}

fn project_row(row: &Row, requested: &[ColumnName], table: &TableName) -> Row {
    let mut out = Row::new();
    out.insert(ID_COLUMN, row.value(ID_COLUMN).clone());
    for column in requested {
        let cell = row.value(column.base());
        let value = match column.path() {
            None => cell.clone(),
            Some(path) => {
                let projection = project_field(cell, path);
                if let Some(reason) = projection.reason() {
                    tracing::debug!(
                        table = %table,
                        id = ?row.id(),
                        column = column.raw(),
                        error = %reason,
                        "Projected unreadable JSON field as null"
                    );
                }
                projection.into_value()
            }
        };
        out.insert(column.raw(), value);
    }
    out
}
