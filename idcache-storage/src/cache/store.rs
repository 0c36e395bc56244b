//! Parquet-backed cache store, one file per table.
//!
//! # File layout
//!
//! `<cache_root>/<namespace>_<name>.parquet`, one row per id, sorted by id.
//! The schema is `id` plus the union of every column ever written for the
//! table; rows written before a column existed hold null for it.
//!
//! # Failure policy
//!
//! - An unreadable file on lookup is a cold cache: warn and report every id missing.
//! - An unreadable file on upsert is discarded: warn and write the incoming rows alone.
//! - A failed write is fatal and surfaces as [`StorageError::WriteFailed`].
//!
//! # Writers
//!
//! Upserts replace the file by writing a temporary sibling and renaming it into
//! place, so readers never observe a half-written file. Upserts to the same
//! table through one store are serialized by a per-table lock; separate
//! processes sharing a cache root are not coordinated.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use arrow::record_batch::RecordBatch;
use idcache_core::{BoxError, CacheSettings, Row, StorageError, TableName, ID_COLUMN};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tempfile::NamedTempFile;

use super::codec::{decode_batch, encode_rows, schema_columns};
use super::stats::CacheStats;

/// Extension of per-table cache files.
pub const CACHE_FILE_EXTENSION: &str = "parquet";

/// Full contents of one cache file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredTable {
    /// Column names in stored order, `id` first.
    pub columns: Vec<String>,
    /// Rows ascending by id; every row holds every column.
    pub rows: Vec<Row>,
}

impl StoredTable {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheLookup {
    /// Cached rows projected to `id` plus the requested columns, ascending by id.
    pub hits: Vec<Row>,
    /// Requested ids that must be fetched.
    pub missing: BTreeSet<i64>,
}

impl CacheLookup {
    fn all_missing(ids: BTreeSet<i64>) -> Self {
        Self {
            hits: Vec::new(),
            missing: ids,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Persistent columnar store keyed by integer id.
pub struct CacheStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<TableName, Arc<Mutex<()>>>>,
    stats: RwLock<CacheStats>,
}

impl CacheStore {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            root: settings.cache_root.clone(),
            write_locks: Mutex::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cache file for `table`.
    pub fn table_path(&self, table: &TableName) -> PathBuf {
        self.root
            .join(format!("{}.{}", table.file_stem(), CACHE_FILE_EXTENSION))
    }

    /// Create the cache root, including parents, if it does not exist.
    pub fn ensure_root(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StorageError::WriteFailed {
            path: self.root.clone(),
            source: Box::new(e),
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Read the whole cache file for `table`. `Ok(None)` when no file exists.
    pub fn read_table(&self, table: &TableName) -> Result<Option<StoredTable>, StorageError> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(None);
        }
        read_file(&path)
            .map(Some)
            .map_err(|source| StorageError::ReadFailed { path, source })
    }

    /// Split `ids` into cached rows and ids that must be fetched.
    ///
    /// If any requested column is absent from the file schema, every id is
    /// reported missing, even ids the file holds.
    pub fn lookup<S: AsRef<str>>(
        &self,
        ids: &[i64],
        columns: &[S],
        table: &TableName,
    ) -> CacheLookup {
        let requested: BTreeSet<i64> = ids.iter().copied().collect();

        let stored = match self.read_table(table) {
            Ok(Some(stored)) if !stored.is_empty() => stored,
            Ok(_) => {
                self.record_lookup(0, requested.len());
                return CacheLookup::all_missing(requested);
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "Treating unreadable cache file as empty");
                self.record_corrupt_read();
                self.record_lookup(0, requested.len());
                return CacheLookup::all_missing(requested);
            }
        };

        let absent: Vec<&str> = columns
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !stored.has_column(c))
            .collect();
        if !absent.is_empty() {
            tracing::debug!(table = %table, columns = ?absent, "Cache lacks requested columns");
            self.record_lookup(0, requested.len());
            return CacheLookup::all_missing(requested);
        }

        let mut projection = vec![ID_COLUMN.to_string()];
        for column in columns {
            let column = column.as_ref();
            if !projection.iter().any(|c| c == column) {
                projection.push(column.to_string());
            }
        }

        let mut missing = requested;
        let mut hits = Vec::new();
        for row in &stored.rows {
            if let Some(id) = row.id() {
                if missing.remove(&id) {
                    hits.push(row.project(&projection));
                }
            }
        }

        tracing::debug!(table = %table, hits = hits.len(), misses = missing.len(), "Cache lookup");
        self.record_lookup(hits.len(), missing.len());
        CacheLookup { hits, missing }
    }

    /// Insert or wholly replace rows by id.
    ///
    /// Existing rows whose id appears in `rows` are dropped, never merged field
    /// by field. Columns missing on either side become null. Within `rows`,
    /// the last row for an id wins. An empty `rows` writes nothing.
    pub fn upsert(&self, rows: Vec<Row>, table: &TableName) -> Result<(), StorageError> {
        if rows.is_empty() {
            return Ok(());
        }
        for (index, row) in rows.iter().enumerate() {
            if row.id().is_none() {
                return Err(StorageError::InvalidRow {
                    index,
                    reason: "row must contain an integer 'id'".to_string(),
                });
            }
        }

        let lock = self.table_lock(table);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.table_path(table);
        let existing = match self.read_table(table) {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    error = %e,
                    "Discarding unreadable cache file and starting fresh"
                );
                None
            }
        };

        let incoming_count = rows.len();
        let (columns, merged) = merge(existing, rows);
        let batch = encode_rows(&columns, &merged)?;

        self.ensure_root()?;
        self.write_file(&path, &batch)
            .map_err(|source| StorageError::WriteFailed {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            table = %table,
            path = %path.display(),
            written = incoming_count,
            total = merged.len(),
            "Persisted rows to cache"
        );
        if let Ok(mut stats) = self.stats.write() {
            stats.rows_written += incoming_count as u64;
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, batch: &RecordBatch) -> Result<(), BoxError> {
        let mut temp = NamedTempFile::new_in(&self.root)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(temp.as_file_mut(), batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        temp.as_file().sync_all()?;
        temp.persist(path)?;
        Ok(())
    }

    fn table_lock(&self, table: &TableName) -> Arc<Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(table.clone()).or_default())
    }

    fn record_lookup(&self, hits: usize, misses: usize) {
        if let Ok(mut stats) = self.stats.write() {
            stats.hits += hits as u64;
            stats.misses += misses as u64;
        }
    }

    fn record_corrupt_read(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.corrupt_reads += 1;
        }
    }
}

fn read_file(path: &Path) -> Result<StoredTable, BoxError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let columns = schema_columns(builder.schema());
    if columns.first().map(String::as_str) != Some(ID_COLUMN) {
        return Err(format!("cache file {} has no leading 'id' column", path.display()).into());
    }

    let mut rows = Vec::new();
    for batch in builder.build()? {
        rows.extend(decode_batch(&batch?)?);
    }
    Ok(StoredTable { columns, rows })
}

/// Union existing and incoming rows; incoming ids replace existing ones whole.
fn merge(existing: Option<StoredTable>, incoming: Vec<Row>) -> (Vec<String>, Vec<Row>) {
    let mut columns = vec![ID_COLUMN.to_string()];
    let mut seen: HashSet<String> = columns.iter().cloned().collect();
    let mut by_id: BTreeMap<i64, Row> = BTreeMap::new();

    if let Some(stored) = existing {
        for column in stored.columns {
            if seen.insert(column.clone()) {
                columns.push(column);
            }
        }
        for row in stored.rows {
            if let Some(id) = row.id() {
                by_id.insert(id, row);
            }
        }
    }

    let mut replaced: BTreeMap<i64, Row> = BTreeMap::new();
    for row in incoming {
        for column in row.columns() {
            if seen.insert(column.to_string()) {
                columns.push(column.to_string());
            }
        }
        if let Some(id) = row.id() {
            replaced.insert(id, row);
        }
    }
    by_id.extend(replaced);

    (columns, by_id.into_values().collect())
}
