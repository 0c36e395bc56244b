//! idcache Storage - Cache Store and Read Path
//!
//! Parquet-backed per-table cache files, batched backfill from a
//! caller-supplied source, and the read-through orchestrator tying them
//! together. Data types and errors live in `idcache-core`.

pub mod cache;

pub use cache::{
    batch_size, fetch_missing, fetch_missing_with_report, ids_from_values, plan_batches,
    project_field, BatchFailure, CacheLookup, CacheStats, CacheStore, FetchReport, Projection,
    ReadThroughCache, StoredTable, CACHE_FILE_EXTENSION, MAX_BATCHES, MIN_BATCH_SIZE,
};
