//! Id-keyed read-through cache persisted as one Parquet file per table.
//!
//! # Read path
//!
//! A read asks the [`CacheStore`] for the requested ids. Ids the store cannot
//! serve, including every id when the store lacks a requested column, are
//! fetched from the caller's [`RowFetcher`](idcache_core::RowFetcher) in bounded
//! batches, checked for completeness, written back, and then served from the
//! store like any other hit.
//!
//! # Example
//!
//! ```ignore
//! let cache = ReadThroughCache::with_settings(&CacheSettings::load()?);
//! let frame = cache.get_data(&[1, 2, 3], &["name", "profile.address.city"], "public.users", &db)?;
//! for row in frame.rows() {
//!     println!("{}: {}", row.value("id"), row.value("profile.address.city"));
//! }
//! ```

pub mod batch;
pub mod codec;
pub mod read_through;
pub mod stats;
pub mod store;

pub use batch::{
    batch_size, fetch_missing, fetch_missing_with_report, plan_batches, BatchFailure,
    FetchReport, MAX_BATCHES, MIN_BATCH_SIZE,
};
pub use codec::{ENCODING_KEY, JSON_ENCODING};
pub use read_through::{ids_from_values, project_field, Projection, ReadThroughCache};
pub use stats::CacheStats;
pub use store::{CacheLookup, CacheStore, StoredTable, CACHE_FILE_EXTENSION};
