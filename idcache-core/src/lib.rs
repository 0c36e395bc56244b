//! idcache Core - Data Types
//!
//! Cell values, rows, table and column names, the error taxonomy, and
//! configuration. Storage and the read path live in `idcache-storage`.

pub mod column;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod table;
pub mod value;

pub use column::{extract, parse_column, ColumnName, PATH_SEPARATOR};
pub use config::{default_cache_root, CacheSettings, CACHE_ROOT_ENV, CONFIG_PATH_ENV};
pub use error::{
    BoxError, ConfigError, IdCacheError, IdCacheResult, JsonPathError, StorageError,
    ValidationError,
};
pub use fetcher::RowFetcher;
pub use table::{TableName, TABLE_SEPARATOR};
pub use value::{Frame, Row, Value, ID_COLUMN};
