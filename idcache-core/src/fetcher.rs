//! The caller-supplied row source.

use crate::{BoxError, Row, TableName};

/// Source of rows for ids the cache does not hold, typically a database query.
///
/// Implementations block until the batch is fetched. Every returned row must
/// carry an integer `id`; returned rows should hold every requested base
/// column for the result to be usable.
pub trait RowFetcher {
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError>;
}

impl<F> RowFetcher for F
where
    F: Fn(&[i64], &TableName) -> Result<Vec<Row>, BoxError>,
{
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError> {
        self(ids, table)
    }
}
