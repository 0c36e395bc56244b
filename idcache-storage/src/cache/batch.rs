//! Bounded batch backfill over a caller-supplied fetcher.
//!
//! Missing ids are cut into consecutive chunks of [`batch_size`] ids and
//! fetched one chunk at a time, in order. A failing chunk is recorded and
//! skipped, never retried; the call as a whole fails only when nothing at all
//! was fetched.

use idcache_core::{IdCacheError, IdCacheResult, Row, RowFetcher, TableName};

/// Smallest batch ever dispatched (except a shorter final batch).
pub const MIN_BATCH_SIZE: usize = 100;

/// Upper bound on the number of batches for one backfill.
pub const MAX_BATCHES: usize = 100;

/// `max(100, ceil(missing / 100))`; 100 for an empty request.
pub fn batch_size(missing: usize) -> usize {
    if missing == 0 {
        return MIN_BATCH_SIZE;
    }
    missing.div_ceil(MAX_BATCHES).max(MIN_BATCH_SIZE)
}

/// Cut `ids` into order-preserving batches.
pub fn plan_batches(ids: &[i64]) -> Vec<&[i64]> {
    ids.chunks(batch_size(ids.len())).collect()
}

/// One batch that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based batch position.
    pub index: usize,
    pub ids: Vec<i64>,
    pub message: String,
}

/// Everything a backfill produced, including per-batch failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    /// Number of batches dispatched.
    pub batches: usize,
    /// Rows from successful batches, in batch order.
    pub rows: Vec<Row>,
    pub failures: Vec<BatchFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rows are usable only if each carries an integer id.
fn check_batch(rows: &[Row]) -> Result<(), String> {
    match rows.iter().position(|r| r.id().is_none()) {
        Some(pos) => Err(format!(
            "Fetcher returned a row without an integer 'id' at position {}",
            pos
        )),
        None => Ok(()),
    }
}

/// Fetch `missing` batch by batch and report every outcome.
pub fn fetch_missing_with_report<F>(missing: &[i64], table: &TableName, fetcher: &F) -> FetchReport
where
    F: RowFetcher + ?Sized,
{
    let mut report = FetchReport::default();
    if missing.is_empty() {
        return report;
    }

    let batches = plan_batches(missing);
    report.batches = batches.len();

    for (index, ids) in batches.into_iter().enumerate() {
        let outcome = fetcher
            .fetch(ids, table)
            .map_err(|e| e.to_string())
            .and_then(|rows| check_batch(&rows).map(|()| rows));

        match outcome {
            Ok(rows) => report.rows.extend(rows),
            Err(message) => {
                tracing::warn!(
                    table = %table,
                    batch = index + 1,
                    error = %message,
                    "Batch failed"
                );
                report.failures.push(BatchFailure {
                    index,
                    ids: ids.to_vec(),
                    message,
                });
            }
        }

        tracing::debug!(
            table = %table,
            batch = index + 1,
            batches = report.batches,
            fetched = report.rows.len(),
            total = missing.len(),
            "Fetched batch"
        );
    }

    report
}

/// Fetch `missing` in batches, returning the rows of every successful batch.
///
/// Fails with [`IdCacheError::AllBatchesFailed`] only when no rows were
/// fetched and at least one batch failed. Partial failure is logged, not
/// returned.
pub fn fetch_missing<F>(missing: &[i64], table: &TableName, fetcher: &F) -> IdCacheResult<Vec<Row>>
where
    F: RowFetcher + ?Sized,
{
    let report = fetch_missing_with_report(missing, table, fetcher);

    if report.rows.is_empty() {
        if let Some(first) = report.failures.first() {
            return Err(IdCacheError::AllBatchesFailed {
                failed: report.failures.len(),
                first_error: first.message.clone(),
            });
        }
    }

    if !report.failures.is_empty() {
        tracing::warn!(
            table = %table,
            failed = report.failures.len(),
            batches = report.batches,
            "{} out of {} batches failed",
            report.failures.len(),
            report.batches
        );
    }

    Ok(report.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idcache_core::BoxError;
    use std::cell::RefCell;

    fn table() -> TableName {
        TableName::parse("public.users").unwrap()
    }

    fn rows_for(ids: &[i64]) -> Vec<Row> {
        ids.iter()
            .map(|&id| Row::with_id(id).with("name", format!("User{}", id)))
            .collect()
    }

    #[test]
    fn test_batch_size_examples() {
        assert_eq!(batch_size(1), 100);
        assert_eq!(batch_size(50), 100);
        assert_eq!(batch_size(500), 100);
        assert_eq!(batch_size(10_000), 100);
        assert_eq!(batch_size(10_001), 101);
        assert_eq!(batch_size(15_000), 150);
        assert_eq!(batch_size(1_000_000), 10_000);
    }

    #[test]
    fn test_batch_size_empty_is_floor() {
        assert_eq!(batch_size(0), 100);
    }

    #[test]
    fn test_plan_batches_preserves_order() {
        let ids: Vec<i64> = (1..=250).collect();
        let batches = plan_batches(&ids);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[2], &ids[200..]);
        assert_eq!(batches.concat(), ids);
    }

    #[test]
    fn test_empty_request_skips_fetcher() {
        let fetcher = |_ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
            panic!("fetcher must not be called")
        };
        assert!(fetch_missing(&[], &table(), &fetcher).unwrap().is_empty());
    }

    #[test]
    fn test_single_batch() {
        let calls = RefCell::new(Vec::new());
        let fetcher = |ids: &[i64], t: &TableName| -> Result<Vec<Row>, BoxError> {
            calls.borrow_mut().push((ids.to_vec(), t.to_string()));
            Ok(rows_for(ids))
        };

        let rows = fetch_missing(&[1, 2, 3], &table(), &fetcher).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            calls.into_inner(),
            vec![(vec![1, 2, 3], "public.users".to_string())]
        );
    }

    #[test]
    fn test_multiple_batches_keep_order() {
        let ids: Vec<i64> = (1..=250).collect();
        let calls = RefCell::new(0usize);
        let fetcher = |ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
            *calls.borrow_mut() += 1;
            Ok(rows_for(ids))
        };

        let rows = fetch_missing(&ids, &table(), &fetcher).unwrap();
        assert_eq!(*calls.borrow(), 3);
        let fetched: Vec<i64> = rows.iter().filter_map(Row::id).collect();
        assert_eq!(fetched, ids);
    }

    #[test]
    fn test_partial_failure_returns_successful_rows() {
        let ids: Vec<i64> = (1..=300).collect();
        let fetcher = |ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
            if ids.contains(&150) {
                Err("database timeout".into())
            } else {
                Ok(rows_for(ids))
            }
        };

        let report = fetch_missing_with_report(&ids, &table(), &fetcher);
        assert_eq!(report.batches, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].ids, (101..=200).collect::<Vec<_>>());
        assert_eq!(report.failures[0].message, "database timeout");

        let rows = fetch_missing(&ids, &table(), &fetcher).unwrap();
        assert_eq!(rows.len(), 200);
    }

    #[test]
    fn test_all_batches_fail() {
        let ids: Vec<i64> = (1..=250).collect();
        let fetcher = |_ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
            Err("connection refused".into())
        };

        let err = fetch_missing(&ids, &table(), &fetcher).unwrap_err();
        match err {
            IdCacheError::AllBatchesFailed {
                failed,
                first_error,
            } => {
                assert_eq!(failed, 3);
                assert_eq!(first_error, "connection refused");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_row_without_id_fails_its_batch() {
        let fetcher = |_ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
            Ok(vec![Row::new().with("name", "anonymous")])
        };

        let report = fetch_missing_with_report(&[1], &table(), &fetcher);
        assert!(report.rows.is_empty());
        assert!(report.failures[0].message.contains("without an integer 'id'"));
        assert!(matches!(
            fetch_missing(&[1], &table(), &fetcher),
            Err(IdCacheError::AllBatchesFailed { failed: 1, .. })
        ));
    }

    #[test]
    fn test_empty_success_is_not_a_failure() {
        let fetcher = |_ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
            Ok(Vec::new())
        };
        let rows = fetch_missing(&[1, 2], &table(), &fetcher).unwrap();
        assert!(rows.is_empty());
    }
}
