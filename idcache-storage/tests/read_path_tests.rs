//! End-to-end read path tests against a temporary cache root.

use idcache_core::{BoxError, IdCacheError, Row, TableName, Value};
use idcache_storage::{CacheStore, ReadThroughCache};
use idcache_test_utils::assertions::{
    assert_all_batches_failed, assert_column_not_found, assert_data_not_found, assert_frame_ids,
    assert_validation_error,
};
use idcache_test_utils::fixtures::{self, mock_source, temp_settings, USERS_TABLE};
use idcache_test_utils::{DropColumn, FailOnCalls, FailingFetcher, MockSource, RecordingFetcher};
use serde_json::json;

fn cache() -> (tempfile::TempDir, ReadThroughCache) {
    let (dir, settings) = temp_settings();
    (dir, ReadThroughCache::with_settings(&settings))
}

// ============================================================================
// ROUND TRIP
// ============================================================================

#[test]
fn test_second_read_is_served_from_cache() {
    let (_dir, cache) = cache();
    let source = MockSource::new().with_rows(
        "s.t",
        [
            Row::with_id(1).with("name", "A").with("age", 1),
            Row::with_id(2).with("name", "B").with("age", 2),
        ],
    );

    let first = cache.get_data(&[1, 2], &["name", "age"], "s.t", &source).unwrap();
    let second = cache
        .get_data(&[1, 2], &["name", "age"], "s.t", &FailingFetcher::default())
        .unwrap();

    assert_eq!(first, second);
    assert_frame_ids(&second, &[1, 2]);
    assert_eq!(second.get(1).unwrap().get("name"), Some(&Value::from("A")));
    assert_eq!(second.get(2).unwrap().get("age"), Some(&Value::Int(2)));
}

#[test]
fn test_cache_survives_new_store_instance() {
    let (_dir, settings) = temp_settings();
    let source = mock_source(5);

    ReadThroughCache::with_settings(&settings)
        .get_data(&[1, 2, 3], &["name"], USERS_TABLE, &source)
        .unwrap();

    let reopened = ReadThroughCache::new(CacheStore::new(&settings));
    let frame = reopened
        .get_data(&[3, 1], &["name"], USERS_TABLE, &FailingFetcher::default())
        .unwrap();
    assert_frame_ids(&frame, &[1, 3]);
}

#[test]
fn test_results_are_sorted_by_id() {
    let (_dir, cache) = cache();
    let frame = cache
        .get_data(&[5, 3, 9, 1], &["name"], USERS_TABLE, &mock_source(10))
        .unwrap();
    assert_frame_ids(&frame, &[1, 3, 5, 9]);
}

#[test]
fn test_partial_hit_fetches_only_missing() {
    let (_dir, cache) = cache();
    let source = RecordingFetcher::new(mock_source(10));

    cache.get_data(&[1, 2], &["name"], USERS_TABLE, &source).unwrap();
    cache.get_data(&[1, 2, 3, 4], &["name"], USERS_TABLE, &source).unwrap();

    assert_eq!(source.call_count(), 2);
    assert_eq!(source.calls()[1].ids, vec![3, 4]);
}

// ============================================================================
// COLUMN GAPS
// ============================================================================

/// Caches `name` only for the given ids, as an earlier narrower read would.
fn seed_names(cache: &ReadThroughCache, ids: &[i64]) -> TableName {
    let table = TableName::parse(USERS_TABLE).unwrap();
    let rows = ids
        .iter()
        .map(|&id| Row::with_id(id).with("name", format!("User{}", id)))
        .collect();
    cache.store().upsert(rows, &table).unwrap();
    table
}

#[test]
fn test_new_column_refetches_every_id() {
    let (_dir, cache) = cache();
    seed_names(&cache, &[1, 2]);
    let source = RecordingFetcher::new(mock_source(10));

    let frame = cache
        .get_data(&[1, 2], &["name", "email"], USERS_TABLE, &source)
        .unwrap();

    assert_eq!(source.call_count(), 1);
    assert_eq!(source.calls()[0].ids, vec![1, 2]);
    assert_eq!(
        frame.get(2).unwrap().get("email"),
        Some(&Value::from("user2@example.com"))
    );
}

#[test]
fn test_column_gap_refetch_does_not_lose_other_rows() {
    let (_dir, cache) = cache();
    let table = seed_names(&cache, &[1, 2, 3]);
    let source = RecordingFetcher::new(mock_source(10));

    cache.get_data(&[1], &["name", "age"], USERS_TABLE, &source).unwrap();
    assert_eq!(source.calls()[0].ids, vec![1]);

    let stored = cache.store().read_table(&table).unwrap().unwrap();
    assert_eq!(stored.rows.len(), 3);
    let age_of = |id: i64| {
        stored
            .rows
            .iter()
            .find(|row| row.id() == Some(id))
            .and_then(|row| row.get("age").cloned())
    };
    assert!(matches!(age_of(1), Some(Value::Int(_))));
    // Rows 2 and 3 were cached before `age` existed.
    assert_eq!(age_of(2), Some(Value::Null));
    assert_eq!(age_of(3), Some(Value::Null));
}

// ============================================================================
// TYPED FAILURES
// ============================================================================

#[test]
fn test_missing_ids_are_reported() {
    let (_dir, cache) = cache();
    let source = MockSource::new().with_rows("s.t", [Row::with_id(1).with("name", "A")]);

    let result = cache.get_data(&[1, 2, 3], &["name"], "s.t", &source);
    assert_data_not_found(&result, &[2, 3]);
}

#[test]
fn test_empty_fetch_reports_every_missing_id() {
    let (_dir, cache) = cache();
    let result = cache.get_data(&[7, 4], &["name"], "s.t", &MockSource::new());
    assert_data_not_found(&result, &[4, 7]);
}

#[test]
fn test_missing_column_is_reported() {
    let (_dir, cache) = cache();
    let source = DropColumn::new(mock_source(3), "age");

    let result = cache.get_data(&[1, 2], &["name", "age"], USERS_TABLE, &source);
    assert_column_not_found(&result, &["age"]);
}

#[test]
fn test_failed_read_writes_nothing() {
    let (_dir, cache) = cache();
    let source = DropColumn::new(mock_source(3), "age");
    let _ = cache.get_data(&[1], &["name", "age"], USERS_TABLE, &source);

    let table = TableName::parse(USERS_TABLE).unwrap();
    assert!(cache.store().read_table(&table).unwrap().is_none());
}

#[test]
fn test_all_batches_failing_is_wrapped() {
    let (_dir, cache) = cache();
    let ids: Vec<i64> = (1..=250).collect();

    let result = cache.get_data(&ids, &["name"], USERS_TABLE, &FailingFetcher::new("db down"));
    assert_all_batches_failed(&result);
    let message = result.unwrap_err().to_string();
    assert!(message.starts_with("Error fetching data"));
    assert!(message.contains("db down"));
}

#[test]
fn test_partial_batch_failure_surfaces_as_missing_ids() {
    let (_dir, cache) = cache();
    let ids: Vec<i64> = (1..=300).collect();
    let source = FailOnCalls::new(mock_source(300), [1]);

    let result = cache.get_data(&ids, &["name"], USERS_TABLE, &source);
    let expected: Vec<i64> = (101..=200).collect();
    assert_data_not_found(&result, &expected);
}

#[test]
fn test_validation_errors() {
    let (_dir, cache) = cache();
    let source = mock_source(3);
    let none: [&str; 0] = [];

    assert_validation_error(&cache.get_data(&[1], &none, USERS_TABLE, &source));
    assert_validation_error(&cache.get_data(&[1], &["name"], "users", &source));
    assert_validation_error(&cache.get_data(&[1], &["name"], ".users", &source));
    assert_validation_error(&cache.get_data_from_values(
        &[Value::Int(1), Value::Float(2.5)],
        &["name"],
        USERS_TABLE,
        &source,
    ));
    assert!(cache.get_data(&[], &none, "", &source).unwrap().is_empty());
}

// ============================================================================
// BATCHING
// ============================================================================

#[test]
fn test_large_request_is_batched() {
    let (_dir, cache) = cache();
    let source = RecordingFetcher::new(mock_source(15_000));
    let ids: Vec<i64> = (1..=15_000).collect();

    let frame = cache.get_data(&ids, &["name"], USERS_TABLE, &source).unwrap();

    assert_eq!(frame.len(), 15_000);
    assert_eq!(source.call_count(), 100);
    assert!(source.calls().iter().all(|c| c.ids.len() == 150));
    assert_eq!(source.requested_ids(), ids);
}

// ============================================================================
// JSON PROJECTION
// ============================================================================

#[test]
fn test_nested_json_projection() {
    let (_dir, cache) = cache();
    let source = MockSource::new().with_rows(
        "s.t",
        [
            Row::with_id(1)
                .with("name", "Alice")
                .with("profile", r#"{"address":{"city":"NYC"}}"#),
            Row::with_id(2).with("name", "Bob").with("profile", Value::Null),
        ],
    );

    let frame = cache
        .get_data(&[1, 2], &["name", "profile.address.city"], "s.t", &source)
        .unwrap();

    assert_eq!(frame.columns(), &["id", "name", "profile.address.city"]);
    assert_eq!(
        frame.column("profile.address.city"),
        vec![&Value::from("NYC"), &Value::Null]
    );
}

#[test]
fn test_unreadable_json_degrades_to_null() {
    let (_dir, cache) = cache();
    let source = MockSource::new().with_rows(
        "s.t",
        [
            Row::with_id(1).with("meta", "{not json"),
            Row::with_id(2).with("meta", r#"{"a": 5}"#),
            Row::with_id(3).with("meta", r#"{"a": {"b": 1}}"#),
        ],
    );

    let frame = cache
        .get_data(&[1, 2, 3], &["meta.a.b", "meta.a"], "s.t", &source)
        .unwrap();

    assert_eq!(
        frame.column("meta.a.b"),
        vec![&Value::Null, &Value::Null, &Value::Int(1)]
    );
    assert_eq!(frame.get(2).unwrap().get("meta.a"), Some(&Value::Int(5)));
    assert_eq!(
        frame.get(3).unwrap().get("meta.a"),
        Some(&Value::Json(json!({"b": 1})))
    );
}

#[test]
fn test_structured_cells_round_trip_through_cache() {
    let (_dir, cache) = cache();
    let source = mock_source(4);
    let columns = ["items", "items.count", "total", "shipped"];

    let first = cache
        .get_data(&[1, 2, 3], &columns, fixtures::ORDERS_TABLE, &source)
        .unwrap();
    let warm = cache
        .get_data(&[1, 2, 3], &columns, fixtures::ORDERS_TABLE, &FailingFetcher::default())
        .unwrap();

    assert_eq!(first, warm);
    let row = warm.get(3).unwrap();
    assert_eq!(row.get("items.count"), Some(&Value::Int(4)));
    assert_eq!(row.get("shipped"), Some(&Value::Bool(true)));
}

// ============================================================================
// CACHE FILE RECOVERY
// ============================================================================

#[test]
fn test_corrupt_cache_file_is_refetched() {
    let (_dir, cache) = cache();
    let table = TableName::parse(USERS_TABLE).unwrap();
    cache.store().ensure_root().unwrap();
    std::fs::write(cache.store().table_path(&table), b"corrupted").unwrap();

    let source = RecordingFetcher::new(mock_source(3));
    let frame = cache.get_data(&[1, 2], &["name"], USERS_TABLE, &source).unwrap();

    assert_frame_ids(&frame, &[1, 2]);
    assert_eq!(source.call_count(), 1);
    assert_eq!(cache.store().stats().corrupt_reads, 1);
}

#[test]
fn test_fetcher_errors_are_not_typed_lookup_errors() {
    let (_dir, cache) = cache();
    let fetcher = |_ids: &[i64], _t: &TableName| -> Result<Vec<Row>, BoxError> {
        Err("timeout".into())
    };

    let err = cache.get_data(&[1], &["name"], "s.t", &fetcher).unwrap_err();
    assert!(matches!(err, IdCacheError::FetchStage { .. }));
}
