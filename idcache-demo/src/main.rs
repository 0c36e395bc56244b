//! idcache demo entry point.
//!
//! Builds a deterministic in-memory database and walks the read path:
//! cold fetch, warm re-read, JSON projection, a batched bulk request, and
//! the two typed lookup failures.
//!
//! Pass `--temp` to use a throwaway cache root instead of the configured one.

use std::collections::{BTreeMap, HashMap};

use idcache_core::{
    BoxError, CacheSettings, ConfigError, Frame, IdCacheError, Row, RowFetcher, TableName, Value,
};
use idcache_storage::ReadThroughCache;
use serde_json::json;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USERS: &str = "public.users";
const ORDERS: &str = "public.orders";
const USER_COUNT: i64 = 1000;
const ORDER_COUNT: i64 = 500;

#[derive(Debug, Error)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] IdCacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to init subscriber: {0}")]
    Subscriber(String),
}

// ============================================================================
// MOCK DATABASE
// ============================================================================

/// Stand-in for a real database: two tables of generated rows.
struct MockDatabase {
    tables: HashMap<&'static str, BTreeMap<i64, Row>>,
}

impl MockDatabase {
    fn generate() -> Self {
        const CITIES: [&str; 8] = [
            "NYC", "LA", "Chicago", "Boston", "Seattle", "Austin", "Denver", "Miami",
        ];
        const STATES: [&str; 8] = ["NY", "CA", "IL", "MA", "WA", "TX", "CO", "FL"];
        const STATUSES: [&str; 3] = ["pending", "completed", "cancelled"];

        let users: BTreeMap<i64, Row> = (1..=USER_COUNT)
            .map(|id| {
                let slot = (id * 7 % 8) as usize;
                let profile = json!({
                    "address": {
                        "city": CITIES[slot],
                        "state": STATES[slot],
                        "zip": format!("{:05}", 10_000 + id * 37 % 90_000),
                    },
                    "preferences": {
                        "theme": if id % 3 == 0 { "dark" } else { "light" },
                        "notifications": id % 2 == 0,
                    },
                    "stats": {"login_count": id * 13 % 1000 + 1},
                });
                let row = Row::with_id(id)
                    .with("name", format!("User{}", id))
                    .with("email", format!("user{}@example.com", id))
                    .with("age", 18 + id * 11 % 63)
                    .with("profile", profile.to_string());
                (id, row)
            })
            .collect();

        let orders: BTreeMap<i64, Row> = (1..=ORDER_COUNT)
            .map(|id| {
                let metadata = json!({
                    "payment": {
                        "method": if id % 2 == 0 { "paypal" } else { "credit_card" },
                        "currency": "USD",
                    },
                    "shipping": {"tracking": format!("TRK{}", 100_000 + id * 7919 % 900_000)},
                });
                let row = Row::with_id(id)
                    .with("user_id", 1 + id * 17 % USER_COUNT)
                    .with("amount", 10.0 + (id * 53 % 49_000) as f64 / 100.0)
                    .with("status", STATUSES[(id % 3) as usize])
                    .with("metadata", Value::Json(metadata));
                (id, row)
            })
            .collect();

        Self {
            tables: HashMap::from([(USERS, users), (ORDERS, orders)]),
        }
    }
}

impl RowFetcher for MockDatabase {
    fn fetch(&self, ids: &[i64], table: &TableName) -> Result<Vec<Row>, BoxError> {
        let rows = self
            .tables
            .get(table.as_str())
            .ok_or_else(|| format!("Table {} not found", table))?;
        let found: Vec<Row> = ids.iter().filter_map(|id| rows.get(id).cloned()).collect();
        tracing::info!(table = %table, requested = ids.len(), found = found.len(), "Database query");
        Ok(found)
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

fn print_frame(title: &str, frame: &Frame, limit: usize) {
    println!("\n== {} ({} rows) ==", title, frame.len());
    println!("{}", frame.columns().join(" | "));
    for index in 0..frame.len().min(limit) {
        if let Some(values) = frame.row_values(index) {
            let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            println!("{}", cells.join(" | "));
        }
    }
    if frame.len() > limit {
        println!("... {} more", frame.len() - limit);
    }
}

fn run(cache: &ReadThroughCache, db: &MockDatabase) -> Result<(), DemoError> {
    let frame = cache.get_data(&[1, 2, 3, 4, 5], &["name", "email", "age"], USERS, db)?;
    print_frame("Cold fetch", &frame, 5);

    let frame = cache.get_data(&[1, 2, 3, 4, 5], &["name", "email", "age"], USERS, db)?;
    print_frame("Warm re-read", &frame, 5);

    let frame = cache.get_data(
        &[1, 2, 3, 4, 5],
        &[
            "name",
            "profile.address.city",
            "profile.address.state",
            "profile.preferences.theme",
            "profile.stats.login_count",
        ],
        USERS,
        db,
    )?;
    print_frame("JSON projection", &frame, 5);

    let frame = cache.get_data(
        &[10, 20, 30],
        &["amount", "status", "metadata.payment.method", "metadata.shipping.tracking"],
        ORDERS,
        db,
    )?;
    print_frame("Orders with metadata", &frame, 3);

    let ids: Vec<i64> = (1..=USER_COUNT).collect();
    let frame = cache.get_data(&ids, &["name", "age", "profile.address.city"], USERS, db)?;
    print_frame("Bulk request", &frame, 3);

    match cache.get_data(&[1, 2, 9999], &["name"], USERS, db) {
        Err(err @ IdCacheError::DataNotFound { .. }) => println!("\nExpected failure: {}", err),
        other => tracing::warn!(result = ?other.map(|f| f.len()), "Unknown id was not rejected"),
    }

    match cache.get_data(&[1, 2], &["name", "nonexistent_column"], USERS, db) {
        Err(err @ IdCacheError::ColumnNotFound { .. }) => println!("Expected failure: {}", err),
        other => tracing::warn!(result = ?other.map(|f| f.len()), "Unknown column was not rejected"),
    }

    let stats = cache.store().stats();
    println!(
        "\nCache stats: {} hits, {} misses, {} rows written, hit rate {:.1}%",
        stats.hits,
        stats.misses,
        stats.rows_written,
        stats.hit_rate() * 100.0
    );
    Ok(())
}

fn main() -> Result<(), DemoError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| DemoError::Subscriber(e.to_string()))?;

    let use_temp = std::env::args().skip(1).any(|arg| arg == "--temp");
    let temp_dir = if use_temp { Some(tempfile::tempdir()?) } else { None };
    let settings = match &temp_dir {
        Some(dir) => CacheSettings::with_root(dir.path().join("cached_data")),
        None => CacheSettings::load()?,
    };
    tracing::info!(cache_root = %settings.cache_root.display(), "Starting idcache demo");

    let cache = ReadThroughCache::with_settings(&settings);
    let db = MockDatabase::generate();
    run(&cache, &db)
}
