use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters for how queries were satisfied. Individual reads
/// are consistent per field; a snapshot is not a globally consistent
/// tuple.
#[derive(Debug, Default)]
pub struct StatsCollector {
    // Counters first; keep the atomic block contiguous.
    queries_by_database: AtomicU64,
    queries_by_cache: AtomicU64,
    queries_by_api: AtomicU64,
    queries_fail: AtomicU64,
}

/// Point-in-time view of the collector, plus the database's update lag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Queries satisfied by the local database alone.
    pub queries_by_database: u64,
    /// Queries satisfied by the verdict cache alone.
    pub queries_by_cache: u64,
    /// Queries that needed an API call.
    pub queries_by_api: u64,
    /// Queries that could not be satisfied.
    pub queries_fail: u64,
    /// Time since the last missed update; zero while the next update is
    /// still scheduled in the future.
    pub database_update_lag: Duration,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_database(&self) {
        self.queries_by_database.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache(&self) {
        self.queries_by_cache.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api(&self) {
        self.queries_by_api.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_fail(&self, n: u64) {
        self.queries_fail.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, database_update_lag: Duration) -> Stats {
        Stats {
            queries_by_database: self.queries_by_database.load(Ordering::Relaxed),
            queries_by_cache: self.queries_by_cache.load(Ordering::Relaxed),
            queries_by_api: self.queries_by_api.load(Ordering::Relaxed),
            queries_fail: self.queries_fail.load(Ordering::Relaxed),
            database_update_lag,
        }
    }
}
