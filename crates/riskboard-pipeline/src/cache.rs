//! Query result cache
//!
//! Memoizes [`QueryRunner`] output keyed by the exact [`Query`], so repeated
//! render cycles within the TTL do not re-issue identical warehouse queries.
//! Empty results (including failures) are cached like any other and retried
//! once they expire.
//!
//! Uses DashMap for lock-per-shard concurrent access. Two lookups racing on the
//! same expired key may both fetch; the last insert wins, which is harmless
//! because entries are immutable snapshots.

use dashmap::DashMap;
use riskboard_core::{Query, Table};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::adapter::QueryRunner;

/// Time-to-live for cached results
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Expired entries are swept every N lookups
const SWEEP_INTERVAL: usize = 64;

#[derive(Debug)]
struct CacheEntry {
    table: Arc<Table>,
    fetched_at: Instant,
}

/// Process-wide result cache, constructed once and injected where needed
pub struct ResultCache {
    runner: QueryRunner,
    entries: DashMap<Query, CacheEntry>,
    ttl: Duration,
    ops_since_sweep: AtomicUsize,
}

impl ResultCache {
    /// Create a cache with the default TTL (60 seconds)
    pub fn new(runner: QueryRunner) -> Self {
        Self::with_ttl(runner, DEFAULT_TTL)
    }

    pub fn with_ttl(runner: QueryRunner, ttl: Duration) -> Self {
        Self {
            runner,
            entries: DashMap::new(),
            ttl,
            ops_since_sweep: AtomicUsize::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn runner(&self) -> &QueryRunner {
        &self.runner
    }

    /// Return the cached result for `query`, fetching it if absent or expired
    ///
    /// A hit returns the very same `Arc` that was stored, without touching the
    /// data source.
    pub async fn get_or_fetch(&self, query: &Query) -> Arc<Table> {
        self.maybe_sweep();

        if let Some(table) = self.lookup(query) {
            debug!(query = %query, "Result cache hit");
            return table;
        }

        debug!(query = %query, "Result cache miss");
        let table = Arc::new(self.runner.run(query).await);
        self.entries.insert(
            query.clone(),
            CacheEntry {
                table: table.clone(),
                fetched_at: Instant::now(),
            },
        );
        table
    }

    /// Drop the entry for `query`, if any
    pub fn invalidate(&self, query: &Query) -> bool {
        self.entries.remove(query).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries
    ///
    /// Note: This includes expired entries until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, query: &Query) -> Option<Arc<Table>> {
        self.entries.get(query).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.ttl {
                Some(entry.table.clone())
            } else {
                None
            }
        })
    }

    fn maybe_sweep(&self) {
        let ops = self.ops_since_sweep.fetch_add(1, Ordering::Relaxed);
        if ops >= SWEEP_INTERVAL {
            self.ops_since_sweep.store(0, Ordering::Relaxed);
            self.sweep_expired();
        }
    }

    fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.fetched_at.elapsed() < ttl);
    }
}
