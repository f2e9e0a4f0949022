//! Connection cache for sqlgate
//!
//! Keeps at most one live connection per descriptor:
//! - Liveness probe on reuse, outside the map lock
//! - Eviction of connections that fail the probe
//! - Generation ids so a racing caller never evicts a fresh replacement
//! - Close of every connection that leaves the cache or loses an insert
//!   race, once its last holder lets go of it
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlgate::prelude::*;
//! use sqlgate::postgres::PgConnectionFactory;
//!
//! let cache = ConnectionCache::new(Arc::new(PgConnectionFactory));
//!
//! let acquired = cache.acquire("host=localhost user=postgres").await?;
//! acquired.connection().ping().await?;
//! cache.release(acquired).await;
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionFactory, DatabaseType};
use crate::error::Result;
use crate::security::redact_descriptor;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Connections opened by the factory
    pub connections_created: u64,
    /// Connections closed (evicted, race losers, shutdown)
    pub connections_closed: u64,
    /// Acquisitions served from the cache
    pub hits: u64,
    /// Liveness probes that failed
    pub probe_failures: u64,
    /// Entries removed from the cache
    pub evictions: u64,
    /// Fresh connections that lost the insert race
    pub discarded: u64,
    /// Failed attempts to open a connection
    pub connect_failures: u64,
}

impl CacheStats {
    /// Connections currently open according to the counters
    pub fn open_connections(&self) -> u64 {
        self.connections_created
            .saturating_sub(self.connections_closed)
    }
}

/// Atomic cache stats for concurrent updates
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicCacheStats {
    pub connections_created: AtomicU64,
    pub connections_closed: AtomicU64,
    pub hits: AtomicU64,
    pub probe_failures: AtomicU64,
    pub evictions: AtomicU64,
    pub discarded: AtomicU64,
    pub connect_failures: AtomicU64,
}

impl AtomicCacheStats {
    /// Create new atomic stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection creation
    pub fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection close
    pub fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed liveness probe
    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection that lost the insert race
    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed connect attempt
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current stats
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
        }
    }
}

/// Connection shared by the cache and its current users.
///
/// Closed exactly once: by whoever holds the last reference when it is
/// released, or on a spawned task when the last reference is dropped
/// without a release (a cancelled call, for one).
struct TrackedConnection {
    conn: Arc<dyn Connection>,
    stats: Arc<AtomicCacheStats>,
    closed: bool,
}

impl TrackedConnection {
    fn new(conn: Arc<dyn Connection>, stats: Arc<AtomicCacheStats>) -> Self {
        Self {
            conn,
            stats,
            closed: false,
        }
    }

    /// Close and wait for it. The close runs on its own task so it still
    /// finishes if the waiting caller is cancelled.
    async fn close(mut self) {
        self.closed = true;
        if let Some(task) = self.spawn_close() {
            if let Err(e) = task.await {
                warn!(error = %e, "connection close task failed");
            }
        }
    }

    fn spawn_close(&self) -> Option<tokio::task::JoinHandle<()>> {
        let conn = Arc::clone(&self.conn);
        let stats = Arc::clone(&self.stats);
        match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    warn!(error = %e, "failed to close connection");
                }
                stats.record_closed();
            })),
            Err(_) => {
                warn!("no runtime to close connection on; dropping it");
                stats.record_closed();
                None
            }
        }
    }
}

impl Drop for TrackedConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.spawn_close();
        }
    }
}

/// Close `handle` now if nobody else holds it. Otherwise the last holder
/// closes it.
async fn close_if_last(handle: Arc<TrackedConnection>) -> bool {
    match Arc::try_unwrap(handle) {
        Ok(tracked) => {
            tracked.close().await;
            true
        }
        Err(_) => false,
    }
}

/// Cached connection plus the generation it was inserted with
#[derive(Clone)]
struct CacheEntry {
    id: u64,
    handle: Arc<TrackedConnection>,
}

/// A connection handed out by [`ConnectionCache::acquire`].
///
/// Return it with [`ConnectionCache::release`]. A connection the cache no
/// longer retains is closed there. Dropping it without a release still
/// closes such a connection, on a background task.
pub struct Acquired {
    handle: Arc<TrackedConnection>,
    fresh: bool,
    cached: bool,
}

impl Acquired {
    /// The connection to run queries on
    pub fn connection(&self) -> &dyn Connection {
        self.handle.conn.as_ref()
    }

    /// Whether the connection was opened by this acquisition
    #[inline]
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Whether the connection is retained by the cache
    #[inline]
    pub fn is_cached(&self) -> bool {
        self.cached
    }
}

impl std::fmt::Debug for Acquired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquired")
            .field("fresh", &self.fresh)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

/// Process-local cache holding one reusable connection per descriptor.
///
/// The map lock is held only to read, insert or remove entries. Probing,
/// opening and closing connections happen outside it, so a slow backend
/// never blocks callers using other descriptors.
pub struct ConnectionCache {
    factory: Arc<dyn ConnectionFactory>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    next_id: AtomicU64,
    probe_on_reuse: bool,
    stats: Arc<AtomicCacheStats>,
}

impl ConnectionCache {
    /// Create an empty cache backed by `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            probe_on_reuse: true,
            stats: Arc::new(AtomicCacheStats::new()),
        }
    }

    /// Enable/disable the liveness probe on reuse
    pub fn with_probe_on_reuse(mut self, probe: bool) -> Self {
        self.probe_on_reuse = probe;
        self
    }

    /// Database type of the underlying factory
    pub fn database_type(&self) -> DatabaseType {
        self.factory.database_type()
    }

    /// Get a live connection for `descriptor`, reusing the cached one when it
    /// passes the liveness probe.
    ///
    /// A cached connection that fails the probe is evicted and a new one is
    /// opened. The evicted connection is closed once no other caller is still
    /// using it. Opening is attempted once; a failure is returned without
    /// touching the cache.
    pub async fn acquire(&self, descriptor: &str) -> Result<Acquired> {
        let existing = self.entries.read().await.get(descriptor).cloned();

        if let Some(entry) = existing {
            if !self.probe_on_reuse {
                self.stats.record_hit();
                return Ok(Acquired {
                    handle: entry.handle,
                    fresh: false,
                    cached: true,
                });
            }

            let probe = entry.handle.conn.ping().await;
            match probe {
                Ok(()) => {
                    self.stats.record_hit();
                    debug!(
                        descriptor = %redact_descriptor(descriptor),
                        "reusing cached connection"
                    );
                    return Ok(Acquired {
                        handle: entry.handle,
                        fresh: false,
                        cached: true,
                    });
                }
                Err(e) => {
                    self.stats.record_probe_failure();
                    warn!(
                        descriptor = %redact_descriptor(descriptor),
                        error = %e,
                        "cached connection failed liveness probe"
                    );
                    self.evict_generation(descriptor, entry).await;
                }
            }
        }

        self.open(descriptor).await
    }

    /// Return an acquired connection. A connection the cache does not retain
    /// is closed here unless another caller still holds it.
    pub async fn release(&self, acquired: Acquired) {
        close_if_last(acquired.handle).await;
    }

    /// Remove the cached connection for `descriptor`, if any. It is closed
    /// now, or by its last user if a query is still running on it.
    pub async fn evict(&self, descriptor: &str) -> bool {
        let removed = self.entries.write().await.remove(descriptor);
        match removed {
            Some(entry) => {
                self.stats.record_eviction();
                close_if_last(entry.handle).await;
                true
            }
            None => false,
        }
    }

    /// Empty the cache, closing every connection not currently in use.
    /// Connections in use are closed when released.
    pub async fn close_all(&self) {
        let drained: Vec<CacheEntry> = {
            let mut entries = self.entries.write().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            self.stats.record_eviction();
            close_if_last(entry.handle).await;
        }

        if count > 0 {
            info!(closed = count, "closed all cached connections");
        }
    }

    /// Number of cached descriptors
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache holds no connections
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Check if a connection is cached for `descriptor`
    pub async fn contains(&self, descriptor: &str) -> bool {
        self.entries.read().await.contains_key(descriptor)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Remove the entry only if it is still the generation of `stale`
    async fn evict_generation(&self, descriptor: &str, stale: CacheEntry) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            let same_generation = entries
                .get(descriptor)
                .is_some_and(|current| current.id == stale.id);
            if same_generation {
                entries.remove(descriptor)
            } else {
                None
            }
        };
        drop(stale);

        match removed {
            Some(entry) => {
                self.stats.record_eviction();
                let closed = close_if_last(entry.handle).await;
                debug!(
                    descriptor = %redact_descriptor(descriptor),
                    closed,
                    "evicted stale connection"
                );
                true
            }
            None => false,
        }
    }

    async fn open(&self, descriptor: &str) -> Result<Acquired> {
        let conn = match self.factory.connect(descriptor).await {
            Ok(conn) => conn,
            Err(e) => {
                self.stats.record_connect_failure();
                return Err(e);
            }
        };
        self.stats.record_created();
        let handle = Arc::new(TrackedConnection::new(conn, Arc::clone(&self.stats)));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cached = {
            let mut entries = self.entries.write().await;
            match entries.entry(descriptor.to_string()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(CacheEntry {
                        id,
                        handle: Arc::clone(&handle),
                    });
                    true
                }
            }
        };

        if cached {
            debug!(
                descriptor = %redact_descriptor(descriptor),
                database = %self.factory.database_type(),
                "opened and cached new connection"
            );
        } else {
            self.stats.record_discarded();
            debug!(
                descriptor = %redact_descriptor(descriptor),
                "another caller cached a connection first; using this one uncached"
            );
        }

        Ok(Acquired {
            handle,
            fresh: true,
            cached,
        })
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("database", &self.factory.database_type())
            .field("probe_on_reuse", &self.probe_on_reuse)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_cache_stats() {
        let stats = AtomicCacheStats::new();

        stats.record_created();
        stats.record_created();
        stats.record_closed();
        stats.record_hit();
        stats.record_probe_failure();
        stats.record_eviction();
        stats.record_discarded();
        stats.record_connect_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_created, 2);
        assert_eq!(snapshot.connections_closed, 1);
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.probe_failures, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.discarded, 1);
        assert_eq!(snapshot.connect_failures, 1);
        assert_eq!(snapshot.open_connections(), 1);
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.open_connections(), 0);
    }
}
