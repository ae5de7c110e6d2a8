//! TTL cache for prayer times.
//!
//! One `RwLock` guards the whole key → entry table, so lookups run in
//! parallel and inserts/removals are exclusive. Expired entries are never
//! returned; they are dropped on read or by the background reaper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{Error, PrayerTimes};
use serde::{Serialize, Serializer};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default interval between reaper sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Cache key: one masjid, one calendar day.
///
/// The year is part of the key so a long-running process never serves
/// instants composed for a previous year.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub masjid_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CacheKey {
    pub fn new(masjid_id: impl Into<String>, year: i32, month: u32, day: u32) -> Result<Self, Error> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(Error::InvalidDate { month, day });
        }
        Ok(Self {
            masjid_id: masjid_id.into(),
            year,
            month,
            day,
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: PrayerTimes,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug)]
struct Table {
    entries: HashMap<CacheKey, CacheEntry>,
    last_cleanup: DateTime<Utc>,
}

/// Point-in-time view of the cache for observability.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub cache_size: usize,
    pub last_cleanup: DateTime<Utc>,
    /// Serialized as whole seconds.
    #[serde(serialize_with = "as_secs")]
    pub cleanup_interval: Duration,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Process-wide prayer-times cache. Share it behind an `Arc`.
#[derive(Debug)]
pub struct TtlCache {
    table: Arc<RwLock<Table>>,
    cleanup_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl TtlCache {
    /// Create an empty cache. The reaper is not running until
    /// [`TtlCache::start_reaper`] is called.
    pub fn new(cleanup_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            table: Arc::new(RwLock::new(Table {
                entries: HashMap::new(),
                last_cleanup: Utc::now(),
            })),
            cleanup_interval,
            shutdown_tx,
            reaper: Mutex::new(None),
        }
    }

    /// Return the record for `key` if present and not yet expired.
    pub async fn get(&self, key: &CacheKey) -> Option<PrayerTimes> {
        {
            let table = self.table.read().await;
            match table.entries.get(key) {
                None => return None,
                Some(entry) if entry.is_live(Instant::now()) => return Some(entry.record.clone()),
                Some(_) => {}
            }
        }

        // Expired: escalate and re-check, another writer may have replaced it.
        let mut table = self.table.write().await;
        let now = Instant::now();
        match table.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.record.clone()),
            Some(_) => {
                table.entries.remove(key);
                debug!(
                    "Dropped expired entry for {} {}-{:02}-{:02}",
                    key.masjid_id, key.year, key.month, key.day
                );
                None
            }
            None => None,
        }
    }

    /// Insert or replace `key`, expiring `ttl` from now.
    pub async fn set(&self, key: CacheKey, record: PrayerTimes, ttl: Duration) {
        let entry = CacheEntry {
            record,
            expires_at: Instant::now() + ttl,
        };
        self.table.write().await.entries.insert(key, entry);
    }

    /// Remove every entry whose expiry is at or before now.
    /// Returns how many entries were dropped.
    pub async fn purge_expired(&self) -> usize {
        sweep(&self.table).await
    }

    pub async fn stats(&self) -> CacheStats {
        let table = self.table.read().await;
        CacheStats {
            cache_size: table.entries.len(),
            last_cleanup: table.last_cleanup,
            cleanup_interval: self.cleanup_interval,
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Spawn the background reaper on the current Tokio runtime.
    ///
    /// Returns `false` if it is already running, the cache was shut down,
    /// the interval is zero, or there is no runtime to spawn on.
    pub fn start_reaper(&self) -> bool {
        if *self.shutdown_tx.borrow() || self.cleanup_interval.is_zero() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cache reaper not started: no Tokio runtime");
            return false;
        };
        let mut slot = self.reaper.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let table = Arc::clone(&self.table);
        let interval = self.cleanup_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *slot = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = sweep(&table).await;
                        debug!("Cache sweep removed {} expired entries", removed);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Cache reaper stopped");
        }));

        info!("Cache reaper started (interval={}s)", interval.as_secs());
        true
    }

    pub fn is_reaper_running(&self) -> bool {
        self.reaper
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the reaper and wait for it to exit. Entries stay readable.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.reaper.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Cache reaper ended abnormally: {}", e);
            }
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_INTERVAL)
    }
}

impl Drop for TtlCache {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

async fn sweep(table: &RwLock<Table>) -> usize {
    let started = Utc::now();
    let mut table = table.write().await;
    let now = Instant::now();
    let before = table.entries.len();
    table.entries.retain(|_, entry| entry.is_live(now));
    table.last_cleanup = started;
    before - table.entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HOUR: Duration = Duration::from_secs(3600);

    fn record(tag: &str) -> PrayerTimes {
        let t = Utc.with_ymd_and_hms(2025, 3, 15, 4, 30, 0).unwrap();
        PrayerTimes::from_ordered([t; 6], tag)
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id, 2025, 3, 15).unwrap()
    }

    #[test]
    fn test_key_rejects_out_of_range() {
        assert!(matches!(
            CacheKey::new("m1", 2025, 13, 1),
            Err(Error::InvalidDate { month: 13, day: 1 })
        ));
        assert!(CacheKey::new("m1", 2025, 2, 0).is_err());
        assert!(CacheKey::new("m1", 2025, 2, 31).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_key_misses() {
        let cache = TtlCache::default();
        assert!(cache.get(&key("never")).await.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = TtlCache::default();
        cache.set(key("m1"), record("Europe/Paris"), HOUR).await;
        assert_eq!(cache.get(&key("m1")).await, Some(record("Europe/Paris")));
        assert!(cache.get(&key("m2")).await.is_none());
    }

    #[tokio::test]
    async fn test_year_is_part_of_key() {
        let cache = TtlCache::default();
        cache.set(key("m1"), record("a"), HOUR).await;
        let next_year = CacheKey::new("m1", 2026, 3, 15).unwrap();
        assert!(cache.get(&next_year).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_never_returned() {
        let cache = TtlCache::default();
        cache.set(key("m1"), record("a"), HOUR).await;

        tokio::time::advance(HOUR - Duration::from_secs(1)).await;
        assert!(cache.get(&key("m1")).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("m1")).await.is_none());
        // Lazily removed on that read.
        assert_eq!(cache.stats().await.cache_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_resets_expiry() {
        let cache = TtlCache::default();
        cache.set(key("m1"), record("old"), HOUR).await;
        tokio::time::advance(HOUR / 2).await;
        cache.set(key("m1"), record("new"), HOUR).await;
        tokio::time::advance(HOUR * 3 / 4).await;
        assert_eq!(cache.get(&key("m1")).await, Some(record("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_counts() {
        let cache = TtlCache::default();
        cache.set(key("short"), record("a"), Duration::from_secs(60)).await;
        cache.set(key("long"), record("b"), HOUR).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.stats().await.cache_size, 1);
        assert!(cache.get(&key("long")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_on_interval() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let created = cache.stats().await.last_cleanup;
        cache.set(key("m1"), record("a"), Duration::from_secs(60)).await;

        assert!(cache.start_reaper());
        assert!(!cache.start_reaper(), "second start is a no-op");

        // Expired but not yet swept: still counted.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(cache.stats().await.cache_size, 1);

        tokio::time::sleep(Duration::from_secs(200)).await;
        let stats = cache.stats().await;
        assert_eq!(stats.cache_size, 0);
        assert!(stats.last_cleanup >= created);
        assert_eq!(stats.cleanup_interval, Duration::from_secs(300));

        cache.shutdown().await;
    }

    #[test]
    fn test_start_reaper_outside_runtime() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert!(!cache.start_reaper());
        assert!(!cache.is_reaper_running());
    }

    #[tokio::test]
    async fn test_start_reaper_zero_interval() {
        let cache = TtlCache::new(Duration::ZERO);
        assert!(!cache.start_reaper());
    }

    #[tokio::test]
    async fn test_shutdown_stops_reaper() {
        let cache = TtlCache::new(Duration::from_secs(300));
        assert!(cache.start_reaper());
        assert!(cache.is_reaper_running());

        cache.shutdown().await;
        assert!(!cache.is_reaper_running());
        assert!(!cache.start_reaper(), "cannot restart after shutdown");

        cache.set(key("m1"), record("a"), HOUR).await;
        assert!(cache.get(&key("m1")).await.is_some());
    }

    #[tokio::test]
    async fn test_stats_serialize_contract() {
        let cache = TtlCache::default();
        cache.set(key("m1"), record("a"), HOUR).await;
        let json = serde_json::to_value(cache.stats().await).unwrap();
        assert_eq!(json["cache_size"], 1);
        assert_eq!(json["cleanup_interval"], 300);
        assert!(json["last_cleanup"].is_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_partial_writes() {
        let cache = Arc::new(TtlCache::default());
        cache.set(key("m1"), record("A"), HOUR).await;

        let writer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..500 {
                    let tag = if i % 2 == 0 { "B" } else { "A" };
                    cache.set(key("m1"), record(tag), HOUR).await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let seen = cache.get(&key("m1")).await.expect("entry stays live");
                        assert!(seen == record("A") || seen == record("B"));
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
    }
}
