//! Cache-fronted prayer-times lookup.
//!
//! Every read goes cache first; a miss calls the upstream fetcher and
//! stores the result for the configured TTL. Failures are returned as-is
//! and never cached, so the next call simply tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use common::config::AppConfig;
use common::{Error, MosqueInfo, MosqueValidation, NightTimes, Prayer, PrayerTimes};
use dashmap::DashMap;
use directory::{MosqueStore, SettingsStore, DEFAULT_MASJID_KEY};
use mawaqit_client::PrayerTimesFetcher;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStats, TtlCache};

/// Lifetime of a cached day when nothing else is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Source of "today" for lookups that don't name a date.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

type Gate = Arc<Mutex<()>>;

pub struct PrayerTimesService {
    cache: Arc<TtlCache>,
    fetcher: Arc<dyn PrayerTimesFetcher>,
    mosques: Arc<dyn MosqueStore>,
    settings: Arc<dyn SettingsStore>,
    ttl: Duration,
    single_flight: bool,
    inflight: DashMap<CacheKey, Gate>,
    default_masjid: String,
    clock: Clock,
}

impl PrayerTimesService {
    pub fn new(
        cache: Arc<TtlCache>,
        fetcher: Arc<dyn PrayerTimesFetcher>,
        mosques: Arc<dyn MosqueStore>,
        settings: Arc<dyn SettingsStore>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            mosques,
            settings,
            ttl: cfg.cache.ttl(),
            single_flight: cfg.cache.single_flight,
            inflight: DashMap::new(),
            default_masjid: cfg.default_masjid.clone(),
            clock: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replace the source of "today" (server local date by default).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    fn today_date(&self) -> NaiveDate {
        (self.clock)()
    }

    // ── Lookups ───────────────────────────────────────────────────────

    /// Prayer times for `month`/`day` of the current year.
    pub async fn lookup(&self, masjid_id: &str, month: u32, day: u32) -> Result<PrayerTimes, Error> {
        let year = self.today_date().year();
        self.lookup_in_year(masjid_id, year, month, day).await
    }

    pub async fn today(&self, masjid_id: &str) -> Result<PrayerTimes, Error> {
        let date = self.today_date();
        self.lookup_in_year(masjid_id, date.year(), date.month(), date.day())
            .await
    }

    /// `day` of the current month.
    pub async fn by_day(&self, masjid_id: &str, day: u32) -> Result<PrayerTimes, Error> {
        let date = self.today_date();
        self.lookup_in_year(masjid_id, date.year(), date.month(), day)
            .await
    }

    pub async fn by_day_month(
        &self,
        masjid_id: &str,
        day: u32,
        month: u32,
    ) -> Result<PrayerTimes, Error> {
        self.lookup(masjid_id, month, day).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn lookup_in_year(
        &self,
        masjid_id: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<PrayerTimes, Error> {
        let key = CacheKey::new(masjid_id, year, month, day)?;

        if let Some(hit) = self.cache.get(&key).await {
            debug!("Cache hit for {} {}-{:02}-{:02}", masjid_id, year, month, day);
            return Ok(hit);
        }

        if !self.single_flight {
            return self.fetch_and_store(&key).await;
        }

        // One fetch per key at a time; later callers wait, then re-check.
        let slot = FlightSlot::join(&self.inflight, &key);
        let _turn = slot.gate.lock().await;
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Cache filled while waiting for {} {}-{:02}-{:02}", masjid_id, year, month, day);
            return Ok(hit);
        }
        self.fetch_and_store(&key).await
    }

    async fn fetch_and_store(&self, key: &CacheKey) -> Result<PrayerTimes, Error> {
        debug!(
            "Cache miss for {} {}-{:02}-{:02}, fetching upstream",
            key.masjid_id, key.year, key.month, key.day
        );
        let record = self
            .fetcher
            .fetch(&key.masjid_id, key.year, key.month, key.day)
            .await?;
        self.cache.set(key.clone(), record.clone(), self.ttl).await;
        Ok(record)
    }

    // ── Derived views ─────────────────────────────────────────────────

    /// Midnight and last third of the night starting at `month`/`day`'s
    /// maghreb.
    pub async fn night_times(&self, masjid_id: &str, month: u32, day: u32) -> Result<NightTimes, Error> {
        let year = self.today_date().year();
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or(Error::InvalidDate { month, day })?;
        let next = date.succ_opt().ok_or(Error::InvalidDate { month, day })?;

        let evening = self.lookup_in_year(masjid_id, year, month, day).await?;
        let morning = self
            .lookup_in_year(masjid_id, next.year(), next.month(), next.day())
            .await?;

        Ok(NightTimes::between(evening.maghreb, morning.fajr))
    }

    /// The next prayer after `now`: later today, or tomorrow's fajr.
    pub async fn next_prayer(
        &self,
        masjid_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Prayer, DateTime<Utc>), Error> {
        let today = self.today_date();
        let times = self
            .lookup_in_year(masjid_id, today.year(), today.month(), today.day())
            .await?;
        if let Some(next) = times.next_prayer(now) {
            return Ok(next);
        }

        let tomorrow = today.succ_opt().ok_or(Error::InvalidDate {
            month: today.month(),
            day: today.day(),
        })?;
        let times = self
            .lookup_in_year(masjid_id, tomorrow.year(), tomorrow.month(), tomorrow.day())
            .await?;
        Ok((Prayer::Fajr, times.fajr))
    }

    // ── Mosques ───────────────────────────────────────────────────────

    /// Probe upstream (bypassing the cache) with today's date.
    pub async fn validate(&self, masjid_id: &str) -> MosqueValidation {
        let today = self.today_date();
        match self
            .fetcher
            .fetch(masjid_id, today.year(), today.month(), today.day())
            .await
        {
            Ok(_) => MosqueValidation {
                valid: true,
                error: String::new(),
            },
            Err(e) => {
                info!("Mosque {} failed validation: {}", masjid_id, e);
                MosqueValidation {
                    valid: false,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Directory entry if known, otherwise a placeholder carrying the
    /// upstream timezone.
    pub async fn mosque_info(&self, masjid_id: &str) -> Result<MosqueInfo, Error> {
        if let Some(mosque) = self.mosques.get(masjid_id).await? {
            return Ok(MosqueInfo::from(&mosque));
        }

        let times = self.today(masjid_id).await.map_err(|e| {
            debug!("No upstream data for {}: {}", masjid_id, e);
            Error::NotFound(masjid_id.to_string())
        })?;

        Ok(MosqueInfo {
            id: masjid_id.to_string(),
            name: format!("Masjid {masjid_id}"),
            country: "Unknown".into(),
            city: "Unknown".into(),
            timezone: times.timezone,
        })
    }

    pub async fn mosques(&self) -> Result<Vec<MosqueInfo>, Error> {
        Ok(self.mosques.all().await?.iter().map(MosqueInfo::from).collect())
    }

    /// Stored default masjid, falling back to the configured one.
    pub async fn default_masjid(&self) -> Result<String, Error> {
        if let Some(setting) = self.settings.get_setting(DEFAULT_MASJID_KEY).await? {
            if !setting.value.is_empty() {
                return Ok(setting.value);
            }
        }
        if self.default_masjid.is_empty() {
            return Err(Error::Store(format!("setting {DEFAULT_MASJID_KEY} not found")));
        }
        Ok(self.default_masjid.clone())
    }

    pub async fn set_default_masjid(&self, masjid_id: &str) -> Result<(), Error> {
        let masjid_id = masjid_id.trim();
        if masjid_id.is_empty() {
            return Err(Error::Store("default masjid id must not be empty".into()));
        }
        self.settings.set_setting(DEFAULT_MASJID_KEY, masjid_id).await?;
        info!("Default masjid set to {}", masjid_id);
        Ok(())
    }
}

/// Membership in the per-key in-flight table; the table entry is removed
/// once the last member leaves.
struct FlightSlot<'a> {
    table: &'a DashMap<CacheKey, Gate>,
    key: &'a CacheKey,
    gate: Gate,
}

impl<'a> FlightSlot<'a> {
    fn join(table: &'a DashMap<CacheKey, Gate>, key: &'a CacheKey) -> Self {
        let gate = Arc::clone(table.entry(key.clone()).or_default().value());
        Self { table, key, gate }
    }
}

impl Drop for FlightSlot<'_> {
    fn drop(&mut self) {
        // Our own clone plus the table's.
        self.table
            .remove_if(self.key, |_, gate| Arc::strong_count(gate) <= 2);
    }
}
