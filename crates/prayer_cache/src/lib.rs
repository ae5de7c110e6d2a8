//! In-process prayer-times cache and the lookup service that fronts the
//! upstream fetcher with it.

pub mod cache;
pub mod service;

pub use cache::{CacheKey, CacheStats, TtlCache, DEFAULT_CLEANUP_INTERVAL};
pub use service::{Clock, PrayerTimesService, DEFAULT_TTL};
