//! Application configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream (mawaqit) fetch settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Prayer-times cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Masjid used when a caller does not name one and no setting is stored.
    #[serde(default)]
    pub default_masjid: String,

    /// Mosques seeded into the local directory at startup.
    #[serde(default)]
    pub mosques: Vec<MosqueConfig>,

    /// Watch-mode timing.
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Upstream site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL; the masjid id is appended as the last path segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request deadline (connect + headers + body).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached day of prayer times.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Interval between background sweeps of expired entries.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Coalesce concurrent misses for the same key into one upstream fetch.
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

/// A mosque entry in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosqueConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub timezone: String,
}

/// Watch-mode timing (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// How often today's times are refreshed for every configured mosque.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://mawaqit.net/en/m".into()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_user_agent() -> String {
    "prayer-times/0.1".into()
}

fn default_ttl() -> u64 {
    3600
}
fn default_cleanup_interval() -> u64 {
    300
}

fn default_refresh_interval() -> u64 {
    1800
}
fn default_heartbeat_interval() -> u64 {
    60
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
            single_flight: true,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            default_masjid: String::new(),
            mosques: Vec::new(),
            watch: WatchConfig::default(),
        }
    }
}
