//! Mawaqit masjid page client.
//!
//! Fetches a masjid's public page, pulls the embedded `confData` calendar
//! out of it and turns one day's clock times into absolute instants.

pub mod compose;
pub mod confdata;

use async_trait::async_trait;
use common::config::UpstreamConfig;
use common::{Error, PrayerTimes};
use tracing::debug;
use url::Url;

pub use compose::{compose, resolve_zone};
pub use confdata::{extract_conf_data, prayer_times_for_day, ConfData};

/// Anything that can produce one day of prayer times for a masjid.
///
/// Implementations do no caching; `year` is the calendar year the clock
/// times are anchored to.
#[async_trait]
pub trait PrayerTimesFetcher: Send + Sync {
    async fn fetch(
        &self,
        masjid_id: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<PrayerTimes, Error>;
}

/// HTTP client for mawaqit masjid pages.
#[derive(Debug, Clone)]
pub struct MawaqitClient {
    client: reqwest::Client,
    base_url: Url,
}

impl MawaqitClient {
    /// Build a client with the configured deadline and user agent.
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .pool_max_idle_per_host(4)
            .connect_timeout(cfg.connect_timeout())
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build mawaqit HTTP client: {e}")))?;

        Self::with_client(client, &cfg.base_url)
    }

    /// Use a prebuilt `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid upstream base_url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "upstream base_url {base_url} cannot take path segments"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Page URL for a masjid; the id is percent-encoded as one path segment.
    pub fn page_url(&self, masjid_id: &str) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::Config(format!(
                    "upstream base_url {} cannot take path segments",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(masjid_id);
        Ok(url)
    }

    /// GET the raw masjid page.
    pub async fn fetch_page(&self, masjid_id: &str) -> Result<String, Error> {
        let url = self.page_url(masjid_id)?;

        debug!("Fetching mawaqit page: {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(masjid_id, describe(&e)))?;

        let status = resp.status().as_u16();
        if status == 404 {
            return Err(Error::NotFound(masjid_id.to_string()));
        }
        if status != 200 {
            return Err(Error::Upstream {
                masjid_id: masjid_id.to_string(),
                status,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::transport(masjid_id, format!("failed to read response body: {}", describe(&e))))?;

        debug!("Got {} bytes for masjid {}", body.len(), masjid_id);

        Ok(body)
    }

    /// Fetch and decode one day of prayer times.
    pub async fn get_prayer_times(
        &self,
        masjid_id: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<PrayerTimes, Error> {
        let html = self.fetch_page(masjid_id).await?;
        let conf = extract_conf_data(masjid_id, &html)?;
        prayer_times_for_day(masjid_id, &conf, year, month, day)
    }
}

#[async_trait]
impl PrayerTimesFetcher for MawaqitClient {
    async fn fetch(
        &self,
        masjid_id: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<PrayerTimes, Error> {
        self.get_prayer_times(masjid_id, year, month, day).await
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}
