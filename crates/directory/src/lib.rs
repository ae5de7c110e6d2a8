//! Local mosque directory and application settings.
//!
//! The backing database is not part of this workspace; consumers talk to
//! the [`MosqueStore`] and [`SettingsStore`] traits. [`InMemoryDirectory`]
//! implements both for the binary and for tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use common::config::MosqueConfig;
use common::{AppSetting, Error, Mosque, MosqueUpdate};
use tokio::sync::RwLock;
use tracing::debug;

/// Setting key holding the default masjid id.
pub const DEFAULT_MASJID_KEY: &str = "default_masjid";

#[async_trait]
pub trait MosqueStore: Send + Sync {
    /// All mosques ordered by name.
    async fn all(&self) -> Result<Vec<Mosque>, Error>;
    async fn get(&self, id: &str) -> Result<Option<Mosque>, Error>;
    async fn exists(&self, id: &str) -> Result<bool, Error>;
    /// Insert a new mosque; fails if the id is taken.
    async fn create(&self, mosque: Mosque) -> Result<Mosque, Error>;
    async fn update(&self, id: &str, update: MosqueUpdate) -> Result<Mosque, Error>;
    async fn delete(&self, id: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<AppSetting>, Error>;
    /// Insert or overwrite.
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn delete_setting(&self, key: &str) -> Result<(), Error>;
    /// All settings ordered by key.
    async fn all_settings(&self) -> Result<Vec<AppSetting>, Error>;
}

/// Process-local directory guarded by a read/write lock per table.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    mosques: RwLock<HashMap<String, Mosque>>,
    settings: RwLock<BTreeMap<String, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-filled with the configured mosques.
    pub fn seeded(mosques: &[MosqueConfig]) -> Self {
        let now = Utc::now().timestamp();
        let table = mosques
            .iter()
            .map(|m| {
                (
                    m.id.clone(),
                    Mosque {
                        id: m.id.clone(),
                        name: m.name.clone(),
                        country: m.country.clone(),
                        city: m.city.clone(),
                        timezone: m.timezone.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                )
            })
            .collect();

        Self {
            mosques: RwLock::new(table),
            settings: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl MosqueStore for InMemoryDirectory {
    async fn all(&self) -> Result<Vec<Mosque>, Error> {
        let table = self.mosques.read().await;
        let mut mosques: Vec<Mosque> = table.values().cloned().collect();
        mosques.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(mosques)
    }

    async fn get(&self, id: &str) -> Result<Option<Mosque>, Error> {
        Ok(self.mosques.read().await.get(id).cloned())
    }

    async fn exists(&self, id: &str) -> Result<bool, Error> {
        Ok(self.mosques.read().await.contains_key(id))
    }

    async fn create(&self, mut mosque: Mosque) -> Result<Mosque, Error> {
        if mosque.id.trim().is_empty() {
            return Err(Error::Store("mosque id must not be empty".into()));
        }
        let mut table = self.mosques.write().await;
        if table.contains_key(&mosque.id) {
            return Err(Error::Store(format!("mosque {} already exists", mosque.id)));
        }
        let now = Utc::now().timestamp();
        mosque.created_at = now;
        mosque.updated_at = now;
        table.insert(mosque.id.clone(), mosque.clone());
        debug!("Created mosque {}", mosque.id);
        Ok(mosque)
    }

    async fn update(&self, id: &str, update: MosqueUpdate) -> Result<Mosque, Error> {
        let mut table = self.mosques.write().await;
        let mosque = table
            .get_mut(id)
            .ok_or_else(|| Error::Store(format!("mosque {id} not found")))?;
        mosque.name = update.name;
        mosque.country = update.country;
        mosque.city = update.city;
        mosque.timezone = update.timezone;
        mosque.updated_at = Utc::now().timestamp();
        Ok(mosque.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        match self.mosques.write().await.remove(id) {
            Some(_) => {
                debug!("Deleted mosque {}", id);
                Ok(())
            }
            None => Err(Error::Store(format!("mosque {id} not found"))),
        }
    }
}

#[async_trait]
impl SettingsStore for InMemoryDirectory {
    async fn get_setting(&self, key: &str) -> Result<Option<AppSetting>, Error> {
        Ok(self.settings.read().await.get(key).map(|value| AppSetting {
            key: key.to_string(),
            value: value.clone(),
        }))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<(), Error> {
        self.settings.write().await.remove(key);
        Ok(())
    }

    async fn all_settings(&self) -> Result<Vec<AppSetting>, Error> {
        Ok(self
            .settings
            .read()
            .await
            .iter()
            .map(|(key, value)| AppSetting {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }
}
