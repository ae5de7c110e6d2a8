//! Domain types shared across the workspace.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};

// ── Prayer times ──────────────────────────────────────────────────────

/// The six daily entries of an upstream calendar row, in schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prayer {
    Fajr,
    Shuruq,
    Dhuhr,
    Asr,
    Maghreb,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 6] = [
        Prayer::Fajr,
        Prayer::Shuruq,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghreb,
        Prayer::Isha,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Prayer::Fajr => "fajr",
            Prayer::Shuruq => "shuruq",
            Prayer::Dhuhr => "dhuhr",
            Prayer::Asr => "asr",
            Prayer::Maghreb => "maghreb",
            Prayer::Isha => "isha",
        }
    }
}

impl std::fmt::Display for Prayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialize an instant in UTC with second precision (`2024-03-15T04:30:00Z`).
fn utc_seconds<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// One day of prayer times for a masjid, as absolute instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimes {
    #[serde(serialize_with = "utc_seconds")]
    pub fajr: DateTime<Utc>,
    #[serde(serialize_with = "utc_seconds")]
    pub shuruq: DateTime<Utc>,
    #[serde(serialize_with = "utc_seconds")]
    pub dhuhr: DateTime<Utc>,
    #[serde(serialize_with = "utc_seconds")]
    pub asr: DateTime<Utc>,
    #[serde(serialize_with = "utc_seconds")]
    pub maghreb: DateTime<Utc>,
    #[serde(serialize_with = "utc_seconds")]
    pub isha: DateTime<Utc>,
    /// IANA zone name the clock times were interpreted in.
    pub timezone: String,
}

impl PrayerTimes {
    /// Build from six instants in schedule order.
    pub fn from_ordered(times: [DateTime<Utc>; 6], timezone: impl Into<String>) -> Self {
        let [fajr, shuruq, dhuhr, asr, maghreb, isha] = times;
        Self {
            fajr,
            shuruq,
            dhuhr,
            asr,
            maghreb,
            isha,
            timezone: timezone.into(),
        }
    }

    pub fn get(&self, prayer: Prayer) -> DateTime<Utc> {
        match prayer {
            Prayer::Fajr => self.fajr,
            Prayer::Shuruq => self.shuruq,
            Prayer::Dhuhr => self.dhuhr,
            Prayer::Asr => self.asr,
            Prayer::Maghreb => self.maghreb,
            Prayer::Isha => self.isha,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Prayer, DateTime<Utc>)> + '_ {
        Prayer::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// True when every instant is strictly after the previous one.
    pub fn is_ordered(&self) -> bool {
        Prayer::ALL
            .windows(2)
            .all(|pair| self.get(pair[0]) < self.get(pair[1]))
    }

    /// Last prayer whose time has been reached, if any.
    pub fn current_prayer(&self, now: DateTime<Utc>) -> Option<Prayer> {
        self.iter()
            .filter(|(_, t)| now >= *t)
            .map(|(p, _)| p)
            .last()
    }

    /// First prayer still ahead of `now` on this day.
    pub fn next_prayer(&self, now: DateTime<Utc>) -> Option<(Prayer, DateTime<Utc>)> {
        self.iter().find(|(_, t)| now < *t)
    }
}

/// Night markers between maghreb and the following fajr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightTimes {
    /// Halfway point of the night.
    #[serde(serialize_with = "utc_seconds")]
    pub midnight: DateTime<Utc>,
    /// Start of the last third of the night.
    #[serde(serialize_with = "utc_seconds")]
    pub last_third: DateTime<Utc>,
}

impl NightTimes {
    pub fn between(maghreb: DateTime<Utc>, next_fajr: DateTime<Utc>) -> Self {
        let night = next_fajr - maghreb;
        let secs = night.num_seconds();
        Self {
            midnight: maghreb + Duration::seconds(secs / 2),
            last_third: maghreb + Duration::seconds(secs * 2 / 3),
        }
    }
}

// ── Directory ─────────────────────────────────────────────────────────

/// A mosque known to the local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mosque {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Fields an update may change; the id is immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MosqueUpdate {
    pub name: String,
    pub country: String,
    pub city: String,
    pub timezone: String,
}

/// Public view of a mosque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosqueInfo {
    pub id: String,
    pub name: String,
    pub country: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timezone: String,
}

impl From<&Mosque> for MosqueInfo {
    fn from(m: &Mosque) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            country: m.country.clone(),
            city: m.city.clone(),
            timezone: m.timezone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosqueValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// A single application setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: String,
    pub value: String,
}
