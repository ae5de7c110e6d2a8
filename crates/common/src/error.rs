//! Unified error type for prayer-times.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Upstream answered 404: the masjid id is unknown.
    #[error("masjid {0} not found")]
    NotFound(String),

    #[error("upstream error for masjid {masjid_id}: status {status}")]
    Upstream { masjid_id: String, status: u16 },

    #[error("transport error for masjid {masjid_id}: {message}")]
    Transport { masjid_id: String, message: String },

    /// Scraped payload is missing or has a malformed expected structure.
    #[error("parse error for masjid {masjid_id}: {message}")]
    Parse { masjid_id: String, message: String },

    #[error("invalid date: month {month}, day {day}")]
    InvalidDate { month: u32, day: u32 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn parse(masjid_id: &str, message: impl Into<String>) -> Self {
        Error::Parse {
            masjid_id: masjid_id.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(masjid_id: &str, message: impl Into<String>) -> Self {
        Error::Transport {
            masjid_id: masjid_id.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status an API layer should answer with for this error.
    pub fn status_hint(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::InvalidDate { .. } => 400,
            Error::Upstream { .. } | Error::Transport { .. } | Error::Parse { .. } => 502,
            Error::Config(_) | Error::Store(_) | Error::Json(_) => 500,
        }
    }
}
