use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use serde::Serialize;

use crate::crypto::generate_random_bytes;
use crate::wsse::Result;

const TIMESTAMP_TTL_SECS: i64 = 60 * 60;

const NONCE_LEN: usize = 16;
const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Timestamp {
    #[serde(rename = "@wsu:Id")]
    pub id: String,

    #[serde(rename = "wsu:Created")]
    pub created: String,

    #[serde(rename = "wsu:Expires")]
    pub expires: String,
}

impl Timestamp {
    /// An empty timestamp to be filled in once the request is populated
    pub fn placeholder(id: String) -> Self {
        Self {
            id,
            created: String::new(),
            expires: String::new(),
        }
    }
}

/// Per-request values written into the security header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityValues {
    created: DateTime<Utc>,
    nonce: String,
}

impl SecurityValues {
    /// Fresh values: the current instant and 16 random bytes from the OS.
    pub fn generate() -> Result<Self> {
        let nonce = BASE64.encode(generate_random_bytes(NONCE_LEN)?);
        Ok(Self::new(Utc::now(), nonce))
    }

    /// Fixed values. `created` is truncated to whole milliseconds.
    pub fn new(created: DateTime<Utc>, nonce: impl Into<String>) -> Self {
        Self {
            created: created.trunc_subsecs(3),
            nonce: nonce.into(),
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.created + timestamp_ttl()
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn created_str(&self) -> String {
        format_instant(self.created())
    }

    pub fn expires_str(&self) -> String {
        format_instant(self.expires())
    }
}

/// Lifetime of a request between `Created` and `Expires`
pub fn timestamp_ttl() -> TimeDelta {
    TimeDelta::seconds(TIMESTAMP_TTL_SECS)
}

/// UTC instant with millisecond precision and a literal `Z`
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(INSTANT_FORMAT).to_string()
}

/// Parse an instant written by [`format_instant`]
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, INSTANT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
