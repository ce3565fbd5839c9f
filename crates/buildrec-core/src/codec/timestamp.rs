//! Record timestamps.
//!
//! The cluster writes ISO-8601 with second precision and a trailing `Z`.
//! Other producers use offsets or fractional seconds, so a decoded value
//! keeps the text it was read from and writes that text back. Comparisons
//! and arithmetic go through `at()`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Cluster layout: `2019-10-11T15:23:44Z`.
pub fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    at: DateTime<Utc>,
}

impl Timestamp {
    pub fn parse(raw: impl Into<String>) -> Result<Self, chrono::ParseError> {
        let raw = raw.into();
        let at = DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc);
        Ok(Self { raw, at })
    }

    /// The instant, in UTC.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// The text as read, or as written for stamped values.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Stamps are truncated to whole seconds and written in cluster layout.
impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        let at = at.trunc_subsecs(0);
        Self { raw: format(&at), at }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(raw).map_err(de::Error::custom)
    }
}
