//! Audit Types

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category used for mitigation entries
pub const AUTO_BLOCK_CATEGORY: &str = "AutoBlock";

/// One immutable audit record.
///
/// Field names on disk (`user_id`, `attack`, `status`, `timestamp`, `extra`)
/// are what the dashboard reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Subject, i.e. the source address
    #[serde(rename = "user_id")]
    pub subject: String,
    /// Detection type or "AutoBlock"
    #[serde(rename = "attack")]
    pub category: String,
    pub status: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl AuditEntry {
    pub fn new(subject: &str, category: &str, status: &str) -> Self {
        Self {
            subject: subject.to_string(),
            category: category.to_string(),
            status: status.to_string(),
            // Stored at second precision, so keep the in-memory copy identical
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            extra: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    #[cfg(test)]
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// `%Y-%m-%d %H:%M:%S`, local time
mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
