//! Status heartbeat payloads
//!
//! Short messages reporting whether a device path is running. Every status
//! message carries the current UTC time with millisecond precision and a fresh
//! correlation id; `description` only appears when it is non-empty.

use super::dialect::Dialect;
use super::topics::TopicBuilder;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Timestamp layout used by status messages, e.g. `2024-01-01T00:00:00.000Z`
pub const STATUS_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Render a UTC instant in the status timestamp layout
pub fn format_status_datetime(at: DateTime<Utc>) -> String {
    at.format(STATUS_DATETIME_FORMAT).to_string()
}

/// Reported state of a device path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Running,
    NotRunning,
    Error,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Running => "RUNNING",
            StatusKind::NotRunning => "NOT_RUNNING",
            StatusKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status payload for one device path
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub dialect: Dialect,
    pub status: StatusKind,
    pub datetime: String,
    pub correlation_id: String,
    /// Omitted from the payload when empty
    pub description: String,
}

impl StatusMessage {
    pub fn new(
        dialect: Dialect,
        status: StatusKind,
        at: DateTime<Utc>,
        correlation_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            status,
            datetime: format_status_datetime(at),
            correlation_id: correlation_id.into(),
            description: description.into(),
        }
    }

    /// Topic for this status on `path`, `<prefix><path>[status]`
    pub fn topic(&self, path: &str) -> String {
        TopicBuilder::status_topic(self.dialect, path)
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Serialize for StatusMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let has_description = !self.description.is_empty();
        let mut map = serializer.serialize_map(Some(3 + usize::from(has_description)))?;
        map.serialize_entry("status", &self.status)?;
        map.serialize_entry("datetime", &self.datetime)?;
        map.serialize_entry(self.dialect.correlation_field(), &self.correlation_id)?;
        if has_description {
            map.serialize_entry("description", &self.description)?;
        }
        map.end()
    }
}
