//! Builds status heartbeats for device paths

use crate::protocol::{Dialect, IdGenerator, StatusKind, StatusMessage};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A status message ready to hand to the connection manager
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingStatus {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Creates status messages for one dialect
#[derive(Clone)]
pub struct StatusPublisher {
    dialect: Dialect,
    ids: Arc<dyn IdGenerator>,
}

impl StatusPublisher {
    pub fn new(dialect: Dialect, ids: Arc<dyn IdGenerator>) -> Self {
        Self { dialect, ids }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Status message stamped with the current time
    pub fn message(&self, status: StatusKind, description: &str) -> StatusMessage {
        self.message_at(status, description, Utc::now())
    }

    pub fn message_at(
        &self,
        status: StatusKind,
        description: &str,
        at: DateTime<Utc>,
    ) -> StatusMessage {
        StatusMessage::new(self.dialect, status, at, self.ids.new_id(), description)
    }

    /// Topic and serialized payload for `status` on `path`
    pub fn build(
        &self,
        path: &str,
        status: StatusKind,
        description: &str,
    ) -> serde_json::Result<OutgoingStatus> {
        self.build_at(path, status, description, Utc::now())
    }

    pub fn build_at(
        &self,
        path: &str,
        status: StatusKind,
        description: &str,
        at: DateTime<Utc>,
    ) -> serde_json::Result<OutgoingStatus> {
        let message = self.message_at(status, description, at);
        Ok(OutgoingStatus {
            topic: message.topic(path),
            payload: message.to_payload()?,
        })
    }
}
