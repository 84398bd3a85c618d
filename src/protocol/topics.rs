//! Topic construction for value and status messages
//!
//! Topics are the dialect prefix glued directly onto the entity or device
//! path, followed by a bracketed message kind:
//!
//! - value messages: `<prefix><entity>[value]`
//! - status messages: `<prefix><path>[status]`
//!
//! Paths are used verbatim. Downstream consumers match on the exact string,
//! so no canonicalization is applied.

use super::dialect::Dialect;

/// Suffix appended to sensor value topics
pub const VALUE_SUFFIX: &str = "[value]";

/// Suffix appended to status topics
pub const STATUS_SUFFIX: &str = "[status]";

pub struct TopicBuilder;

impl TopicBuilder {
    /// Base topic of a sensor value envelope: `<prefix><entity>`
    pub fn entity_topic(dialect: Dialect, entity: &str) -> String {
        format!("{}{entity}", dialect.topic_prefix())
    }

    /// Publish topic for a value envelope whose base topic is already known
    pub fn value_topic_from_base(base: &str) -> String {
        format!("{base}{VALUE_SUFFIX}")
    }

    /// Build sensor value topic: `<prefix><entity>[value]`
    pub fn value_topic(dialect: Dialect, entity: &str) -> String {
        Self::value_topic_from_base(&Self::entity_topic(dialect, entity))
    }

    /// Build status topic: `<prefix><path>[status]`
    pub fn status_topic(dialect: Dialect, path: &str) -> String {
        format!("{}{path}{STATUS_SUFFIX}", dialect.topic_prefix())
    }
}
