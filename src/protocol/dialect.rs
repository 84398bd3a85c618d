//! Wire dialect selection
//!
//! Two downstream consumers read the same bus with slightly different
//! conventions. The dialect is chosen once, when a client is built, and every
//! envelope and status payload produced by that client follows it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire-format variant used for topics and payload field names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Mode A: `esp` topic prefix, `messageId` correlation field, no `entity`
    /// field and no `created` timestamps on values
    Esp,
    /// Mode B: `sdw` topic prefix, `commandId` correlation field
    #[default]
    Sdw,
}

impl Dialect {
    /// Topic prefix prepended to entity and device paths
    pub fn topic_prefix(self) -> &'static str {
        match self {
            Dialect::Esp => "esp",
            Dialect::Sdw => "sdw",
        }
    }

    /// Name of the per-message correlation id field
    pub fn correlation_field(self) -> &'static str {
        match self {
            Dialect::Esp => "messageId",
            Dialect::Sdw => "commandId",
        }
    }

    /// Whether value records may carry a `created` timestamp
    pub fn supports_created(self) -> bool {
        matches!(self, Dialect::Sdw)
    }

    /// Whether sensor value envelopes carry a top-level `entity` field
    pub fn includes_entity(self) -> bool {
        matches!(self, Dialect::Sdw)
    }

    /// Map the legacy boolean "esp supported" flag onto a dialect
    pub fn from_esp_flag(esp: bool) -> Self {
        if esp {
            Dialect::Esp
        } else {
            Dialect::Sdw
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_prefix())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "esp" | "a" => Ok(Dialect::Esp),
            "sdw" | "b" => Ok(Dialect::Sdw),
            other => Err(format!("unknown dialect '{other}', expected 'esp' or 'sdw'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sdw() {
        assert_eq!(Dialect::default(), Dialect::Sdw);
    }

    #[test]
    fn test_dialect_conventions() {
        assert_eq!(Dialect::Esp.topic_prefix(), "esp");
        assert_eq!(Dialect::Esp.correlation_field(), "messageId");
        assert!(!Dialect::Esp.supports_created());
        assert!(!Dialect::Esp.includes_entity());

        assert_eq!(Dialect::Sdw.topic_prefix(), "sdw");
        assert_eq!(Dialect::Sdw.correlation_field(), "commandId");
        assert!(Dialect::Sdw.supports_created());
        assert!(Dialect::Sdw.includes_entity());
    }

    #[test]
    fn test_from_esp_flag() {
        assert_eq!(Dialect::from_esp_flag(true), Dialect::Esp);
        assert_eq!(Dialect::from_esp_flag(false), Dialect::Sdw);
    }

    #[test]
    fn test_parse() {
        assert_eq!("esp".parse::<Dialect>(), Ok(Dialect::Esp));
        assert_eq!(" SDW ".parse::<Dialect>(), Ok(Dialect::Sdw));
        assert!("mqtt".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Dialect::Esp).unwrap();
        assert_eq!(json, "\"esp\"");
        let parsed: Dialect = serde_json::from_str("\"sdw\"").unwrap();
        assert_eq!(parsed, Dialect::Sdw);
    }
}
