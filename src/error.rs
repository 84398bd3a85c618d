//! Error types for the sensor client
//!
//! Connect and publish failures are returned to the immediate caller and never
//! retried here. Publishes dropped because the connection is down are not
//! errors; see [`crate::connection::PublishOutcome`].

use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connect failed: {0}")]
    Connect(#[source] TransportError),

    #[error("Publish failed: {0}")]
    Publish(#[source] TransportError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Client has been cleaned up")]
    Terminated,
}

impl ClientError {
    /// True for errors raised by the transport while talking to the broker
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Connect(_) | ClientError::Publish(_))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            ClientError::Connect(TransportError::ConnectTimeout { millis: 100 }),
            ClientError::Publish(TransportError::WriteTimeout { millis: 25 }),
            ClientError::InvalidBrokerUrl("tcp://:1883".to_string()),
            ClientError::Config(ConfigError::InvalidConfig("bad".to_string())),
            ClientError::Terminated,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_connect_error_keeps_source() {
        use std::error::Error as _;

        let error = ClientError::Connect(TransportError::ConnectTimeout { millis: 100 });
        let source = error.source().expect("source should be preserved");
        assert!(source.to_string().contains("100"));
        assert!(error.is_transport());
        assert!(!ClientError::Terminated.is_transport());
    }

    #[test]
    fn test_serialization_error_from_serde() {
        let serde_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: ClientError = serde_error.into();
        assert!(matches!(error, ClientError::Serialization(_)));
    }
}
