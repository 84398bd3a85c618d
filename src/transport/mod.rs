//! Transport layer for broker communication
//!
//! [`Transport`] is the narrow capability the connection manager needs from a
//! publish/subscribe client: connect, publish, report liveness, disconnect,
//! and deliver connection events. [`mqtt::MqttTransport`] implements it on top
//! of rumqttc; tests use [`crate::testing::MockTransport`].

use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("No connection acknowledgement within {millis}ms")]
    ConnectTimeout { millis: u64 },
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publish not accepted within {millis}ms")]
    WriteTimeout { millis: u64 },
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

impl TransportError {
    /// Wrap a plain message as a connect failure
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        TransportError::ConnectFailed(reason.into())
    }

    /// Wrap a plain message as a publish failure
    pub fn publish_failed(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        TransportError::PublishFailed(reason.into())
    }
}

/// Connection events raised by a transport
///
/// Implementations are invoked from the transport's own background task,
/// one event at a time, and must not block.
pub trait TransportEvents: Send + Sync {
    /// A connection was established, initially or by automatic reconnection
    fn on_connect(&self);

    /// An established connection was lost
    fn on_connection_lost(&self, reason: &TransportError);
}

/// Publish/subscribe transport capability
///
/// All operations take `&self`; implementations synchronize internally so one
/// transport can serve concurrent publishers.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the broker, resolving once the broker acknowledged the
    /// session or the configured connect timeout elapsed
    async fn connect(&self) -> Result<(), TransportError>;

    /// Publish one message, waiting until the transport accepted it or the
    /// write timeout elapsed
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Whether the transport currently holds a live connection
    fn is_connected(&self) -> bool;

    /// Disconnect, allowing in-flight work up to `grace` to finish
    async fn disconnect(&self, grace: Duration);

    /// Register the receiver of connection events
    fn set_event_handler(&mut self, handler: Arc<dyn TransportEvents>);

    /// Enable or disable automatic reconnection after a lost connection,
    /// with `max_interval` as the backoff ceiling
    fn set_auto_reconnect(&mut self, enabled: bool, max_interval: Duration);

    /// Bound how long a single publish may wait on the transport
    fn set_write_timeout(&mut self, timeout: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let errors = vec![
            TransportError::connect_failed("refused"),
            TransportError::ConnectTimeout { millis: 30_000 },
            TransportError::publish_failed("queue closed"),
            TransportError::WriteTimeout { millis: 25 },
            TransportError::ConnectionLost("reset by peer".to_string()),
            TransportError::NotConnected,
            TransportError::InvalidBrokerUrl("tcp://".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
        assert_eq!(
            TransportError::connect_failed("refused").to_string(),
            "Connection failed: refused"
        );
    }
}
