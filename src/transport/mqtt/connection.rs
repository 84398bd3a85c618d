//! Pure connection state management for the MQTT transport
//!
//! This module contains the link state enum, the reconnection backoff policy
//! and the translation of a `tcp://host:port` broker address into rumqttc
//! options.

use crate::transport::TransportError;
use rumqttc::v5::MqttOptions;
use std::time::Duration;
use url::Url;

/// Keep-alive interval negotiated with the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Link state of the MQTT transport
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    /// No connection attempt made yet
    Idle,
    /// Waiting for the broker to acknowledge the session
    Connecting,
    /// Session acknowledged, ready for publishing
    Connected,
    /// Established connection dropped with reason
    Lost(String),
    /// Waiting before reconnection attempt (attempt count)
    Reconnecting(u32),
    /// Initial handshake failed; no automatic retry
    Failed(String),
    /// Disconnect requested, draining in-flight work
    Closing,
    /// Disconnected on request
    Closed,
}

/// Reconnection backoff policy
///
/// The delay before attempt `n` (1-based) doubles from `initial_interval`
/// and never exceeds `max_interval`. Attempts are unlimited while
/// `auto_reconnect` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub auto_reconnect: bool,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate backoff delay for given attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_interval
            .saturating_mul(1u32 << exponent)
            .min(self.max_interval)
    }
}

/// Split a broker URL into host and port.
///
/// Accepts `tcp://` and `mqtt://` URLs; the port defaults to 1883.
pub fn parse_broker_url(broker_url: &str) -> Result<(String, u16), TransportError> {
    let url =
        Url::parse(broker_url).map_err(|_| TransportError::InvalidBrokerUrl(broker_url.to_string()))?;

    if !matches!(url.scheme(), "tcp" | "mqtt") {
        return Err(TransportError::InvalidBrokerUrl(broker_url.to_string()));
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| TransportError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(1883);

    Ok((host.to_string(), port))
}

/// Build rumqttc options for a broker URL and client id
pub fn configure_mqtt_options(
    client_id: &str,
    broker_url: &str,
) -> Result<MqttOptions, TransportError> {
    let (host, port) = parse_broker_url(broker_url)?;

    let mut mqtt_options = MqttOptions::new(client_id, host, port);
    mqtt_options.set_keep_alive(KEEP_ALIVE);

    Ok(mqtt_options)
}
