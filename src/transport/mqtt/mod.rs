//! MQTT transport built on rumqttc
//!
//! The module separates pure functions from I/O for testability:
//!
//! - [`connection`] - link state, reconnect policy and broker options
//! - [`message_handler`] - routing of rumqttc events
//! - [`health_monitor`] - state transitions and reconnection decisions
//! - [`client`] - the event loop supervisor and the [`MqttTransport`] itself
//!
//! # Usage
//!
//! ```rust,no_run
//! use samqtt::transport::mqtt::MqttTransport;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MqttTransport::new("gateway-1", "tcp://localhost:1883")?;
//! transport.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::{MqttTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
pub use connection::{LinkState, ReconnectPolicy};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
