//! samqtt - sensor value and status publishing over MQTT
//!
//! A client library for devices and gateways that report sensor readings and
//! liveness to an MQTT broker in one of two wire dialects (`esp` and `sdw`).
//!
//! # Overview
//!
//! - Sensor value envelopes with per-field values, attributes and timestamps
//! - Status heartbeats (`RUNNING`, `NOT_RUNNING`, `ERROR`) per device path
//! - Connection lifecycle with connect on first publish and automatic
//!   reconnection after a session was established
//! - MQTT transport built on rumqttc, swappable through the [`transport::Transport`] trait
//!
//! # Quick Start
//!
//! ```rust
//! use samqtt::protocol::{Dialect, SensorValueMessage};
//!
//! let mut msg = SensorValueMessage::with_id(
//!     Dialect::Sdw,
//!     "/zone1/tempSensor",
//!     "2024-01-01T00:00:00Z",
//!     "3f1c0b7e-0000-4000-8000-000000000000",
//! );
//! msg.add_value("temperature", 21.5);
//!
//! assert_eq!(msg.publish_topic(), "sdw/zone1/tempSensor[value]");
//! let payload = msg.to_payload().unwrap();
//! assert!(String::from_utf8(payload).unwrap().starts_with("{\"commandId\""));
//! ```
//!
//! Publishing goes through [`SensorClient`]:
//!
//! ```rust,no_run
//! use samqtt::{ClientConfig, SensorClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), samqtt::ClientError> {
//! let client = SensorClient::new(&ClientConfig::new("localhost", 1883, "gateway-1"))?;
//! client.publish_running("/plant/line1").await?;
//! client.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use client::{SensorClient, StatusPublisher};
pub use config::*;
pub use connection::{ConnectionManager, ConnectionState, PublishOutcome, ReconnectPolicy};
pub use error::{ClientError, ClientResult};
pub use protocol::*;
