//! Client facade for host applications

pub mod sensor_client;
pub mod status_publisher;

pub use sensor_client::SensorClient;
pub use status_publisher::{OutgoingStatus, StatusPublisher};
