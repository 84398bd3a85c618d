//! Message formats for sensor telemetry and device status
//!
//! Builds the topics and JSON payloads for the two message families, in
//! either wire dialect.

pub mod dialect;
pub mod ids;
pub mod sensor_value;
pub mod status;
pub mod topics;

pub use dialect::Dialect;
pub use ids::{IdGenerator, UuidGenerator};
pub use sensor_value::{Attributes, SensorValueMessage, ValueRecord};
pub use status::{format_status_datetime, StatusKind, StatusMessage, STATUS_DATETIME_FORMAT};
pub use topics::{TopicBuilder, STATUS_SUFFIX, VALUE_SUFFIX};
