//! Connection lifecycle: state machine, lazy connect and publish policy

pub mod manager;

pub use crate::transport::mqtt::connection::ReconnectPolicy;
pub use manager::{ConnectionManager, ConnectionState, LifecycleCallback, PublishOutcome};
