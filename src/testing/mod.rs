//! Testing utilities and mock implementations
//!
//! In-memory stand-ins for the broker transport and id generation, so the
//! client can be exercised without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
