//! Pure health monitoring and reconnection logic for the MQTT transport
//!
//! This module contains pure functions deciding state transitions and
//! whether the supervisor should reconnect after a connection drops.

use super::connection::{LinkState, ReconnectPolicy};
use std::time::Duration;
use tracing::{error, info, warn};

/// Connection events observed by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    ConnAckReceived,
    DisconnectedByBroker,
    NetworkError(String),
    ReconnectionStarted(u32),
    HandshakeFailed(String),
}

/// Outcome of a reconnection decision
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay: Duration },
    AbortShutdownRequested,
    /// The session was never acknowledged; the caller of connect reports it
    AbortNeverConnected,
    AbortDisabled,
}

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine if reconnection should be attempted (pure function)
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        policy: &ReconnectPolicy,
        ever_confirmed: bool,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }
        if !ever_confirmed {
            return ReconnectionDecision::AbortNeverConnected;
        }
        if !policy.auto_reconnect {
            return ReconnectionDecision::AbortDisabled;
        }

        let attempt = current_attempts.saturating_add(1);
        ReconnectionDecision::Proceed {
            attempt,
            delay: policy.backoff_delay(attempt),
        }
    }

    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> LinkState {
        match event {
            ConnectionEvent::ConnAckReceived => LinkState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                LinkState::Lost("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(reason) => LinkState::Lost(reason),
            ConnectionEvent::ReconnectionStarted(attempt) => LinkState::Reconnecting(attempt),
            ConnectionEvent::HandshakeFailed(reason) => LinkState::Failed(reason),
        }
    }

    /// Check if link state allows publishing (pure function)
    pub fn can_publish(state: &LinkState) -> bool {
        matches!(state, LinkState::Connected)
    }

    /// Whether leaving `previous` because of an error counts as losing an
    /// established connection
    pub fn is_connection_loss(previous: &LinkState) -> bool {
        matches!(previous, LinkState::Connected)
    }

    /// Whether the transport is shutting down on request
    pub fn is_closing(state: &LinkState) -> bool {
        matches!(state, LinkState::Closing | LinkState::Closed)
    }

    /// Log link state transition (pure logging function)
    pub fn log_state_transition(from: &LinkState, to: &LinkState) {
        match (from, to) {
            (LinkState::Connecting, LinkState::Connected) => {
                info!("MQTT connection established");
            }
            (LinkState::Reconnecting(_), LinkState::Connected) => {
                info!("MQTT reconnection successful");
            }
            (LinkState::Connected, LinkState::Lost(reason)) => {
                warn!("MQTT connection lost: {}", reason);
            }
            (_, LinkState::Reconnecting(attempt)) => {
                info!("Starting MQTT reconnection attempt {}", attempt);
            }
            (_, LinkState::Failed(reason)) => {
                error!("MQTT connection attempt failed: {}", reason);
            }
            _ => {
                tracing::debug!(target: "mqtt_transport", "Link state {:?} -> {:?}", from, to);
            }
        }
    }
}
