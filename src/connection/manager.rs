//! Connection lifecycle management over an injected transport
//!
//! [`ConnectionManager`] owns the transport and tracks two things on top of
//! it: the lifecycle state reported to the host, and whether any connection
//! ever succeeded. The latter drives the publish policy:
//!
//! - before the first successful connect, a publish triggers one synchronous
//!   connect attempt
//! - after it, publishes while the link is down are dropped and left to the
//!   transport's background reconnection
//!
//! `ever_connected` only moves from false to true. It deliberately stays set
//! across connection losses.

use crate::config::{BrokerSection, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::protocol::Dialect;
use crate::transport::{Transport, TransportError, TransportEvents};
use rumqttc::v5::mqttbytes::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Host callback fired on connect or disconnect
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle state as seen by the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection has succeeded yet
    #[default]
    Unconnected,
    Connecting,
    Connected,
    /// A connection existed and was lost; the transport may reconnect
    Disconnected,
    /// Cleaned up; no further operations are accepted
    Terminated,
}

/// Result of a successful publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport
    Delivered,
    /// Discarded because no connection was available
    Dropped,
}

struct Callbacks {
    on_connect: LifecycleCallback,
    on_disconnect: LifecycleCallback,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_connect: Arc::new(|| {}),
            on_disconnect: Arc::new(|| {}),
        }
    }
}

/// State shared between the manager and its transport event handler
#[derive(Default)]
struct SharedState {
    ever_connected: AtomicBool,
    state: RwLock<ConnectionState>,
    callbacks: RwLock<Callbacks>,
}

impl SharedState {
    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` unless already terminated
    fn transition(&self, next: ConnectionState) {
        self.transition_with(|| next);
    }

    /// Move to the state chosen by `next`, evaluated under the state lock so
    /// no transport event can interleave between the decision and the write
    fn transition_with(&self, next: impl FnOnce() -> ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != ConnectionState::Terminated {
            *state = next();
        }
    }

    fn terminate(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Terminated;
    }

    fn mark_connected(&self) {
        self.ever_connected.store(true, Ordering::SeqCst);
        self.transition(ConnectionState::Connected);
    }

    fn on_connect_callback(&self) -> LifecycleCallback {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .on_connect
            .clone()
    }

    fn on_disconnect_callback(&self) -> LifecycleCallback {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .on_disconnect
            .clone()
    }
}

/// Receives transport events on behalf of a manager without keeping it alive
struct LifecycleHandler {
    shared: Weak<SharedState>,
}

impl TransportEvents for LifecycleHandler {
    fn on_connect(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.mark_connected();
        info!("Client connected");
        (shared.on_connect_callback())();
    }

    fn on_connection_lost(&self, reason: &TransportError) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.transition(ConnectionState::Disconnected);
        warn!(error = %reason, "Client disconnected");
        (shared.on_disconnect_callback())();
    }
}

/// Owns the transport and implements the connect/publish/cleanup lifecycle
pub struct ConnectionManager<T: Transport> {
    broker: BrokerSection,
    dialect: Dialect,
    cleanup_grace: Duration,
    transport: T,
    shared: Arc<SharedState>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Take ownership of `transport`, configure its reconnect policy and write
    /// timeout, and register this manager's event handler on it.
    ///
    /// Callbacks start out as no-ops. Register them before the first
    /// connect; a connect event that fires before registration is missed.
    pub fn new(config: &ClientConfig, mut transport: T) -> Self {
        let shared = Arc::new(SharedState::default());
        let policy = config.reconnect.policy();

        transport.set_auto_reconnect(policy.auto_reconnect, policy.max_interval);
        transport.set_write_timeout(config.reconnect.write_timeout());
        transport.set_event_handler(Arc::new(LifecycleHandler {
            shared: Arc::downgrade(&shared),
        }));

        debug!(
            broker = %config.broker.broker_url(),
            client_id = %config.broker.client_id,
            dialect = %config.client.dialect,
            "Connection manager initialized"
        );

        Self {
            broker: config.broker.clone(),
            dialect: config.client.dialect,
            cleanup_grace: config.reconnect.cleanup_grace(),
            transport,
            shared,
        }
    }

    pub fn broker(&self) -> &BrokerSection {
        &self.broker
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether any connection has ever succeeded
    pub fn ever_connected(&self) -> bool {
        self.shared.ever_connected.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Replace both lifecycle callbacks
    pub fn register_callbacks<C, D>(&self, on_connect: C, on_disconnect: D)
    where
        C: Fn() + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        let mut callbacks = self
            .shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        callbacks.on_connect = Arc::new(on_connect);
        callbacks.on_disconnect = Arc::new(on_disconnect);
    }

    fn ensure_active(&self) -> ClientResult<()> {
        if self.state() == ConnectionState::Terminated {
            return Err(ClientError::Terminated);
        }
        Ok(())
    }

    /// Connect to the broker, waiting for the handshake.
    ///
    /// Returns at once when the transport is already connected. Failures are
    /// returned and not retried here.
    pub async fn connect(&self) -> ClientResult<()> {
        self.ensure_active()?;
        if self.transport.is_connected() {
            return Ok(());
        }
        self.shared.transition(ConnectionState::Connecting);

        match self.transport.connect().await {
            Ok(()) => {
                self.shared.ever_connected.store(true, Ordering::SeqCst);
                // The link may already have dropped again before we resumed
                self.shared.transition_with(|| {
                    if self.transport.is_connected() {
                        ConnectionState::Connected
                    } else {
                        ConnectionState::Disconnected
                    }
                });
                Ok(())
            }
            Err(e) => {
                let fallback = if self.ever_connected() {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Unconnected
                };
                self.shared.transition(fallback);
                warn!(
                    broker = %self.broker.broker_url(),
                    error = %e,
                    "Failed to connect client"
                );
                Err(ClientError::Connect(e))
            }
        }
    }

    /// Publish `payload` on `topic` (QoS 0, not retained).
    ///
    /// Connects first if no connection ever succeeded. When no connection is
    /// available afterwards the message is dropped and
    /// [`PublishOutcome::Dropped`] returned. Transport publish failures are
    /// returned as [`ClientError::Publish`].
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> ClientResult<PublishOutcome> {
        self.ensure_active()?;

        if !self.transport.is_connected() && !self.ever_connected() {
            debug!(topic = %topic, "Connecting on first publish");
            if let Err(e) = self.connect().await {
                warn!(topic = %topic, error = %e, "Dropping message, connect on first publish failed");
                return Ok(PublishOutcome::Dropped);
            }
        }

        if !self.transport.is_connected() {
            debug!(topic = %topic, "Dropping message, not connected");
            return Ok(PublishOutcome::Dropped);
        }

        self.transport
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| {
                error!(topic = %topic, error = %e, "Failed to publish payload");
                ClientError::Publish(e)
            })?;

        Ok(PublishOutcome::Delivered)
    }

    /// Disconnect and terminate. Further operations fail with
    /// [`ClientError::Terminated`]; repeated calls are no-ops.
    pub async fn cleanup(&self) {
        if self.state() == ConnectionState::Terminated {
            return;
        }
        self.transport.disconnect(self.cleanup_grace).await;
        self.shared.terminate();
        info!(client_id = %self.broker.client_id, "Client cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_shared_state_defaults() {
        let shared = SharedState::default();
        assert_eq!(shared.state(), ConnectionState::Unconnected);
        assert!(!shared.ever_connected.load(Ordering::SeqCst));
        assert_eq!(ConnectionState::default(), ConnectionState::Unconnected);
    }

    #[test]
    fn test_terminated_is_final() {
        let shared = SharedState::default();
        shared.terminate();
        shared.transition(ConnectionState::Connected);
        shared.mark_connected();
        assert_eq!(shared.state(), ConnectionState::Terminated);
    }

    #[test]
    fn test_handler_updates_state_and_fires_callbacks() {
        let shared = Arc::new(SharedState::default());
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        {
            let mut callbacks = shared.callbacks.write().unwrap();
            let c = connects.clone();
            callbacks.on_connect = Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            let d = disconnects.clone();
            callbacks.on_disconnect = Arc::new(move || {
                d.fetch_add(1, Ordering::SeqCst);
            });
        }
        let handler = LifecycleHandler {
            shared: Arc::downgrade(&shared),
        };

        handler.on_connect();
        assert_eq!(shared.state(), ConnectionState::Connected);
        assert!(shared.ever_connected.load(Ordering::SeqCst));

        handler.on_connection_lost(&TransportError::ConnectionLost("reset".to_string()));
        assert_eq!(shared.state(), ConnectionState::Disconnected);
        assert!(
            shared.ever_connected.load(Ordering::SeqCst),
            "ever_connected must survive a lost connection"
        );

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_outliving_manager_is_inert() {
        let shared = Arc::new(SharedState::default());
        let handler = LifecycleHandler {
            shared: Arc::downgrade(&shared),
        };
        drop(shared);

        // Must not panic
        handler.on_connect();
        handler.on_connection_lost(&TransportError::NotConnected);
    }
}
