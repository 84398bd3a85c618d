//! Impure I/O operations for the MQTT transport
//!
//! This module owns the rumqttc client and runs its event loop on a spawned
//! supervisor task. The supervisor confirms sessions, reports connection
//! events and reconnects with backoff once a session has been acknowledged.

use super::connection::{configure_mqtt_options, LinkState, ReconnectPolicy};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::ClientConfig;
use crate::transport::{Transport, TransportError, TransportEvents};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop, MqttOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the request channel between client handle and event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Default bound on the initial handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single publish
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(25);

/// Running supervisor task and its shutdown signal
struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SupervisorHandle {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the supervisor, giving it up to `grace` to exit.
    ///
    /// With `drain` set the event loop keeps running during the grace period
    /// so queued packets (e.g. DISCONNECT) reach the broker.
    async fn stop(mut self, grace: Duration, drain: bool) {
        if !drain {
            let _ = self.shutdown_tx.send(true);
        }

        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => debug!("MQTT supervisor shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT supervisor ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                let _ = self.shutdown_tx.send(true);
                debug!("MQTT supervisor still running after grace period, aborting");
                self.handle.abort();
            }
        }
    }
}

/// rumqttc-backed [`Transport`]
pub struct MqttTransport {
    client_id: String,
    options: MqttOptions,
    client: Arc<Mutex<Option<AsyncClient>>>,
    state_tx: Arc<watch::Sender<LinkState>>,
    state_rx: watch::Receiver<LinkState>,
    supervisor: Mutex<Option<SupervisorHandle>>,
    handler: Option<Arc<dyn TransportEvents>>,
    reconnect_policy: ReconnectPolicy,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl MqttTransport {
    /// Create a transport for `broker_url` (`tcp://host:port`). Nothing is
    /// sent until [`connect`](Self::connect) is called.
    pub fn new(client_id: &str, broker_url: &str) -> Result<Self, TransportError> {
        let options = configure_mqtt_options(client_id, broker_url)?;
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);

        Ok(Self {
            client_id: client_id.to_string(),
            options,
            client: Arc::new(Mutex::new(None)),
            state_tx: Arc::new(state_tx),
            state_rx,
            supervisor: Mutex::new(None),
            handler: None,
            reconnect_policy: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Create a transport from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut transport = Self::new(&config.broker.client_id, &config.broker.broker_url())?;
        transport.reconnect_policy = config.reconnect.policy();
        transport.connect_timeout = config.reconnect.connect_timeout();
        transport.write_timeout = config.reconnect.write_timeout();
        Ok(transport)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect_policy
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Current link state
    pub fn link_state(&self) -> LinkState {
        self.state_rx.borrow().clone()
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<LinkState>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let wait = async {
            loop {
                let decision = match &*state_rx.borrow_and_update() {
                    LinkState::Connected => Some(Ok(())),
                    LinkState::Failed(reason) => {
                        Some(Err(TransportError::connect_failed(reason.clone())))
                    }
                    LinkState::Closing | LinkState::Closed => Some(Err(
                        TransportError::connect_failed("Transport closed while connecting"),
                    )),
                    _ => None,
                };
                if let Some(result) = decision {
                    return result;
                }
                if state_rx.changed().await.is_err() {
                    return Err(TransportError::connect_failed("State channel closed"));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout {
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    /// Connect to the broker and wait for the session acknowledgement.
    ///
    /// When a supervisor from an earlier session is still reconnecting in the
    /// background this waits on it instead of starting a second one.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let mut supervisor = self.supervisor.lock().await;
        let fresh = !supervisor.as_ref().is_some_and(SupervisorHandle::is_running);
        if fresh {
            if let Some(stale) = supervisor.take() {
                stale.stop(Duration::ZERO, false).await;
            }

            let (client, event_loop) =
                AsyncClient::new(self.options.clone(), REQUEST_CHANNEL_CAPACITY);
            *self.client.lock().await = Some(client);
            self.state_tx.send_replace(LinkState::Connecting);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = Supervisor {
                client_id: self.client_id.clone(),
                event_loop,
                state_tx: self.state_tx.clone(),
                shutdown_rx,
                handler: self.handler.clone(),
                policy: self.reconnect_policy.clone(),
            };
            *supervisor = Some(SupervisorHandle {
                shutdown_tx,
                handle: tokio::spawn(task.run()),
            });
            info!(client_id = %self.client_id, "Connecting to MQTT broker");
        }
        drop(supervisor);

        let result =
            Self::wait_for_connection_confirmation(self.state_rx.clone(), self.connect_timeout)
                .await;

        if result.is_err() && fresh {
            if let Some(failed) = self.supervisor.lock().await.take() {
                failed.stop(Duration::ZERO, false).await;
            }
            self.state_tx.send_if_modified(|state| {
                if matches!(state, LinkState::Connecting) {
                    *state = LinkState::Failed("Connect timed out".to_string());
                    true
                } else {
                    false
                }
            });
        }
        result
    }

    /// Publish one message, bounded by the write timeout
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let size = payload.len();
        match tokio::time::timeout(self.write_timeout, client.publish(topic, qos, retain, payload))
            .await
        {
            Ok(Ok(())) => {
                debug!(target: "mqtt_transport", topic = %topic, bytes = size, "Published message");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::PublishFailed(Box::new(e))),
            Err(_) => Err(TransportError::WriteTimeout {
                millis: self.write_timeout.as_millis() as u64,
            }),
        }
    }

    /// Disconnect from the broker, waiting up to `grace` for in-flight work
    pub async fn disconnect(&self, grace: Duration) {
        let previous = self.state_tx.send_replace(LinkState::Closing);
        let mut drain = false;

        if let Some(client) = self.client.lock().await.take() {
            if HealthMonitor::can_publish(&previous) {
                match tokio::time::timeout(grace, client.disconnect()).await {
                    Ok(Ok(())) => drain = true,
                    Ok(Err(e)) => warn!("Failed to send MQTT disconnect: {}", e),
                    Err(_) => warn!("Timed out sending MQTT disconnect"),
                }
            }
        }

        if let Some(supervisor) = self.supervisor.lock().await.take() {
            supervisor.stop(grace, drain).await;
        }

        self.state_tx.send_replace(LinkState::Closed);
        info!(client_id = %self.client_id, "MQTT transport disconnected");
    }
}

/// Event loop supervisor running on its own task
struct Supervisor {
    client_id: String,
    event_loop: EventLoop,
    state_tx: Arc<watch::Sender<LinkState>>,
    shutdown_rx: watch::Receiver<bool>,
    handler: Option<Arc<dyn TransportEvents>>,
    policy: ReconnectPolicy,
}

impl Supervisor {
    async fn run(mut self) {
        info!(client_id = %self.client_id, "Starting MQTT event loop supervisor");
        let mut confirmed = false;
        let mut attempts = 0u32;

        loop {
            let polled = tokio::select! {
                // Check for shutdown signal first (higher priority)
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT supervisor");
                        break;
                    }
                    continue;
                }
                polled = self.event_loop.poll() => polled,
            };

            let keep_running = match polled {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        confirmed = true;
                        attempts = 0;
                        self.transition(HealthMonitor::determine_next_state(
                            ConnectionEvent::ConnAckReceived,
                        ));
                        if let Some(handler) = &self.handler {
                            handler.on_connect();
                        }
                        true
                    }
                    EventRoute::Disconnected => {
                        self.handle_drop(ConnectionEvent::DisconnectedByBroker, confirmed, &mut attempts)
                            .await
                    }
                    EventRoute::InfrastructureEvent(event) => {
                        tracing::trace!(target: "mqtt_transport", "MQTT event: {}", event);
                        true
                    }
                    EventRoute::OutgoingEvent => true,
                },
                Err(e) => {
                    self.handle_drop(ConnectionEvent::NetworkError(e.to_string()), confirmed, &mut attempts)
                        .await
                }
            };

            if !keep_running {
                break;
            }
        }
        info!(client_id = %self.client_id, "MQTT event loop supervisor stopped");
    }

    fn transition(&self, next: LinkState) {
        let previous = self.state_tx.send_replace(next.clone());
        HealthMonitor::log_state_transition(&previous, &next);
    }

    /// React to a dropped connection. Returns true to keep polling (after the
    /// backoff delay), false to stop the supervisor.
    async fn handle_drop(
        &mut self,
        event: ConnectionEvent,
        confirmed: bool,
        attempts: &mut u32,
    ) -> bool {
        let previous = self.state_tx.borrow().clone();
        if HealthMonitor::is_closing(&previous) {
            return false;
        }

        let reason = match &event {
            ConnectionEvent::NetworkError(reason) => reason.clone(),
            _ => "Broker disconnected".to_string(),
        };

        if confirmed && HealthMonitor::is_connection_loss(&previous) {
            self.transition(HealthMonitor::determine_next_state(event));
            if let Some(handler) = &self.handler {
                handler.on_connection_lost(&TransportError::ConnectionLost(reason.clone()));
            }
        }

        let decision = HealthMonitor::should_attempt_reconnection(
            *attempts,
            &self.policy,
            confirmed,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay } => {
                *attempts = attempt;
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::ReconnectionStarted(attempt),
                ));
                info!(
                    "Attempting MQTT reconnection {} after {}ms delay",
                    attempt,
                    delay.as_millis()
                );

                // Sleep with shutdown monitoring
                interruptible_sleep(self.shutdown_rx.clone(), delay).await
                    && !*self.shutdown_rx.borrow()
            }
            ReconnectionDecision::AbortNeverConnected => {
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::HandshakeFailed(reason),
                ));
                false
            }
            ReconnectionDecision::AbortDisabled => {
                info!("Automatic reconnection disabled, stopping MQTT supervisor");
                false
            }
            ReconnectionDecision::AbortShutdownRequested => false,
        }
    }
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        MqttTransport::connect(self).await
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        MqttTransport::publish(self, topic, qos, retain, payload).await
    }

    fn is_connected(&self) -> bool {
        HealthMonitor::can_publish(&self.state_rx.borrow())
    }

    async fn disconnect(&self, grace: Duration) {
        MqttTransport::disconnect(self, grace).await
    }

    fn set_event_handler(&mut self, handler: Arc<dyn TransportEvents>) {
        self.handler = Some(handler);
    }

    fn set_auto_reconnect(&mut self, enabled: bool, max_interval: Duration) {
        self.reconnect_policy.auto_reconnect = enabled;
        self.reconnect_policy.max_interval = max_interval;
    }

    fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        // Async disconnect is impossible here; only stop the background task
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            let _ = supervisor.shutdown_tx.send(true);
            supervisor.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_channel() -> (watch::Sender<LinkState>, watch::Receiver<LinkState>) {
        watch::channel(LinkState::Connecting)
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let (state_tx, state_rx) = state_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(LinkState::Connected);
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let result =
            MqttTransport::wait_for_connection_confirmation(state_rx, Duration::from_secs(1)).await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test]
    async fn test_wait_sees_state_set_before_waiting() {
        let (state_tx, state_rx) = state_channel();
        state_tx.send(LinkState::Connected).unwrap();

        let result =
            MqttTransport::wait_for_connection_confirmation(state_rx, Duration::from_millis(10))
                .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        // Keep state_tx alive so the channel doesn't close
        let (_state_tx, state_rx) = state_channel();

        let result =
            MqttTransport::wait_for_connection_confirmation(state_rx, Duration::from_millis(10))
                .await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectTimeout { millis: 10 })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_failed() {
        let (state_tx, state_rx) = state_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(LinkState::Failed("Connection refused".to_string()));
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let result =
            MqttTransport::wait_for_connection_confirmation(state_rx, Duration::from_secs(1)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed(_)));
        assert!(err.to_string().contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_wait_keeps_waiting_through_reconnects() {
        let (state_tx, state_rx) = state_channel();

        tokio::spawn(async move {
            let _ = state_tx.send(LinkState::Lost("reset".to_string()));
            let _ = state_tx.send(LinkState::Reconnecting(1));
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(LinkState::Connected);
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let result =
            MqttTransport::wait_for_connection_confirmation(state_rx, Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(interruptible_sleep(shutdown_rx, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = shutdown_tx.send(true);
        });

        assert!(!interruptible_sleep(shutdown_rx, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_new_transport_is_idle() {
        let transport = MqttTransport::new("test-client", "tcp://localhost:1883").unwrap();
        assert_eq!(transport.link_state(), LinkState::Idle);
        assert!(!Transport::is_connected(&transport));
        assert_eq!(transport.write_timeout(), DEFAULT_WRITE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_invalid_broker_url_rejected() {
        let result = MqttTransport::new("test-client", "not a url");
        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_trait_setters() {
        let mut transport = MqttTransport::new("test-client", "tcp://localhost:1883").unwrap();
        transport.set_auto_reconnect(false, Duration::from_secs(9));
        transport.set_write_timeout(Duration::from_millis(40));

        assert!(!transport.reconnect_policy().auto_reconnect);
        assert_eq!(transport.reconnect_policy().max_interval, Duration::from_secs(9));
        assert_eq!(transport.write_timeout(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_publish_fails_without_connection() {
        let transport = MqttTransport::new("test-client", "tcp://localhost:1883").unwrap();
        let result = transport
            .publish("sdw/a[status]", QoS::AtMostOnce, false, b"{}".to_vec())
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let transport = MqttTransport::new("test-client", "tcp://localhost:1883").unwrap();
        transport.disconnect(Duration::from_millis(10)).await;
        assert_eq!(transport.link_state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Nothing listens on port 1 of the loopback interface
        let transport = MqttTransport::new("test-client", "tcp://127.0.0.1:1")
            .unwrap()
            .with_connect_timeout(Duration::from_secs(5));

        let result = transport.connect().await;
        assert!(result.is_err(), "connect to a closed port must fail");
        assert!(!Transport::is_connected(&transport));
        assert!(matches!(transport.link_state(), LinkState::Failed(_)));
    }
}
