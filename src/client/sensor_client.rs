//! Host-facing sensor client
//!
//! [`SensorClient`] combines the connection manager with envelope and status
//! construction. Every publish goes through the manager, so values and status
//! messages share the same lazy-connect and drop policy.

use super::status_publisher::StatusPublisher;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState, PublishOutcome};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{Dialect, IdGenerator, SensorValueMessage, StatusKind, UuidGenerator};
use crate::transport::mqtt::MqttTransport;
use crate::transport::{Transport, TransportError};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Sensor and status publishing client
pub struct SensorClient<T: Transport = MqttTransport> {
    manager: ConnectionManager<T>,
    ids: Arc<dyn IdGenerator>,
    status: StatusPublisher,
    entity_paths: RwLock<Vec<String>>,
}

impl SensorClient<MqttTransport> {
    /// Create a client talking to the broker named in `config`.
    ///
    /// No connection is made until [`connect`](Self::connect) or the first
    /// publish.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let transport = MqttTransport::from_config(config).map_err(|e| match e {
            TransportError::InvalidBrokerUrl(url) => ClientError::InvalidBrokerUrl(url),
            other => ClientError::Connect(other),
        })?;
        Ok(Self::with_transport(config, transport))
    }

    /// Shorthand for [`new`](Self::new) with default reconnect settings
    pub fn for_broker(
        host: &str,
        port: u16,
        client_id: &str,
        dialect: Dialect,
    ) -> ClientResult<Self> {
        let mut config = ClientConfig::new(host, port, client_id);
        config.client.dialect = dialect;
        Self::new(&config)
    }
}

impl<T: Transport> SensorClient<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Self {
        Self::with_id_generator(config, transport, Arc::new(UuidGenerator))
    }

    pub fn with_id_generator(
        config: &ClientConfig,
        transport: T,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let manager = ConnectionManager::new(config, transport);
        let status = StatusPublisher::new(config.client.dialect, ids.clone());
        Self {
            manager,
            ids,
            status,
            entity_paths: RwLock::new(config.status.entity_paths.clone()),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.manager.dialect()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn ever_connected(&self) -> bool {
        self.manager.ever_connected()
    }

    /// Replace the connect and disconnect callbacks.
    ///
    /// Both fire from the transport's background task, on every connect
    /// (including automatic reconnects) and every loss of an established
    /// connection.
    pub fn register_connection_callbacks<C, D>(&self, on_connect: C, on_disconnect: D)
    where
        C: Fn() + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        self.manager.register_callbacks(on_connect, on_disconnect);
    }

    pub async fn connect(&self) -> ClientResult<()> {
        self.manager.connect().await
    }

    /// Start an empty envelope for `entity` in this client's dialect
    pub fn new_sensor_value_message(
        &self,
        entity: impl Into<String>,
        datetime: impl Into<String>,
    ) -> SensorValueMessage {
        SensorValueMessage::new(self.dialect(), entity, datetime, self.ids.as_ref())
    }

    /// Serialize `message` and publish it on `<topic>[value]`
    pub async fn publish_value_message(
        &self,
        message: &SensorValueMessage,
    ) -> ClientResult<PublishOutcome> {
        let payload = message.to_payload()?;
        self.publish(&message.publish_topic(), payload).await
    }

    /// Publish raw bytes with the client's delivery policy
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> ClientResult<PublishOutcome> {
        self.manager.publish(topic, payload).await
    }

    pub async fn publish_running(&self, path: &str) -> ClientResult<PublishOutcome> {
        self.publish_status(path, StatusKind::Running, "").await
    }

    pub async fn publish_not_running(&self, path: &str) -> ClientResult<PublishOutcome> {
        self.publish_status(path, StatusKind::NotRunning, "").await
    }

    pub async fn publish_error(&self, path: &str, description: &str) -> ClientResult<PublishOutcome> {
        self.publish_status(path, StatusKind::Error, description).await
    }

    async fn publish_status(
        &self,
        path: &str,
        status: StatusKind,
        description: &str,
    ) -> ClientResult<PublishOutcome> {
        let outgoing = self.status.build(path, status, description)?;
        let outcome = self.publish(&outgoing.topic, outgoing.payload).await?;
        debug!(path = %path, status = %status, outcome = ?outcome, "Status published");
        Ok(outcome)
    }

    /// Replace the device paths covered by the bulk status operations
    pub fn set_entity_paths<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self
            .entity_paths
            .write()
            .unwrap_or_else(PoisonError::into_inner) =
            paths.into_iter().map(Into::into).collect();
    }

    pub fn entity_paths(&self) -> Vec<String> {
        self.entity_paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish RUNNING for every registered path
    pub async fn publish_all_running(&self) -> ClientResult<()> {
        self.publish_all(StatusKind::Running).await
    }

    /// Publish NOT_RUNNING for every registered path
    pub async fn publish_all_not_running(&self) -> ClientResult<()> {
        self.publish_all(StatusKind::NotRunning).await
    }

    /// Every path is attempted; the first failure is returned afterwards
    async fn publish_all(&self, status: StatusKind) -> ClientResult<()> {
        let mut first_error = None;
        for path in self.entity_paths() {
            if let Err(e) = self.publish_status(&path, status, "").await {
                error!(path = %path, status = %status, error = %e, "Failed to publish status");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Disconnect and release the transport. The client cannot be reused.
    pub async fn cleanup(&self) {
        self.manager.cleanup().await;
    }
}

impl<T: Transport + 'static> SensorClient<T> {
    /// Republish RUNNING for every registered path at `interval`.
    ///
    /// The first round goes out one interval after the call. The task ends
    /// once the client has been cleaned up.
    pub fn spawn_status_heartbeat(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // First tick completes immediately, skip it

            loop {
                ticker.tick().await;
                if self.connection_state() == ConnectionState::Terminated {
                    info!("Client cleaned up, stopping heartbeat");
                    break;
                }

                match self.publish_all_running().await {
                    Ok(()) => {
                        debug!(interval_ms = interval.as_millis() as u64, "Heartbeat published");
                    }
                    Err(ClientError::Terminated) => {
                        info!("Client cleaned up, stopping heartbeat");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Heartbeat: failed to publish status");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, SequentialIds};

    fn config() -> ClientConfig {
        ClientConfig::new("localhost", 1883, "unit")
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = SensorClient::new(&ClientConfig::new("", 1883, "unit"));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_for_broker_sets_dialect() {
        let client = SensorClient::for_broker("localhost", 1883, "unit", Dialect::Esp).unwrap();
        assert_eq!(client.dialect(), Dialect::Esp);
        assert_eq!(client.connection_state(), ConnectionState::Unconnected);
    }

    #[test]
    fn test_entity_paths_start_from_config() {
        let mut cfg = config();
        cfg.status.entity_paths = vec!["/a".to_string()];
        let client = SensorClient::with_transport(&cfg, MockTransport::new());
        assert_eq!(client.entity_paths(), vec!["/a".to_string()]);

        client.set_entity_paths(["/b", "/c"]);
        assert_eq!(client.entity_paths(), vec!["/b".to_string(), "/c".to_string()]);
    }

    #[test]
    fn test_new_sensor_value_message_uses_client_ids() {
        let client = SensorClient::with_id_generator(
            &config(),
            MockTransport::new(),
            Arc::new(SequentialIds::new()),
        );
        let msg = client.new_sensor_value_message("/zone1/temp", "2024-01-01T00:00:00Z");
        assert_eq!(msg.correlation_id(), "id-1");
        assert_eq!(msg.topic(), "sdw/zone1/temp");
    }

    #[tokio::test]
    async fn test_publish_all_continues_past_failures() {
        let mock = MockTransport::new();
        let observer = mock.clone();
        let client = SensorClient::with_transport(&config(), mock);
        client.connect().await.unwrap();
        client.set_entity_paths(["/a", "/b"]);

        observer.set_publish_failure(true);
        let result = client.publish_all_running().await;
        assert!(matches!(result, Err(ClientError::Publish(_))));

        observer.set_publish_failure(false);
        client.publish_all_running().await.unwrap();
        let topics: Vec<String> = observer
            .get_published_messages()
            .await
            .into_iter()
            .map(|(topic, _)| topic)
            .collect();
        assert_eq!(topics, vec!["sdw/a[status]", "sdw/b[status]"]);
    }
}
