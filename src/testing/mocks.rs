//! Mock implementations for testing
//!
//! [`MockTransport`] is cloneable and every clone shares the same recorded
//! state, so a test can hand one clone to a client and keep another to
//! inspect and drive it.

use crate::protocol::IdGenerator;
use crate::transport::{Transport, TransportError, TransportEvents};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;

pub type PublishedMessage = (String, Vec<u8>);

/// Scriptable in-memory transport
#[derive(Clone, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub published_qos: Arc<Mutex<Vec<(QoS, bool)>>>,
    pub connect_attempts: Arc<AtomicUsize>,
    pub connected: Arc<AtomicBool>,
    pub fail_connect: Arc<AtomicBool>,
    pub fail_publish: Arc<AtomicBool>,
    pub disconnect_calls: Arc<StdMutex<Vec<Duration>>>,
    pub auto_reconnect: Arc<StdMutex<Option<(bool, Duration)>>>,
    pub write_timeout: Arc<StdMutex<Option<Duration>>>,
    handler: Arc<StdMutex<Option<Arc<dyn TransportEvents>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose connect attempts fail until told otherwise
    pub fn with_connect_failure() -> Self {
        let mock = Self::default();
        mock.set_connect_failure(true);
        mock
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    /// Published payloads parsed as JSON, in publish order
    pub async fn get_published_json(&self) -> Vec<(String, serde_json::Value)> {
        self.published_messages
            .lock()
            .await
            .iter()
            .map(|(topic, payload)| {
                let value = serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null);
                (topic.clone(), value)
            })
            .collect()
    }

    pub async fn get_published_qos(&self) -> Vec<(QoS, bool)> {
        self.published_qos.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
        self.published_qos.lock().await.clear();
    }

    pub fn disconnect_calls(&self) -> Vec<Duration> {
        lock(&self.disconnect_calls).clone()
    }

    pub fn auto_reconnect_setting(&self) -> Option<(bool, Duration)> {
        *lock(&self.auto_reconnect)
    }

    pub fn write_timeout_setting(&self) -> Option<Duration> {
        *lock(&self.write_timeout)
    }

    pub fn has_event_handler(&self) -> bool {
        lock(&self.handler).is_some()
    }

    fn handler(&self) -> Option<Arc<dyn TransportEvents>> {
        lock(&self.handler).clone()
    }

    /// Drop the link as if the broker went away
    pub fn simulate_connection_lost(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handler) = self.handler() {
            handler.on_connection_lost(&TransportError::ConnectionLost(reason.to_string()));
        }
    }

    /// Restore the link as if background reconnection succeeded
    pub fn simulate_reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        if let Some(handler) = self.handler() {
            handler.on_connect();
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::connect_failed("Mock connection failure"));
        }

        if !self.connected.swap(true, Ordering::SeqCst) {
            if let Some(handler) = self.handler() {
                handler.on_connect();
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::publish_failed("Mock publish failure"));
        }

        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        self.published_qos.lock().await.push((qos, retain));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self, grace: Duration) {
        lock(&self.disconnect_calls).push(grace);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn set_event_handler(&mut self, handler: Arc<dyn TransportEvents>) {
        *lock(&self.handler) = Some(handler);
    }

    fn set_auto_reconnect(&mut self, enabled: bool, max_interval: Duration) {
        *lock(&self.auto_reconnect) = Some((enabled, max_interval));
    }

    fn set_write_timeout(&mut self, timeout: Duration) {
        *lock(&self.write_timeout) = Some(timeout);
    }
}

/// Deterministic ids `id-1`, `id-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("id-{n}")
    }
}
