//! End-to-end client behavior over a mock transport
//!
//! Covers the wire contract (topics and payload shapes per dialect) and the
//! status operations as a downstream consumer would observe them.

use samqtt::config::ClientConfig;
use samqtt::connection::{ConnectionState, PublishOutcome};
use samqtt::error::ClientError;
use samqtt::protocol::Dialect;
use samqtt::testing::{MockTransport, SequentialIds};
use samqtt::SensorClient;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn client_for(dialect: Dialect, mock: &MockTransport) -> SensorClient<MockTransport> {
    let mut config = ClientConfig::new("localhost", 1883, "client-test");
    config.client.dialect = dialect;
    SensorClient::with_id_generator(&config, mock.clone(), Arc::new(SequentialIds::new()))
}

#[tokio::test]
async fn test_value_message_scenario_sdw() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);

    let mut msg = client.new_sensor_value_message("/zone1/tempSensor", "2024-01-01T00:00:00.000Z");
    msg.add_value("temperature", 21.5);
    let outcome = client.publish_value_message(&msg).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Delivered);

    let published = mock.get_published_messages().await;
    assert_eq!(published.len(), 1);
    let (topic, payload) = &published[0];
    assert_eq!(topic, "sdw/zone1/tempSensor[value]");

    let text = String::from_utf8(payload.clone()).unwrap();
    assert!(text.contains(r#""field":"temperature","amount":21.5"#));

    let body: Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(
        body,
        json!({
            "commandId": "id-1",
            "entity": "/zone1/tempSensor",
            "datetime": "2024-01-01T00:00:00.000Z",
            "values": [{"field": "temperature", "amount": 21.5}]
        })
    );
}

#[tokio::test]
async fn test_value_message_esp_shape() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Esp, &mock);

    let mut attributes = Map::new();
    attributes.insert("unit".to_string(), json!("C"));
    let mut msg = client.new_sensor_value_message("/zone1/tempSensor", "2024-01-01T00:00:00.000Z");
    msg.add_value_created("temperature", 21.5, "2024-01-01T00:00:00.000Z");
    msg.add_value_attrib_created("humidity", 40.0, attributes, "2024-01-01T00:00:00.000Z");
    client.publish_value_message(&msg).await.unwrap();

    let json = mock.get_published_json().await;
    let (topic, body) = &json[0];
    assert_eq!(topic, "esp/zone1/tempSensor[value]");
    assert_eq!(body["messageId"], "id-1");
    assert!(body.get("commandId").is_none());
    assert!(body.get("entity").is_none());

    let values = body["values"].as_array().unwrap();
    assert_eq!(values.len(), 2);
    assert!(values.iter().all(|v| v.get("created").is_none()));
    assert_eq!(values[1]["attributes"], json!({"unit": "C"}));
}

#[tokio::test]
async fn test_non_finite_amount_is_a_serialization_error() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);

    let mut msg = client.new_sensor_value_message("/zone1/tempSensor", "2024-01-01T00:00:00.000Z");
    msg.add_value("temperature", f64::NAN);
    let result = client.publish_value_message(&msg).await;

    assert!(matches!(result, Err(ClientError::Serialization(_))));
    assert!(mock.get_published_messages().await.is_empty());
    assert_eq!(mock.connect_attempts(), 0, "nothing to send, nothing to connect");
}

#[tokio::test]
async fn test_publish_error_scenario_esp() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Esp, &mock);

    client.publish_error("/zoneA", "sensor offline").await.unwrap();

    let json = mock.get_published_json().await;
    let (topic, body) = &json[0];
    assert_eq!(topic, "esp/zoneA[status]");
    assert_eq!(body["status"], "ERROR");
    assert_eq!(body["description"], "sensor offline");
    assert_eq!(body["messageId"], "id-1");
    assert!(body.get("commandId").is_none());
}

#[tokio::test]
async fn test_status_without_description_omits_key() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);

    client.publish_running("/zoneA").await.unwrap();
    client.publish_not_running("/zoneA").await.unwrap();
    client.publish_error("/zoneA", "").await.unwrap();

    let json = mock.get_published_json().await;
    let statuses: Vec<&str> = json.iter().map(|(_, b)| b["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["RUNNING", "NOT_RUNNING", "ERROR"]);
    for (topic, body) in &json {
        assert_eq!(topic, "sdw/zoneA[status]");
        assert!(body.get("description").is_none());
        assert!(body["commandId"].is_string());
    }
}

#[tokio::test]
async fn test_status_datetime_layout() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);

    client.publish_running("/zoneA").await.unwrap();

    let json = mock.get_published_json().await;
    let datetime = json[0].1["datetime"].as_str().unwrap().to_string();
    // YYYY-MM-DDTHH:MM:SS.sssZ
    assert_eq!(datetime.len(), 24);
    assert!(datetime.ends_with('Z'));
    assert_eq!(&datetime[19..20], ".");
    assert!(chrono::DateTime::parse_from_rfc3339(&datetime).is_ok());
}

#[tokio::test]
async fn test_status_dropped_when_broker_unreachable() {
    let mock = MockTransport::with_connect_failure();
    let client = client_for(Dialect::Sdw, &mock);

    let outcome = client.publish_running("/zoneA").await.unwrap();

    assert_eq!(outcome, PublishOutcome::Dropped);
    assert_eq!(client.connection_state(), ConnectionState::Unconnected);
}

#[tokio::test]
async fn test_publish_all_covers_every_path() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);
    client.set_entity_paths(["/line1", "/line2", "/line3"]);

    client.publish_all_running().await.unwrap();
    client.publish_all_not_running().await.unwrap();

    let json = mock.get_published_json().await;
    assert_eq!(json.len(), 6);
    assert_eq!(json[0].0, "sdw/line1[status]");
    assert_eq!(json[2].0, "sdw/line3[status]");
    assert_eq!(json[3].1["status"], "NOT_RUNNING");
}

#[tokio::test]
async fn test_connection_callbacks_through_facade() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);
    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    {
        let connects = connects.clone();
        let disconnects = disconnects.clone();
        client.register_connection_callbacks(
            move || {
                connects.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                disconnects.fetch_add(1, Ordering::SeqCst);
            },
        );
    }

    client.connect().await.unwrap();
    mock.simulate_connection_lost("reset");

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert!(client.ever_connected());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_heartbeat_republishes_and_stops_after_cleanup() {
    let mock = MockTransport::new();
    let client = Arc::new(client_for(Dialect::Sdw, &mock));
    client.set_entity_paths(["/line1"]);
    client.connect().await.unwrap();

    let handle = client.clone().spawn_status_heartbeat(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(110)).await;

    let sent = mock.get_published_messages().await.len();
    assert!(sent >= 2, "expected several heartbeats, got {sent}");

    client.cleanup().await;
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("heartbeat should stop after cleanup")
        .unwrap();
}

#[tokio::test]
async fn test_operations_after_cleanup_fail() {
    let mock = MockTransport::new();
    let client = client_for(Dialect::Sdw, &mock);
    client.cleanup().await;

    assert_eq!(client.connection_state(), ConnectionState::Terminated);
    assert!(matches!(
        client.publish_running("/zoneA").await,
        Err(ClientError::Terminated)
    ));
    assert!(matches!(client.connect().await, Err(ClientError::Terminated)));
}
