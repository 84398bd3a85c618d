//! Pure routing of rumqttc events
//!
//! The transport only publishes, so the supervisor cares about session
//! acknowledgements and broker disconnects; everything else is logged.

use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish
    ConnectionAcknowledged,
    /// MQTT broker disconnected the session
    Disconnected,
    /// Any other incoming packet (pings, acks, inbound publishes)
    InfrastructureEvent(String),
    /// Packet written by the client
    OutgoingEvent,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Disconnect(_) => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}
