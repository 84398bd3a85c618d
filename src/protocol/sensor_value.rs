//! Sensor value envelopes
//!
//! A [`SensorValueMessage`] is one outbound telemetry message: a correlation
//! id, the entity it describes, a caller supplied timestamp and an ordered
//! list of value records. It is built once, filled through the `add_value*`
//! methods and then rendered to JSON with [`SensorValueMessage::to_payload`].
//!
//! The JSON shape depends on the [`Dialect`]:
//!
//! ```text
//! sdw: {"commandId":..,"entity":..,"datetime":..,"values":[{"field":..,"amount":..,"attributes"?:..,"created"?:..}]}
//! esp: {"messageId":..,"datetime":..,"values":[{"field":..,"amount":..,"attributes"?:..}]}
//! ```
//!
//! Fields are emitted in exactly that order.
//!
//! # Examples
//! ```
//! use samqtt::protocol::{Dialect, SensorValueMessage};
//!
//! let mut message = SensorValueMessage::with_id(
//!     Dialect::Sdw,
//!     "/zone1/tempSensor",
//!     "2024-01-01T00:00:00.000Z",
//!     "3f1c2a",
//! );
//! message.add_value("temperature", 21.5);
//!
//! assert_eq!(message.publish_topic(), "sdw/zone1/tempSensor[value]");
//! let json = String::from_utf8(message.to_payload().unwrap()).unwrap();
//! assert!(json.contains(r#""field":"temperature","amount":21.5"#));
//! ```

use super::dialect::Dialect;
use super::ids::IdGenerator;
use super::topics::TopicBuilder;
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Free-form attributes attached to a single value record
pub type Attributes = serde_json::Map<String, Value>;

/// One measured value inside a sensor value envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub field: String,
    pub amount: f64,
    pub attributes: Option<Attributes>,
    /// Only ever set for dialects that support it
    pub created: Option<String>,
}

impl Serialize for ValueRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // serde_json would quietly write NaN/inf as null
        if !self.amount.is_finite() {
            return Err(S::Error::custom(format!(
                "amount of field '{}' is not a finite number ({})",
                self.field, self.amount
            )));
        }

        let len = 2 + usize::from(self.attributes.is_some()) + usize::from(self.created.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("field", &self.field)?;
        map.serialize_entry("amount", &self.amount)?;
        if let Some(attributes) = &self.attributes {
            map.serialize_entry("attributes", attributes)?;
        }
        if let Some(created) = &self.created {
            map.serialize_entry("created", created)?;
        }
        map.end()
    }
}

/// Outbound telemetry envelope for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SensorValueMessage {
    dialect: Dialect,
    topic: String,
    correlation_id: String,
    entity: String,
    datetime: String,
    values: Vec<ValueRecord>,
}

impl SensorValueMessage {
    /// Create an empty envelope with a freshly generated correlation id
    pub fn new(
        dialect: Dialect,
        entity: impl Into<String>,
        datetime: impl Into<String>,
        ids: &dyn IdGenerator,
    ) -> Self {
        Self::with_id(dialect, entity, datetime, ids.new_id())
    }

    /// Create an empty envelope with a caller chosen correlation id
    pub fn with_id(
        dialect: Dialect,
        entity: impl Into<String>,
        datetime: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let entity = entity.into();
        Self {
            dialect,
            topic: TopicBuilder::entity_topic(dialect, &entity),
            correlation_id: correlation_id.into(),
            entity,
            datetime: datetime.into(),
            values: Vec::with_capacity(10),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Base topic, `<prefix><entity>`
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Topic the envelope is published on, `<prefix><entity>[value]`
    pub fn publish_topic(&self) -> String {
        TopicBuilder::value_topic_from_base(&self.topic)
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn datetime(&self) -> &str {
        &self.datetime
    }

    pub fn values(&self) -> &[ValueRecord] {
        &self.values
    }

    /// Append a plain value
    pub fn add_value(&mut self, field: impl Into<String>, amount: f64) {
        self.push(field.into(), amount, None, None);
    }

    /// Append a value with attributes
    pub fn add_value_attrib(
        &mut self,
        field: impl Into<String>,
        amount: f64,
        attributes: Attributes,
    ) {
        self.push(field.into(), amount, Some(attributes), None);
    }

    /// Append a value with a creation time.
    ///
    /// `esp` envelopes do not carry creation times; there the timestamp is
    /// dropped and a plain value is appended.
    pub fn add_value_created(
        &mut self,
        field: impl Into<String>,
        amount: f64,
        created: impl Into<String>,
    ) {
        self.push(field.into(), amount, None, Some(created.into()));
    }

    /// Append a value with attributes and a creation time (same `esp` rule
    /// as [`add_value_created`](Self::add_value_created))
    pub fn add_value_attrib_created(
        &mut self,
        field: impl Into<String>,
        amount: f64,
        attributes: Attributes,
        created: impl Into<String>,
    ) {
        self.push(field.into(), amount, Some(attributes), Some(created.into()));
    }

    fn push(
        &mut self,
        field: String,
        amount: f64,
        attributes: Option<Attributes>,
        created: Option<String>,
    ) {
        let created = created.filter(|_| self.dialect.supports_created());
        self.values.push(ValueRecord {
            field,
            amount,
            attributes,
            created,
        });
    }

    /// Render the payload as compact JSON bytes.
    ///
    /// Fails when a value cannot be represented in JSON, e.g. a NaN amount.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Serialize for SensorValueMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let include_entity = self.dialect.includes_entity();
        let mut map = serializer.serialize_map(Some(if include_entity { 4 } else { 3 }))?;
        map.serialize_entry(self.dialect.correlation_field(), &self.correlation_id)?;
        if include_entity {
            map.serialize_entry("entity", &self.entity)?;
        }
        map.serialize_entry("datetime", &self.datetime)?;
        map.serialize_entry("values", &self.values)?;
        map.end()
    }
}
