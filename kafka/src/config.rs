//! Resolves client properties from the `kafka` configuration section.
//!
//! ```yaml
//! kafka:
//!   enabled: true
//!   config:
//!     bootstrap.servers: 'server-1:9092,server-2:9092'
//!   consumers:
//!     config:
//!       auto.offset.reset: earliest
//!     orders:
//!       group.id: orders
//!       topic: orders_topic
//!   producers:
//!     audit:
//!       client.id: audit
//!       topic: audit_topic
//! ```
//!
//! Properties for the `orders` consumer are the common `kafka.config`, then
//! `kafka.consumers.config`, then `kafka.consumers.orders`, then any
//! caller overrides, each layer replacing keys of the previous one. The
//! `topic` entry is read with [`consumer_topic`] and never reaches the client.

use crate::error::{KafkaError, Result};
use launchpad_core::ConfigTree;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

const KAFKA_SECTION: &str = "kafka";
const COMMON_SECTION: &str = "config";
const TOPIC_KEY: &str = "topic";

/// Which side of the broker a client sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Entries under `kafka.consumers`
    Consumer,
    /// Entries under `kafka.producers`
    Producer,
}

impl ClientKind {
    /// Name of the configuration section holding clients of this kind.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Consumer => "consumers",
            Self::Producer => "producers",
        }
    }

    /// Singular label used in logs and errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Consumer => "consumer",
            Self::Producer => "producer",
        }
    }
}

/// `kafka.enabled`; absent or non-boolean reads as `false`.
#[must_use]
pub fn is_kafka_enabled(config: &ConfigTree) -> bool {
    config.get_bool("/kafka/enabled")
}

/// Merged properties for the consumer `name`.
///
/// # Errors
///
/// Returns [`KafkaError::MissingConfiguration`] naming the first absent
/// section among `kafka`, `kafka.config`, `kafka.consumers` and
/// `kafka.consumers.<name>`.
pub fn consumer_config(
    name: &str,
    config: &ConfigTree,
    overrides: Option<&HashMap<String, String>>,
) -> Result<BTreeMap<String, String>> {
    client_config(ClientKind::Consumer, name, config, overrides)
}

/// Merged properties for the producer `name`.
///
/// # Errors
///
/// Returns [`KafkaError::MissingConfiguration`] naming the first absent
/// section among `kafka`, `kafka.config`, `kafka.producers` and
/// `kafka.producers.<name>`.
pub fn producer_config(
    name: &str,
    config: &ConfigTree,
    overrides: Option<&HashMap<String, String>>,
) -> Result<BTreeMap<String, String>> {
    client_config(ClientKind::Producer, name, config, overrides)
}

/// Merged properties for the client `name` of `kind`.
///
/// # Errors
///
/// Returns [`KafkaError::MissingConfiguration`] if a required section is absent.
pub fn client_config(
    kind: ClientKind,
    name: &str,
    config: &ConfigTree,
    overrides: Option<&HashMap<String, String>>,
) -> Result<BTreeMap<String, String>> {
    let kafka = object(config.as_value().as_object(), KAFKA_SECTION)
        .ok_or_else(|| missing(&[KAFKA_SECTION]))?;
    let common = object(Some(kafka), COMMON_SECTION)
        .ok_or_else(|| missing(&[KAFKA_SECTION, COMMON_SECTION]))?;
    let clients = object(Some(kafka), kind.section())
        .ok_or_else(|| missing(&[KAFKA_SECTION, kind.section()]))?;
    let named = object(Some(clients), name)
        .ok_or_else(|| missing(&[KAFKA_SECTION, kind.section(), name]))?;

    let mut properties = flatten(common);
    if let Some(shared) = object(Some(clients), COMMON_SECTION) {
        properties.extend(flatten(shared));
    }

    let mut own = flatten(named);
    own.remove(TOPIC_KEY);
    properties.extend(own);

    if let Some(overrides) = overrides {
        properties.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    tracing::debug!(
        kind = kind.label(),
        name,
        keys = ?properties.keys().collect::<Vec<_>>(),
        "Resolved Kafka client configuration"
    );

    Ok(properties)
}

/// `kafka.consumers.<name>.topic`.
///
/// # Errors
///
/// Returns [`KafkaError::MissingTopic`] if the topic is not a string.
pub fn consumer_topic(name: &str, config: &ConfigTree) -> Result<String> {
    topic(ClientKind::Consumer, name, config)
}

/// `kafka.producers.<name>.topic`.
///
/// # Errors
///
/// Returns [`KafkaError::MissingTopic`] if the topic is not a string.
pub fn producer_topic(name: &str, config: &ConfigTree) -> Result<String> {
    topic(ClientKind::Producer, name, config)
}

fn topic(kind: ClientKind, name: &str, config: &ConfigTree) -> Result<String> {
    let pointer = format!("/{KAFKA_SECTION}/{}/{}/{TOPIC_KEY}", kind.section(), escape(name));
    config
        .get_str(&pointer)
        .map(str::to_string)
        .ok_or(KafkaError::MissingTopic(pointer))
}

fn object<'a>(parent: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Map<String, Value>> {
    parent?.get(key)?.as_object()
}

fn missing(path: &[&str]) -> KafkaError {
    KafkaError::MissingConfiguration(path.join("."))
}

// RFC 6901: `~` before `/`.
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Flatten an object into client properties.
///
/// Nested objects contribute dotted keys, arrays of scalars are joined with
/// commas and nulls are dropped, so `bootstrap: { servers: [a, b] }` and
/// `bootstrap.servers: 'a,b'` resolve to the same property.
fn flatten(map: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for (key, value) in map {
        collect(key.clone(), value, &mut properties);
    }
    properties
}

fn collect(key: String, value: &Value, properties: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(inner) => {
            for (child, value) in inner {
                collect(format!("{key}.{child}"), value, properties);
            }
        }
        Value::Array(items) => {
            let joined = items.iter().filter_map(scalar).collect::<Vec<_>>().join(",");
            properties.insert(key, joined);
        }
        other => {
            if let Some(text) = scalar(other) {
                properties.insert(key, text);
            }
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
