//! Creates rdkafka clients from resolved properties.

use crate::config::{ClientKind, client_config};
use crate::error::{KafkaError, Result};
use launchpad_core::ConfigTree;
use rdkafka::config::{ClientConfig, FromClientConfig};
use rdkafka::consumer::StreamConsumer;
use rdkafka::producer::FutureProducer;
use std::collections::{BTreeMap, HashMap};

/// Create the consumer `name` from configuration.
///
/// The consumer is not subscribed; read its topic with
/// [`consumer_topic`](crate::consumer_topic).
///
/// # Errors
///
/// Returns [`KafkaError::MissingConfiguration`] if a section is absent, or
/// [`KafkaError::Client`] if librdkafka rejects the properties.
///
/// # Example
///
/// ```no_run
/// use launchpad_core::ConfigTree;
/// use launchpad_kafka::{consumer_topic, create_consumer};
/// use rdkafka::consumer::Consumer;
///
/// # fn run(config: &ConfigTree) -> Result<(), Box<dyn std::error::Error>> {
/// let consumer = create_consumer("orders", config, None)?;
/// let topic = consumer_topic("orders", config)?;
/// consumer.subscribe(&[topic.as_str()])?;
/// # Ok(())
/// # }
/// ```
pub fn create_consumer(
    name: &str,
    config: &ConfigTree,
    overrides: Option<&HashMap<String, String>>,
) -> Result<StreamConsumer> {
    create(ClientKind::Consumer, name, config, overrides)
}

/// Create the producer `name` from configuration.
///
/// # Errors
///
/// Returns [`KafkaError::MissingConfiguration`] if a section is absent, or
/// [`KafkaError::Client`] if librdkafka rejects the properties.
pub fn create_producer(
    name: &str,
    config: &ConfigTree,
    overrides: Option<&HashMap<String, String>>,
) -> Result<FutureProducer> {
    create(ClientKind::Producer, name, config, overrides)
}

fn create<C: FromClientConfig>(
    kind: ClientKind,
    name: &str,
    config: &ConfigTree,
    overrides: Option<&HashMap<String, String>>,
) -> Result<C> {
    let properties = client_config(kind, name, config, overrides)?;
    let client = to_client_config(&properties)
        .create()
        .map_err(|source| KafkaError::Client {
            kind: kind.label(),
            source,
        })?;

    tracing::info!(
        kind = kind.label(),
        name,
        brokers = properties.get("bootstrap.servers").map_or("", String::as_str),
        "Kafka client created"
    );

    Ok(client)
}

fn to_client_config(properties: &BTreeMap<String, String>) -> ClientConfig {
    let mut client = ClientConfig::new();
    for (key, value) in properties {
        client.set(key, value);
    }
    client
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rdkafka::producer::Producer;
    use serde_json::json;

    fn config() -> ConfigTree {
        ConfigTree::new(json!({
            "kafka": {
                "config": { "bootstrap.servers": "localhost:9092" },
                "consumers": {
                    "orders": { "group.id": "orders", "topic": "orders_topic" }
                },
                "producers": {
                    "audit": { "client.id": "audit", "topic": "audit_topic" },
                    "broken": { "no.such.property": "1" }
                }
            }
        }))
    }

    #[test]
    fn test_client_config_carries_every_property() {
        let properties = BTreeMap::from([
            ("bootstrap.servers".to_string(), "localhost:9092".to_string()),
            ("group.id".to_string(), "orders".to_string()),
        ]);
        let client = to_client_config(&properties);

        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("group.id"), Some("orders"));
    }

    // Client creation does not contact the brokers.
    #[tokio::test]
    async fn test_create_producer() {
        let producer = create_producer("audit", &config(), None).unwrap();
        assert_eq!(producer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_create_consumer() {
        assert!(create_consumer("orders", &config(), None).is_ok());
    }

    #[tokio::test]
    async fn test_rejected_property_is_a_client_error() {
        let error = create_producer("broken", &config(), None).unwrap_err();
        assert!(matches!(error, KafkaError::Client { kind: "producer", .. }));
    }

    #[test]
    fn test_missing_client_fails_before_creation() {
        let error = create_consumer("billing", &config(), None).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Kafka configuration does not exist 'kafka.consumers.billing'."
        );
    }
}
