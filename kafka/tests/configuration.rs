//! Kafka properties resolved from loaded configuration files.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use launchpad_core::{ConfigStore, ConfigTree};
use launchpad_kafka::{consumer_config, consumer_topic, is_kafka_enabled, producer_config};
use launchpad_testing::ConfigDir;
use serde_json::json;

// ============================================================================
// Test Fixtures
// ============================================================================

const KAFKA_YAML: &str = r"
kafka:
  enabled: true
  config:
    bootstrap.servers: 'server-1:9092,server-2:9092'
    security.protocol: SSL
  consumers:
    config:
      auto.offset.reset: earliest
    orders:
      client.id: orders
      group.id: orders
      topic: orders_topic
  producers:
    audit:
      client.id: audit
      topic: audit_topic
      acks: 1
";

async fn load(overrides: serde_json::Value) -> ConfigTree {
    let dir = ConfigDir::new();
    dir.write("application.yml", KAFKA_YAML);

    dir.loader()
        .add_store(ConfigStore::json(overrides))
        .build()
        .load()
        .await
        .unwrap()
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_yaml_document_resolves_consumer() {
    let config = load(json!({})).await;

    assert!(is_kafka_enabled(&config));
    let properties = consumer_config("orders", &config, None).unwrap();
    assert_eq!(properties["bootstrap.servers"], "server-1:9092,server-2:9092");
    assert_eq!(properties["auto.offset.reset"], "earliest");
    assert_eq!(properties["group.id"], "orders");
    assert_eq!(consumer_topic("orders", &config).unwrap(), "orders_topic");
}

#[tokio::test]
async fn test_later_store_overrides_client_setting() {
    let config = load(json!({
        "kafka": { "producers": { "audit": { "acks": "all" } } }
    }))
    .await;

    let properties = producer_config("audit", &config, None).unwrap();
    assert_eq!(properties["acks"], "all");
    assert_eq!(properties["client.id"], "audit");
    assert_eq!(properties["security.protocol"], "SSL");
}
