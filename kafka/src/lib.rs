//! # Launchpad Kafka
//!
//! Kafka consumer and producer factories driven by the `kafka` configuration
//! section.
//!
//! - **[`is_kafka_enabled`]**: reads `kafka.enabled`
//! - **[`consumer_config`] / [`producer_config`]**: merged client properties
//!   (see [`config`] for the layering rules)
//! - **[`create_consumer`] / [`create_producer`]**: rdkafka
//!   [`StreamConsumer`](rdkafka::consumer::StreamConsumer) and
//!   [`FutureProducer`](rdkafka::producer::FutureProducer) built from those
//!   properties
//! - **[`consumer_topic`] / [`producer_topic`]**: the `topic` of a named client
//!
//! ## Example
//!
//! ```no_run
//! use launchpad_core::ConfigTree;
//! use launchpad_kafka::{create_producer, is_kafka_enabled, producer_topic};
//! use rdkafka::producer::FutureRecord;
//! use std::time::Duration;
//!
//! # async fn run(config: ConfigTree) -> Result<(), Box<dyn std::error::Error>> {
//! if is_kafka_enabled(&config) {
//!     let producer = create_producer("audit", &config, None)?;
//!     let topic = producer_topic("audit", &config)?;
//!     producer
//!         .send(FutureRecord::to(&topic).key("k").payload("v"), Duration::from_secs(5))
//!         .await
//!         .map_err(|(e, _)| e)?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;

pub use client::{create_consumer, create_producer};
pub use config::{
    ClientKind, client_config, consumer_config, consumer_topic, is_kafka_enabled,
    producer_config, producer_topic,
};
pub use error::{KafkaError, Result};
