//! Error types for Kafka client configuration.

use thiserror::Error;

/// Errors resolving Kafka configuration or creating a client.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// A required configuration section is absent.
    ///
    /// The payload is the dotted path of the missing section, e.g.
    /// `kafka.consumers.orders`.
    #[error("Kafka configuration does not exist '{0}'.")]
    MissingConfiguration(String),

    /// The named client has no `topic` setting.
    ///
    /// The payload is the JSON pointer that was read.
    #[error("Kafka configuration for topic '{0}' does not exist.")]
    MissingTopic(String),

    /// librdkafka rejected the merged configuration.
    #[error("Failed to create Kafka {kind}")]
    Client {
        /// `consumer` or `producer`
        kind: &'static str,
        /// Underlying client error
        #[source]
        source: rdkafka::error::KafkaError,
    },
}

/// Result type alias for Kafka operations.
pub type Result<T> = std::result::Result<T, KafkaError>;
