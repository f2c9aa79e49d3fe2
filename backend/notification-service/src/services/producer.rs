//! Notification event publishing
//!
//! [`EventProducer`] is what backend services call to hand an event to the
//! pipeline. Publishing is synchronous from the caller's point of view and
//! never buffers or retries: a refused write comes straight back as
//! [`PublishError::BrokerUnavailable`].

use super::event_log::{EventSink, PublishError};
use crate::config::KafkaConfig;
use async_trait::async_trait;
use event_schema::NotificationEvent;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Publishes notification events to the event log
#[derive(Clone)]
pub struct EventProducer {
    sink: Arc<dyn EventSink>,
}

impl EventProducer {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Encode `event` and append it under the recipient's partition key.
    pub async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        let payload = event.to_payload()?;
        let key = event.partition_key();

        match self.sink.append(&key, &payload).await {
            Ok(()) => {
                debug!(
                    user_id = event.user_id,
                    task_id = event.task_id,
                    event_type = %event.event_type,
                    "Notification event published"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    user_id = event.user_id,
                    task_id = event.task_id,
                    error = %e,
                    "Failed to publish notification event"
                );
                Err(e)
            }
        }
    }
}

// ============================================================================
// Kafka sink
// ============================================================================

/// Kafka-backed [`EventSink`] writing to a single topic
pub struct KafkaEventSink {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaEventSink {
    /// Create the producer. No connection is made until the first send or
    /// [`KafkaEventSink::check_connectivity`].
    ///
    /// - `acks = all`: a publish succeeds only once the write is replicated
    /// - `enable.idempotence = true`: client-side resends do not duplicate
    /// - `message.timeout.ms`: bounded by the configured publish timeout so a
    ///   dead broker surfaces as an error instead of an indefinite wait
    pub fn new(config: &KafkaConfig) -> Result<Self, PublishError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.publish_timeout_ms.to_string())
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("linger.ms", "5")
            .create::<FutureProducer>()
            .map_err(|e| PublishError::BrokerUnavailable(e.to_string()))?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            send_timeout: config.publish_timeout(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Fetch topic metadata to prove a broker is reachable.
    pub async fn check_connectivity(&self, timeout: Duration) -> Result<(), PublishError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();

        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map(|_| ())
                .map_err(|e| PublishError::BrokerUnavailable(e.to_string()))
        })
        .await
        .map_err(|e| PublishError::BrokerUnavailable(e.to_string()))?
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn append(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        self.producer
            .send(record, self.send_timeout)
            .await
            .map(|(partition, offset)| {
                debug!(topic = %self.topic, partition, offset, "Kafka record delivered");
            })
            .map_err(|(err, _)| PublishError::BrokerUnavailable(err.to_string()))
    }
}
