/// Notification consumer for the task event pipeline
///
/// One worker per partition runs a strictly sequential loop:
///
/// ```text
/// Idle -> Reading -> Decoding -> Persisting -> Idle
/// ```
///
/// Delivery policy:
/// 1. Reading blocks until the next record is available; the worker does
///    nothing else while waiting.
/// 2. A record that fails to decode is logged and skipped for good.
/// 3. A record that fails to persist is logged and skipped as well. A store
///    outage therefore loses the notifications consumed during it; there is
///    no retry and no dead-letter queue.
/// 4. The offset is committed only after the decode/persist attempt, so a
///    crash between read and persist replays the record on restart
///    (at-least-once).
use super::event_log::{EventSource, LogError, LogRecord};
use crate::config::KafkaConfig;
use crate::metrics;
use crate::models::NewNotification;
use crate::store::NotificationStore;
use async_trait::async_trait;
use chrono::Utc;
use event_schema::NotificationEvent;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Pause after a failed read so a broken connection does not spin the worker
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Where the worker is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Reading,
    Decoding,
    Persisting,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConsumerState::Idle => write!(f, "idle"),
            ConsumerState::Reading => write!(f, "reading"),
            ConsumerState::Decoding => write!(f, "decoding"),
            ConsumerState::Persisting => write!(f, "persisting"),
        }
    }
}

/// Per-record failures. None of these stop the worker.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("failed to read from event log: {0}")]
    Read(#[from] LogError),

    #[error("failed to decode record at partition {partition} offset {offset}: {reason}")]
    DecodeFailure {
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("failed to persist record at partition {partition} offset {offset}: {reason}")]
    PersistFailure {
        partition: i32,
        offset: i64,
        reason: String,
    },
}

impl ConsumeError {
    fn outcome_label(&self) -> &'static str {
        match self {
            ConsumeError::Read(_) => "read_error",
            ConsumeError::DecodeFailure { .. } => "decode_failure",
            ConsumeError::PersistFailure { .. } => "persist_failure",
        }
    }
}

/// Sequential consumer turning log records into stored notifications
pub struct EventConsumer<S> {
    source: S,
    store: Arc<dyn NotificationStore>,
    state: ConsumerState,
}

impl<S: EventSource> EventConsumer<S> {
    pub fn new(source: S, store: Arc<dyn NotificationStore>) -> Self {
        Self {
            source,
            store,
            state: ConsumerState::Idle,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Run one full cycle for the next record.
    ///
    /// Returns the id of the stored notification. Decode and persist failures
    /// are returned after the record's offset has been committed.
    pub async fn process_next(&mut self) -> Result<i64, ConsumeError> {
        self.state = ConsumerState::Reading;
        let record = match self.source.next_record().await {
            Ok(record) => record,
            Err(e) => {
                self.state = ConsumerState::Idle;
                return Err(e.into());
            }
        };

        let outcome = self.handle_record(&record).await;

        if let Err(e) = self.source.commit(&record).await {
            // The record will be seen again after a restart.
            warn!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Failed to commit consumer offset"
            );
        }

        self.state = ConsumerState::Idle;
        outcome
    }

    async fn handle_record(&mut self, record: &LogRecord) -> Result<i64, ConsumeError> {
        self.state = ConsumerState::Decoding;
        let event = NotificationEvent::from_payload(&record.payload).map_err(|e| {
            ConsumeError::DecodeFailure {
                partition: record.partition,
                offset: record.offset,
                reason: e.to_string(),
            }
        })?;

        self.state = ConsumerState::Persisting;
        let notification = NewNotification::from_event(&event, Utc::now());
        self.store
            .insert(notification)
            .await
            .map_err(|e| ConsumeError::PersistFailure {
                partition: record.partition,
                offset: record.offset,
                reason: e.to_string(),
            })
    }

    /// Consume forever. Only process termination stops the loop.
    pub async fn run(mut self) {
        info!("Notification consumer started");

        loop {
            match self.process_next().await {
                Ok(notification_id) => {
                    metrics::record_consumer_outcome("persisted");
                    debug!(notification_id, "Notification persisted from event");
                }
                Err(e @ ConsumeError::Read(_)) => {
                    metrics::record_consumer_outcome(e.outcome_label());
                    warn!(error = %e, "Event log read failed");
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
                Err(e @ ConsumeError::DecodeFailure { .. }) => {
                    metrics::record_consumer_outcome(e.outcome_label());
                    warn!(error = %e, "Skipping malformed notification event");
                }
                Err(e @ ConsumeError::PersistFailure { .. }) => {
                    metrics::record_consumer_outcome(e.outcome_label());
                    error!(error = %e, "Dropping notification event after store failure");
                }
            }
        }
    }
}

// ============================================================================
// Kafka source
// ============================================================================

/// Kafka-backed [`EventSource`] for the notification topic.
///
/// Joins the configured consumer group with auto-commit disabled; offsets are
/// committed by [`EventConsumer`] after each record.
pub struct KafkaEventSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaEventSource {
    pub fn new(config: &KafkaConfig) -> Result<Self, LogError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()
            .map_err(|e| LogError::Read(format!("failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| LogError::Read(format!("failed to subscribe to {}: {e}", config.topic)))?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    async fn next_record(&mut self) -> Result<LogRecord, LogError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| LogError::Read(e.to_string()))?;

        Ok(LogRecord {
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| LogError::Commit(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| LogError::Commit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_log::InMemoryEventLog;
    use crate::services::EventSink;
    use crate::store::InMemoryNotificationStore;

    async fn consumer_on(
        log: &Arc<InMemoryEventLog>,
        store: Arc<InMemoryNotificationStore>,
    ) -> EventConsumer<crate::services::event_log::InMemoryEventSource> {
        EventConsumer::new(log.subscribe("notification-service", 0).await, store)
    }

    #[tokio::test]
    async fn test_consumer_starts_idle() {
        let log = Arc::new(InMemoryEventLog::new(1));
        let consumer = consumer_on(&log, Arc::new(InMemoryNotificationStore::new())).await;
        assert_eq!(consumer.state(), ConsumerState::Idle);
    }

    #[tokio::test]
    async fn test_process_next_persists_unread_record() {
        let log = Arc::new(InMemoryEventLog::new(1));
        let store = Arc::new(InMemoryNotificationStore::new());
        let event = NotificationEvent::new(7, 3, "ASSIGNED", "You were assigned task 3");
        log.append("7", &event.to_payload().unwrap()).await.unwrap();

        let mut consumer = consumer_on(&log, store.clone()).await;
        let id = consumer.process_next().await.unwrap();

        let records = store.list_by_user(7).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert!(!records[0].is_read);
        assert_eq!(records[0].notification_type, "ASSIGNED");
        assert_eq!(consumer.state(), ConsumerState::Idle);
        assert_eq!(log.committed_offset("notification-service", 0).await, 1);
    }

    #[tokio::test]
    async fn test_decode_failure_commits_and_skips() {
        let log = Arc::new(InMemoryEventLog::new(1));
        let store = Arc::new(InMemoryNotificationStore::new());
        log.append("k", b"{not json").await.unwrap();

        let mut consumer = consumer_on(&log, store.clone()).await;
        let err = consumer.process_next().await.unwrap_err();

        assert!(matches!(
            err,
            ConsumeError::DecodeFailure { partition: 0, offset: 0, .. }
        ));
        assert_eq!(store.count().await, 0);
        assert_eq!(log.committed_offset("notification-service", 0).await, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_commits_and_drops() {
        let log = Arc::new(InMemoryEventLog::new(1));
        let store = Arc::new(InMemoryNotificationStore::new());
        store.set_unavailable(true);
        let event = NotificationEvent::new(7, 3, "ASSIGNED", "lost");
        log.append("7", &event.to_payload().unwrap()).await.unwrap();

        let mut consumer = consumer_on(&log, store.clone()).await;
        let err = consumer.process_next().await.unwrap_err();
        assert!(matches!(err, ConsumeError::PersistFailure { .. }));

        // The offset moved on: the event is gone even once the store recovers.
        store.set_unavailable(false);
        assert_eq!(log.committed_offset("notification-service", 0).await, 1);
        assert_eq!(store.count().await, 0);
    }

    #[test]
    fn test_outcome_labels() {
        let decode = ConsumeError::DecodeFailure {
            partition: 0,
            offset: 1,
            reason: "bad".into(),
        };
        assert_eq!(decode.outcome_label(), "decode_failure");
        assert_eq!(
            ConsumeError::Read(LogError::Read("x".into())).outcome_label(),
            "read_error"
        );
    }

    #[test]
    fn test_consumer_state_display() {
        assert_eq!(ConsumerState::Idle.to_string(), "idle");
        assert_eq!(ConsumerState::Reading.to_string(), "reading");
        assert_eq!(ConsumerState::Decoding.to_string(), "decoding");
        assert_eq!(ConsumerState::Persisting.to_string(), "persisting");
    }

    #[tokio::test]
    async fn test_kafka_source_creation() {
        let config = KafkaConfig {
            brokers: "localhost:9092".to_string(),
            ..KafkaConfig::default()
        };
        assert!(KafkaEventSource::new(&config).is_ok());
    }
}
