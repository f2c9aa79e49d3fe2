pub mod event_log;
pub mod kafka_consumer;
pub mod producer;

pub use event_log::{
    EventSink, EventSource, InMemoryEventLog, InMemoryEventSource, LogError, LogRecord,
    PublishError,
};
pub use kafka_consumer::{ConsumeError, ConsumerState, EventConsumer, KafkaEventSource};
pub use producer::{EventProducer, KafkaEventSink};
