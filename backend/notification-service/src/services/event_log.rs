//! Event log seams between producers and the notification consumer
//!
//! The log is an ordered, partitioned, append-only medium. Producers append
//! through [`EventSink`]; the consumer reads one partition in order through
//! [`EventSource`] and commits its position after handling each record.
//!
//! Kafka implementations live next to the producer and consumer. This module
//! also provides [`InMemoryEventLog`], an embedded log with per-group committed
//! offsets, used by tests and single-process setups.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};

/// One record read from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("offset commit failed: {0}")]
    Commit(String),
}

/// Append side of the log
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append `payload` under `key`. Records sharing a key share a partition.
    async fn append(&self, key: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Read side of the log for one consumer
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the record at the current read position.
    async fn next_record(&mut self) -> Result<LogRecord, LogError>;

    /// Mark `record` handled. A restarted consumer in the same group resumes
    /// after the last committed record.
    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError>;
}

// ============================================================================
// In-memory log
// ============================================================================

/// Embedded partitioned log.
///
/// Committed offsets are tracked per (group, partition) and survive the
/// sources that produced them, so dropping a source without committing and
/// subscribing again replays the uncommitted records.
pub struct InMemoryEventLog {
    partitions: Vec<RwLock<Vec<LogRecord>>>,
    committed: Mutex<HashMap<(String, i32), i64>>,
    appended: Notify,
    available: AtomicBool,
}

impl InMemoryEventLog {
    pub fn new(partition_count: usize) -> Self {
        let partition_count = partition_count.max(1);
        Self {
            partitions: (0..partition_count).map(|_| RwLock::new(Vec::new())).collect(),
            committed: Mutex::new(HashMap::new()),
            appended: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition for `key`; stable for the life of the log.
    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as i32
    }

    /// Simulate the broker refusing writes.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Append raw bytes to a specific partition, bypassing key routing.
    ///
    /// Returns the offset of the new record.
    pub async fn append_to_partition(
        &self,
        partition: i32,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<i64, PublishError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PublishError::BrokerUnavailable(
                "in-memory log is not accepting writes".to_string(),
            ));
        }
        let slot = self.partitions.get(partition as usize).ok_or_else(|| {
            PublishError::BrokerUnavailable(format!("unknown partition {partition}"))
        })?;

        let offset = {
            let mut records = slot.write().await;
            let offset = records.len() as i64;
            records.push(LogRecord {
                partition,
                offset,
                key: key.map(str::to_string),
                payload: payload.to_vec(),
            });
            offset
        };
        self.appended.notify_waiters();
        Ok(offset)
    }

    /// Number of records ever appended to `partition`
    pub async fn len(&self, partition: i32) -> usize {
        match self.partitions.get(partition as usize) {
            Some(slot) => slot.read().await.len(),
            None => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        for slot in &self.partitions {
            if !slot.read().await.is_empty() {
                return false;
            }
        }
        true
    }

    /// Next offset `group` will read from `partition`
    pub async fn committed_offset(&self, group: &str, partition: i32) -> i64 {
        self.committed
            .lock()
            .await
            .get(&(group.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Open a reader for `partition` positioned at `group`'s committed offset.
    pub async fn subscribe(
        self: &Arc<Self>,
        group: &str,
        partition: i32,
    ) -> InMemoryEventSource {
        let position = self.committed_offset(group, partition).await;
        InMemoryEventSource {
            log: Arc::clone(self),
            group: group.to_string(),
            partition,
            position,
        }
    }

    async fn record_at(&self, partition: i32, offset: i64) -> Option<LogRecord> {
        let slot = self.partitions.get(partition as usize)?;
        slot.read().await.get(offset as usize).cloned()
    }

    async fn commit_offset(&self, group: &str, partition: i32, next_offset: i64) {
        let mut committed = self.committed.lock().await;
        let entry = committed.entry((group.to_string(), partition)).or_insert(0);
        // Offsets only move forward.
        if next_offset > *entry {
            *entry = next_offset;
        }
    }
}

#[async_trait]
impl EventSink for InMemoryEventLog {
    async fn append(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let partition = self.partition_for(key);
        self.append_to_partition(partition, Some(key), payload)
            .await
            .map(|_| ())
    }
}

/// Reader over one partition of an [`InMemoryEventLog`]
pub struct InMemoryEventSource {
    log: Arc<InMemoryEventLog>,
    group: String,
    partition: i32,
    position: i64,
}

impl InMemoryEventSource {
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset of the next record this reader will return
    pub fn position(&self) -> i64 {
        self.position
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn next_record(&mut self) -> Result<LogRecord, LogError> {
        if self.partition as usize >= self.log.partition_count() {
            return Err(LogError::Read(format!(
                "unknown partition {}",
                self.partition
            )));
        }

        loop {
            // Register interest before checking so an append between the
            // check and the await is not missed.
            let appended = self.log.appended.notified();
            if let Some(record) = self.log.record_at(self.partition, self.position).await {
                self.position += 1;
                return Ok(record);
            }
            appended.await;
        }
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError> {
        if record.partition != self.partition {
            return Err(LogError::Commit(format!(
                "record from partition {} committed on reader for partition {}",
                record.partition, self.partition
            )));
        }
        self.log
            .commit_offset(&self.group, self.partition, record.offset + 1)
            .await;
        Ok(())
    }
}
