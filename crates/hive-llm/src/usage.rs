//! Usage tracking
//!
//! Every generation, cached ones included, produces a usage record. The
//! sink is out-of-band and best-effort: recording never blocks or fails
//! the call path.

use chrono::{DateTime, Utc};
use hive_core::ErrorKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One model call, as recorded for accounting and routing feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub model_id: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: f64,
    pub was_cached: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub request_metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Destination for usage records. Implementations must not block.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: UsageRecord);
}

/// Shared sink handle.
pub type UsageSinkRef = Arc<dyn UsageSink>;

/// Sink that forwards records over a bounded channel to an out-of-band
/// consumer. When the consumer falls behind, records are dropped with a
/// warning rather than stalling the caller.
pub struct ChannelSink {
    tx: mpsc::Sender<UsageRecord>,
}

impl ChannelSink {
    /// Create a sink and its receiving end.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<UsageRecord>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl UsageSink for ChannelSink {
    fn record(&self, record: UsageRecord) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.tx.try_send(record) {
            tracing::warn!(
                model = %dropped.model_id,
                "usage sink full, dropping record"
            );
        }
    }
}

/// Sink that only emits a structured log line.
#[derive(Debug, Default)]
pub struct TracingSink;

impl UsageSink for TracingSink {
    fn record(&self, record: UsageRecord) {
        tracing::info!(
            model = %record.model_id,
            provider = %record.provider,
            tokens = record.total_tokens,
            cost_usd = record.cost_usd,
            latency_ms = record.latency_ms,
            cached = record.was_cached,
            success = record.success,
            "model usage"
        );
    }
}

/// In-memory sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl UsageSink for MemorySink {
    fn record(&self, record: UsageRecord) {
        self.records.lock().push(record);
    }
}
