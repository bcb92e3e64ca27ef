//! Best-effort sync counters.
//!
//! Counters live in their own key-value namespace and are only read back to
//! log a conflict rate. A failed write is logged and ignored.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::KeyValueStore;

const METRICS_KEY: &str = "sync.metrics";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub conflicts: u64,
}

impl SyncMetrics {
    /// Conflicts per attempt, 0.0 before the first attempt.
    pub fn conflict_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.conflicts as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MetricEvent {
    Attempt,
    Success,
    Failure,
    Conflict,
}

#[derive(Clone)]
pub struct MetricsRecorder {
    kv: Arc<dyn KeyValueStore>,
}

impl MetricsRecorder {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Current counters. Unreadable data counts as zero.
    pub async fn load(&self) -> SyncMetrics {
        match self.kv.get(METRICS_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable sync metrics: {}", e);
                SyncMetrics::default()
            }),
            Ok(None) => SyncMetrics::default(),
            Err(e) => {
                tracing::warn!("Failed to read sync metrics: {}", e);
                SyncMetrics::default()
            }
        }
    }

    pub async fn record(&self, event: MetricEvent) {
        let mut metrics = self.load().await;
        match event {
            MetricEvent::Attempt => metrics.attempts += 1,
            MetricEvent::Success => metrics.successes += 1,
            MetricEvent::Failure => metrics.failures += 1,
            MetricEvent::Conflict => metrics.conflicts += 1,
        }

        let json = match serde_json::to_string(&metrics) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize sync metrics: {}", e);
                return;
            }
        };
        if let Err(e) = self.kv.set(METRICS_KEY, &json).await {
            tracing::warn!("Failed to store sync metrics: {}", e);
        }
    }

    /// Log the conflict rate so far.
    pub async fn log_conflict_rate(&self) {
        let metrics = self.load().await;
        tracing::info!(
            attempts = metrics.attempts,
            conflicts = metrics.conflicts,
            "Sync conflict rate {:.1}%",
            metrics.conflict_rate() * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryKeyValueStore, StoreError};
    use async_trait::async_trait;

    #[tokio::test]
    async fn test_counters_accumulate() {
        let recorder = MetricsRecorder::new(Arc::new(MemoryKeyValueStore::new()));

        recorder.record(MetricEvent::Attempt).await;
        recorder.record(MetricEvent::Attempt).await;
        recorder.record(MetricEvent::Success).await;
        recorder.record(MetricEvent::Conflict).await;

        let metrics = recorder.load().await;
        assert_eq!(metrics.attempts, 2);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.failures, 0);
        assert_eq!(metrics.conflicts, 1);
        assert!((metrics.conflict_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_conflict_rate_without_attempts() {
        assert_eq!(SyncMetrics::default().conflict_rate(), 0.0);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
        async fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let recorder = MetricsRecorder::new(Arc::new(FailingStore));
        recorder.record(MetricEvent::Failure).await;
        recorder.log_conflict_rate().await;
        assert_eq!(recorder.load().await, SyncMetrics::default());
    }
}
