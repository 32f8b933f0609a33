//! Instrumented storage client wrapper that logs, counts and meters every call.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{StorageClient, StoreError};
use crate::metrics::StoreMetrics;
use crate::query::{OrchestrationStateQuery, QuerySegment, TimeRangeFilterType};
use crate::{HistoryEntity, JumpStartEntity, StateEntity};

const OPERATIONS: [&str; 14] = [
    "create_store_if_not_exists",
    "delete_store_if_exists",
    "write_history",
    "delete_history",
    "read_history",
    "write_state",
    "delete_state",
    "read_state",
    "query_state",
    "write_jump_start",
    "delete_jump_start",
    "query_jump_start",
    "query_jump_start_window",
    "purge_history",
];

/// Per-operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub calls: u64,
    pub errors: u64,
    pub total_duration: Duration,
}

#[derive(Default)]
struct OperationCounters {
    calls: AtomicU64,
    errors: AtomicU64,
    duration_nanos: AtomicU64,
}

/// Wrapper that adds logging and metrics to any [`StorageClient`].
///
/// This follows the decorator pattern to record, per operation:
/// - call count and accumulated duration, readable through [`Self::snapshot`]
/// - error count, with a `warn` event carrying the error classification
/// - OpenTelemetry duration and error instruments when a [`StoreMetrics`]
///   is supplied
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use duroxide_instance_store::metrics::StoreMetrics;
/// use duroxide_instance_store::providers::in_memory::InMemoryStorageClient;
/// use duroxide_instance_store::providers::instrumented::InstrumentedStorageClient;
/// use duroxide_instance_store::InstanceStore;
///
/// let metrics = Some(Arc::new(StoreMetrics::new())); // or None
/// let client = Arc::new(InstrumentedStorageClient::new(Arc::new(InMemoryStorageClient::new()), metrics));
/// let store = InstanceStore::new(client.clone());
/// // ... use the store ...
/// let stats = client.snapshot();
/// # let _ = (store, stats);
/// ```
pub struct InstrumentedStorageClient {
    inner: Arc<dyn StorageClient>,
    metrics: Option<Arc<StoreMetrics>>,
    counters: BTreeMap<&'static str, OperationCounters>,
}

impl InstrumentedStorageClient {
    pub fn new(inner: Arc<dyn StorageClient>, metrics: Option<Arc<StoreMetrics>>) -> Self {
        Self {
            inner,
            metrics,
            counters: OPERATIONS.iter().map(|op| (*op, OperationCounters::default())).collect(),
        }
    }

    /// Counters for every operation called at least once, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, OperationStats> {
        self.counters
            .iter()
            .filter_map(|(op, c)| {
                let calls = c.calls.load(Ordering::Relaxed);
                (calls > 0).then(|| {
                    (
                        *op,
                        OperationStats {
                            calls,
                            errors: c.errors.load(Ordering::Relaxed),
                            total_duration: Duration::from_nanos(c.duration_nanos.load(Ordering::Relaxed)),
                        },
                    )
                })
            })
            .collect()
    }

    #[inline]
    fn record<T>(&self, operation: &'static str, start: Instant, result: &Result<T, StoreError>) {
        let duration = start.elapsed();
        if let Some(c) = self.counters.get(operation) {
            c.calls.fetch_add(1, Ordering::Relaxed);
            c.duration_nanos.fetch_add(
                u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
                Ordering::Relaxed,
            );
            if result.is_err() {
                c.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(ref m) = self.metrics {
            let status = if result.is_ok() { "success" } else { "error" };
            m.record_provider_operation(operation, duration.as_secs_f64(), status);
            if let Err(e) = result {
                m.record_provider_error(operation, e.kind);
            }
        }

        match result {
            Ok(_) => tracing::debug!(
                target: "duroxide::providers::instrumented",
                client = self.inner.name(),
                operation,
                duration_ms = duration.as_millis() as u64,
                "storage call succeeded"
            ),
            Err(e) => tracing::warn!(
                target: "duroxide::providers::instrumented",
                client = self.inner.name(),
                operation,
                duration_ms = duration.as_millis() as u64,
                kind = ?e.kind,
                retryable = e.is_retryable(),
                error = %e,
                "storage call failed"
            ),
        }
    }
}

#[async_trait]
impl StorageClient for InstrumentedStorageClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_store_if_not_exists(&self) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.create_store_if_not_exists().await;
        self.record("create_store_if_not_exists", start, &result);
        result
    }

    async fn delete_store_if_exists(&self) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.delete_store_if_exists().await;
        self.record("delete_store_if_exists", start, &result);
        result
    }

    async fn write_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.write_history(entities).await;
        self.record("write_history", start, &result);
        result
    }

    async fn delete_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.delete_history(entities).await;
        self.record("delete_history", start, &result);
        result
    }

    async fn read_history(&self, instance_id: &str, execution_id: &str) -> Result<Vec<HistoryEntity>, StoreError> {
        let start = Instant::now();
        let result = self.inner.read_history(instance_id, execution_id).await;
        self.record("read_history", start, &result);
        result
    }

    async fn write_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.write_state(entities).await;
        self.record("write_state", start, &result);
        result
    }

    async fn delete_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.delete_state(entities).await;
        self.record("delete_state", start, &result);
        result
    }

    async fn read_state(&self, instance_id: &str, execution_id: &str) -> Result<Vec<StateEntity>, StoreError> {
        let start = Instant::now();
        let result = self.inner.read_state(instance_id, execution_id).await;
        self.record("read_state", start, &result);
        result
    }

    async fn query_state(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<StateEntity>, StoreError> {
        let start = Instant::now();
        let result = self.inner.query_state(query, continuation_token).await;
        self.record("query_state", start, &result);
        result
    }

    async fn write_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.write_jump_start(entities).await;
        self.record("write_jump_start", start, &result);
        result
    }

    async fn delete_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.delete_jump_start(entities).await;
        self.record("delete_jump_start", start, &result);
        result
    }

    async fn query_jump_start(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<JumpStartEntity>, StoreError> {
        let start = Instant::now();
        let result = self.inner.query_jump_start(query, continuation_token).await;
        self.record("query_jump_start", start, &result);
        result
    }

    async fn query_jump_start_window(&self, from: u64, to: u64, top: u32) -> Result<Vec<JumpStartEntity>, StoreError> {
        let start = Instant::now();
        let result = self.inner.query_jump_start_window(from, to, top).await;
        self.record("query_jump_start_window", start, &result);
        result
    }

    async fn purge_history(&self, threshold: u64, mode: TimeRangeFilterType) -> Result<u64, StoreError> {
        let start = Instant::now();
        let result = self.inner.purge_history(threshold, mode).await;
        self.record("purge_history", start, &result);
        result
    }
}
