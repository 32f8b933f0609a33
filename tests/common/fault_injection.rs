//! Fault-injecting storage client for error propagation tests.

use async_trait::async_trait;
use duroxide_instance_store::providers::{StorageClient, StoreError};
use duroxide_instance_store::query::{OrchestrationStateQuery, QuerySegment, TimeRangeFilterType};
use duroxide_instance_store::{HistoryEntity, JumpStartEntity, StateEntity};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Wraps a client and fails selected tables on demand.
///
/// Failures are reported as `Unavailable` with the operation name, the way a
/// real backend outage would surface.
pub struct FailingStorageClient {
    inner: Arc<dyn StorageClient>,
    fail_state: AtomicBool,
    fail_jump_start: AtomicBool,
    fail_history: AtomicBool,
    /// Calls that reached the inner client
    calls: AtomicU32,
}

impl FailingStorageClient {
    pub fn new(inner: Arc<dyn StorageClient>) -> Self {
        Self {
            inner,
            fail_state: AtomicBool::new(false),
            fail_jump_start: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn fail_state(&self, fail: bool) {
        self.fail_state.store(fail, Ordering::SeqCst);
    }

    pub fn fail_jump_start(&self, fail: bool) {
        self.fail_jump_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(operation, "injected failure"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StorageClient for FailingStorageClient {
    fn name(&self) -> &str {
        "failing"
    }

    async fn create_store_if_not_exists(&self) -> Result<(), StoreError> {
        self.inner.create_store_if_not_exists().await
    }

    async fn delete_store_if_exists(&self) -> Result<(), StoreError> {
        self.inner.delete_store_if_exists().await
    }

    async fn write_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        self.check(&self.fail_history, "write_history")?;
        self.inner.write_history(entities).await
    }

    async fn delete_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        self.check(&self.fail_history, "delete_history")?;
        self.inner.delete_history(entities).await
    }

    async fn read_history(&self, instance_id: &str, execution_id: &str) -> Result<Vec<HistoryEntity>, StoreError> {
        self.check(&self.fail_history, "read_history")?;
        self.inner.read_history(instance_id, execution_id).await
    }

    async fn write_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        self.check(&self.fail_state, "write_state")?;
        self.inner.write_state(entities).await
    }

    async fn delete_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        self.check(&self.fail_state, "delete_state")?;
        self.inner.delete_state(entities).await
    }

    async fn read_state(&self, instance_id: &str, execution_id: &str) -> Result<Vec<StateEntity>, StoreError> {
        self.check(&self.fail_state, "read_state")?;
        self.inner.read_state(instance_id, execution_id).await
    }

    async fn query_state(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<StateEntity>, StoreError> {
        self.check(&self.fail_state, "query_state")?;
        self.inner.query_state(query, continuation_token).await
    }

    async fn write_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        self.check(&self.fail_jump_start, "write_jump_start")?;
        self.inner.write_jump_start(entities).await
    }

    async fn delete_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        self.check(&self.fail_jump_start, "delete_jump_start")?;
        self.inner.delete_jump_start(entities).await
    }

    async fn query_jump_start(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<JumpStartEntity>, StoreError> {
        self.check(&self.fail_jump_start, "query_jump_start")?;
        self.inner.query_jump_start(query, continuation_token).await
    }

    async fn query_jump_start_window(&self, from: u64, to: u64, top: u32) -> Result<Vec<JumpStartEntity>, StoreError> {
        self.check(&self.fail_jump_start, "query_jump_start_window")?;
        self.inner.query_jump_start_window(from, to, top).await
    }

    async fn purge_history(&self, threshold: u64, mode: TimeRangeFilterType) -> Result<u64, StoreError> {
        self.check(&self.fail_history, "purge_history")?;
        self.inner.purge_history(threshold, mode).await
    }
}
