use crate::query::{OrchestrationStateQuery, QuerySegment, TimeRangeFilterType};
use crate::{HistoryEntity, JumpStartEntity, StateEntity};

pub mod error;
pub use error::{StoreError, StoreErrorKind};

/// Storage client: durable CRUD and query primitives over the State,
/// History and JumpStart tables.
///
/// Storage clients are datastores only. Merge and precedence rules between
/// the primary and jump-start stores live in [`crate::InstanceStore`].
///
/// # Contract
///
/// - Writes are upserts keyed by `(instance_id, execution_id)` for state and
///   jump-start rows, and by `(instance_id, execution_id, sequence_number)`
///   for history rows.
/// - Deletes of missing rows succeed.
/// - Reads that match nothing return empty collections, never errors.
/// - `query_*` calls must call [`OrchestrationStateQuery::validate`] and
///   reject malformed filters with a `MalformedFilter` error.
/// - Backend failures are reported as `Unavailable` and never retried here.
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// Short client name used in logs.
    fn name(&self) -> &str;

    // ===== Lifecycle =====

    async fn create_store_if_not_exists(&self) -> Result<(), StoreError>;

    async fn delete_store_if_exists(&self) -> Result<(), StoreError>;

    // ===== History =====

    async fn write_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError>;

    async fn delete_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError>;

    /// Rows of one history partition, in no guaranteed order.
    async fn read_history(&self, instance_id: &str, execution_id: &str) -> Result<Vec<HistoryEntity>, StoreError>;

    // ===== State =====

    async fn write_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError>;

    async fn delete_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError>;

    /// Primary state rows for the exact key.
    async fn read_state(&self, instance_id: &str, execution_id: &str) -> Result<Vec<StateEntity>, StoreError>;

    async fn query_state(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<StateEntity>, StoreError>;

    // ===== JumpStart =====

    async fn write_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError>;

    async fn delete_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError>;

    /// Same filter semantics as [`StorageClient::query_state`], evaluated
    /// against the provisional state of jump-start rows.
    async fn query_jump_start(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<JumpStartEntity>, StoreError>;

    /// Up to `top` rows with `from <= jump_start_time <= to`, oldest first.
    async fn query_jump_start_window(&self, from: u64, to: u64, top: u32) -> Result<Vec<JumpStartEntity>, StoreError>;

    // ===== Purge =====

    /// Delete every history partition whose `mode` timestamp is strictly
    /// before `threshold`. Returns the number of history rows removed.
    ///
    /// Partition timestamps come from the partition's own rows:
    /// - `CreatedTime`: earliest event timestamp
    /// - `LastUpdatedTime`: latest event timestamp
    /// - `CompletedTime`: timestamp of the terminal event; partitions without
    ///   one never match
    ///
    /// State rows are never touched.
    async fn purge_history(&self, threshold: u64, mode: TimeRangeFilterType) -> Result<u64, StoreError>;
}

/// In-memory storage client for tests and embedding.
pub mod in_memory;
/// Decorator that logs and counts storage client calls.
pub mod instrumented;
/// SQLite storage client built on sqlx.
pub mod sqlite;
