//! Storage Client Validation Infrastructure
//!
//! Reusable test infrastructure for validating custom [`StorageClient`]
//! implementations. Enable the `provider-test` feature to use it.
//!
//! # Example
//!
//! ```rust,ignore
//! use duroxide_instance_store::providers::StorageClient;
//! use duroxide_instance_store::provider_validations::StorageClientFactory;
//! use std::sync::Arc;
//!
//! struct MyClientFactory;
//!
//! #[async_trait::async_trait]
//! impl StorageClientFactory for MyClientFactory {
//!     async fn create_client(&self) -> Arc<dyn StorageClient> {
//!         let client = MyClient::connect().await.unwrap();
//!         client.create_store_if_not_exists().await.unwrap();
//!         Arc::new(client)
//!     }
//! }
//!
//! #[tokio::test]
//! async fn test_my_client_purge() {
//!     duroxide_instance_store::provider_validations::test_purge_by_created_time(&MyClientFactory).await;
//! }
//! ```
//!
//! Available test functions:
//!
//! **State:**
//! - `test_state_upsert_replaces_row` - same key written twice leaves one row
//! - `test_state_missing_reads_empty` - reads and deletes of absent rows succeed
//! - `test_state_delete_is_targeted` - delete removes only the given keys
//! - `test_store_lifecycle` - delete drops data, create brings an empty store back
//!
//! **History:**
//! - `test_history_partition_isolation` - executions of one instance do not mix
//! - `test_history_upsert_by_sequence` - sequence number is part of the key
//! - `test_history_payload_round_trip` - every event kind survives storage
//! - `test_history_delete_rows` - delete removes exactly the given rows
//!
//! **Jump-start:**
//! - `test_jump_start_window_bounds_and_order` - window is inclusive, oldest first
//! - `test_jump_start_window_respects_top` - `top` caps the result
//! - `test_jump_start_query_filters` - jump-start rows honor the state query filter
//! - `test_jump_start_upsert_and_delete` - keyed like state rows
//!
//! **Query:**
//! - `test_query_exact_instance` - all executions, or one pinned execution
//! - `test_query_instance_prefix` - prefix match is case-sensitive and treats `_` and `%` literally
//! - `test_query_name_and_status` - conjunctive name/version/status filters
//! - `test_query_time_range` - inclusive bounds; open executions never match CompletedTime
//! - `test_query_open_ended_time_range` - `u64::MAX` upper bounds match everything after the start
//! - `test_query_paging` - pages cover every match exactly once
//! - `test_query_rejects_malformed_filters` - bad filters and tokens fail as MalformedFilter
//!
//! **Purge:**
//! - `test_purge_by_created_time` - counts removed rows; younger partitions stay
//! - `test_purge_by_completed_time` - open partitions are never purged
//! - `test_purge_threshold_is_strict` - a timestamp equal to the threshold survives
//! - `test_purge_unbounded_threshold` - a `u64::MAX` threshold purges every partition
//! - `test_purge_leaves_state_rows` - purge never touches state

use crate::providers::StorageClient;
use std::sync::Arc;

/// Trait for creating storage clients in tests.
///
/// Each call must return a fresh, isolated client whose store already
/// exists (i.e. `create_store_if_not_exists` has run).
#[async_trait::async_trait]
pub trait StorageClientFactory: Send + Sync {
    async fn create_client(&self) -> Arc<dyn StorageClient>;
}

pub use crate::provider_validation::history::{
    test_history_delete_rows, test_history_partition_isolation, test_history_payload_round_trip,
    test_history_upsert_by_sequence,
};
pub use crate::provider_validation::jump_start::{
    test_jump_start_query_filters, test_jump_start_upsert_and_delete, test_jump_start_window_bounds_and_order,
    test_jump_start_window_respects_top,
};
pub use crate::provider_validation::purge::{
    test_purge_by_completed_time, test_purge_by_created_time, test_purge_leaves_state_rows,
    test_purge_threshold_is_strict, test_purge_unbounded_threshold,
};
pub use crate::provider_validation::query::{
    test_query_exact_instance, test_query_instance_prefix, test_query_name_and_status,
    test_query_open_ended_time_range, test_query_paging, test_query_rejects_malformed_filters, test_query_time_range,
};
pub use crate::provider_validation::state::{
    test_state_delete_is_targeted, test_state_missing_reads_empty, test_state_upsert_replaces_row,
    test_store_lifecycle,
};
