//! Storage client validation tests for the in-memory client
//!
//! Runs the reusable suite from `duroxide_instance_store::provider_validations`
//! against `InMemoryStorageClient`.

#[cfg(feature = "provider-test")]
mod tests {
    use duroxide_instance_store::provider_validations::{
        StorageClientFactory,
        test_history_delete_rows,
        test_history_partition_isolation,
        test_history_payload_round_trip,
        test_history_upsert_by_sequence,
        test_jump_start_query_filters,
        test_jump_start_upsert_and_delete,
        test_jump_start_window_bounds_and_order,
        test_jump_start_window_respects_top,
        test_purge_by_completed_time,
        test_purge_by_created_time,
        test_purge_leaves_state_rows,
        test_purge_threshold_is_strict,
        test_purge_unbounded_threshold,
        test_query_exact_instance,
        test_query_instance_prefix,
        test_query_name_and_status,
        test_query_open_ended_time_range,
        test_query_paging,
        test_query_rejects_malformed_filters,
        test_query_time_range,
        test_state_delete_is_targeted,
        test_state_missing_reads_empty,
        test_state_upsert_replaces_row,
        test_store_lifecycle,
    };
    use duroxide_instance_store::providers::in_memory::InMemoryStorageClient;
    use duroxide_instance_store::providers::StorageClient;
    use std::sync::Arc;

    struct InMemoryTestFactory;

    #[async_trait::async_trait]
    impl StorageClientFactory for InMemoryTestFactory {
        async fn create_client(&self) -> Arc<dyn StorageClient> {
            Arc::new(InMemoryStorageClient::new())
        }
    }

    // State tests
    #[tokio::test]
    async fn test_in_memory_state_upsert_replaces_row() {
        test_state_upsert_replaces_row(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_state_missing_reads_empty() {
        test_state_missing_reads_empty(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_state_delete_is_targeted() {
        test_state_delete_is_targeted(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_store_lifecycle() {
        test_store_lifecycle(&InMemoryTestFactory).await;
    }

    // History tests
    #[tokio::test]
    async fn test_in_memory_history_partition_isolation() {
        test_history_partition_isolation(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_history_upsert_by_sequence() {
        test_history_upsert_by_sequence(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_history_payload_round_trip() {
        test_history_payload_round_trip(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_history_delete_rows() {
        test_history_delete_rows(&InMemoryTestFactory).await;
    }

    // Jump-start tests
    #[tokio::test]
    async fn test_in_memory_jump_start_window_bounds_and_order() {
        test_jump_start_window_bounds_and_order(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_jump_start_window_respects_top() {
        test_jump_start_window_respects_top(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_jump_start_query_filters() {
        test_jump_start_query_filters(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_jump_start_upsert_and_delete() {
        test_jump_start_upsert_and_delete(&InMemoryTestFactory).await;
    }

    // Query tests
    #[tokio::test]
    async fn test_in_memory_query_exact_instance() {
        test_query_exact_instance(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_query_instance_prefix() {
        test_query_instance_prefix(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_query_name_and_status() {
        test_query_name_and_status(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_query_time_range() {
        test_query_time_range(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_query_paging() {
        test_query_paging(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_query_rejects_malformed_filters() {
        test_query_rejects_malformed_filters(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_query_open_ended_time_range() {
        test_query_open_ended_time_range(&InMemoryTestFactory).await;
    }

    // Purge tests
    #[tokio::test]
    async fn test_in_memory_purge_by_created_time() {
        test_purge_by_created_time(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_purge_by_completed_time() {
        test_purge_by_completed_time(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_purge_threshold_is_strict() {
        test_purge_threshold_is_strict(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_purge_leaves_state_rows() {
        test_purge_leaves_state_rows(&InMemoryTestFactory).await;
    }

    #[tokio::test]
    async fn test_in_memory_purge_unbounded_threshold() {
        test_purge_unbounded_threshold(&InMemoryTestFactory).await;
    }
}
