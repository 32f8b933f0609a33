use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{StorageClient, StoreError};
use crate::query::{
    decode_offset_token, encode_offset_token, InstanceFilter, OrchestrationStateQuery, QuerySegment,
    TimeRangeFilterType,
};
use crate::{HistoryEntity, HistoryEvent, JumpStartEntity, OrchestrationState, StateEntity};

/// Configuration options for [`SqliteStorageClient`]
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Prefix for the `<base>_state`, `<base>_history` and `<base>_jumpstart`
    /// tables. ASCII letters, digits and `_` only.
    pub base_table_name: String,
    /// Pool size for file databases. In-memory databases always use one
    /// connection so every caller sees the same database.
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            base_table_name: "Orchestration".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(60),
        }
    }
}

/// SQLite integers are signed 64-bit; larger timestamps saturate at `i64::MAX`.
fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A bound parameter for dynamically built statements.
enum Bind {
    Text(String),
    Int(i64),
}

/// SQLite-backed storage client.
///
/// Tables are not created on construction; call
/// `create_store_if_not_exists` (or `InstanceStore::initialize_store`).
pub struct SqliteStorageClient {
    pool: SqlitePool,
    state_table: String,
    history_table: String,
    jump_start_table: String,
}

impl SqliteStorageClient {
    /// Convert sqlx error to StoreError with the appropriate classification
    fn sqlx_to_store_error(operation: &str, e: sqlx::Error) -> StoreError {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
                StoreError::corrupted(operation, format!("Decode error: {e}"))
            }
            other => {
                let error_msg = other.to_string();
                if error_msg.contains("database is locked") || error_msg.contains("SQLITE_BUSY") {
                    StoreError::unavailable(operation, format!("Database locked: {error_msg}"))
                } else if error_msg.contains("connection") || error_msg.contains("timeout") {
                    StoreError::unavailable(operation, format!("Connection error: {error_msg}"))
                } else {
                    StoreError::unavailable(operation, error_msg)
                }
            }
        }
    }

    /// Create a new SQLite storage client
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string (e.g., "sqlite:data.db" or "sqlite::memory:")
    /// * `options` - Optional configuration; defaults to [`SqliteOptions::default`]
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or the connection fails.
    pub async fn new(database_url: &str, options: Option<SqliteOptions>) -> Result<Self, StoreError> {
        let options = options.unwrap_or_default();
        let base = &options.base_table_name;
        if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::invalid_configuration(
                "new",
                format!("invalid base table name: '{base}'"),
            ));
        }

        let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let mut connect = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Self::sqlx_to_store_error("new", e))?
            .create_if_missing(true)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);
        if is_memory {
            // For in-memory DB, durability is not required
            connect = connect
                .journal_mode(SqliteJournalMode::Memory)
                .synchronous(SqliteSynchronous::Off);
        } else {
            connect = connect
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool_options = SqlitePoolOptions::new();
        let pool_options = if is_memory {
            // A private in-memory database lives exactly as long as its connection
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(options.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(connect)
            .await
            .map_err(|e| Self::sqlx_to_store_error("new", e))?;

        debug!(
            target: "duroxide::providers::sqlite",
            base_table = %base,
            is_memory,
            "connected sqlite storage client"
        );

        Ok(Self {
            pool,
            state_table: format!("{base}_state"),
            history_table: format!("{base}_history"),
            jump_start_table: format!("{base}_jumpstart"),
        })
    }

    /// Convenience: a private in-memory database with default table names
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        Self::new("sqlite::memory:", None).await
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn time_column(filter_type: TimeRangeFilterType) -> &'static str {
        match filter_type {
            TimeRangeFilterType::CreatedTime => "created_time",
            TimeRangeFilterType::CompletedTime => "completed_time",
            TimeRangeFilterType::LastUpdatedTime => "last_updated_time",
        }
    }


    /// Build `WHERE ...` for a state-shaped table.
    fn where_clause(query: &OrchestrationStateQuery) -> (String, Vec<Bind>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds = Vec::new();

        match &query.instance {
            Some(InstanceFilter::Exact {
                instance_id,
                execution_id,
            }) => {
                conditions.push("instance_id = ?".to_string());
                binds.push(Bind::Text(instance_id.clone()));
                if let Some(exec) = execution_id {
                    conditions.push("execution_id = ?".to_string());
                    binds.push(Bind::Text(exec.clone()));
                }
            }
            Some(InstanceFilter::Prefix { prefix, .. }) => {
                // Case-sensitive literal prefix
                conditions.push("substr(instance_id, 1, length(?)) = ?".to_string());
                binds.push(Bind::Text(prefix.clone()));
                binds.push(Bind::Text(prefix.clone()));
            }
            None => {}
        }

        if let Some(name) = &query.name {
            conditions.push("name = ?".to_string());
            binds.push(Bind::Text(name.name.clone()));
            if let Some(version) = &name.version {
                conditions.push("version = ?".to_string());
                binds.push(Bind::Text(version.clone()));
            }
        }

        if let Some(status) = query.status {
            conditions.push("status = ?".to_string());
            binds.push(Bind::Text(status.as_str().to_string()));
        }

        if let Some(range) = &query.time_range {
            let column = Self::time_column(range.filter_type);
            conditions.push(format!("{column} IS NOT NULL AND {column} >= ? AND {column} <= ?"));
            binds.push(Bind::Int(sql_int(range.start)));
            binds.push(Bind::Int(sql_int(range.end)));
        }

        if conditions.is_empty() {
            (String::new(), binds)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), binds)
        }
    }

    /// Run a filtered, paged SELECT and return raw rows plus the next token.
    async fn query_rows(
        &self,
        operation: &str,
        table: &str,
        columns: &str,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<(Vec<SqliteRow>, Option<String>), StoreError> {
        query.validate(operation)?;
        let offset = decode_offset_token(operation, continuation_token)?;
        let (where_sql, binds) = Self::where_clause(query);

        // Fetch one extra row to learn whether another page exists
        let limit: i64 = match query.top {
            Some(top) => i64::from(top) + 1,
            None => -1,
        };
        let sql = format!(
            "SELECT {columns} FROM {table}{where_sql} ORDER BY instance_id, execution_id LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = match bind {
                Bind::Text(s) => q.bind(s),
                Bind::Int(i) => q.bind(i),
            };
        }
        q = q.bind(limit).bind(sql_int(offset as u64));

        let mut rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;

        let mut next = None;
        if let Some(top) = query.top {
            if rows.len() > top as usize {
                rows.truncate(top as usize);
                next = Some(encode_offset_token(offset + top as usize));
            }
        }
        Ok((rows, next))
    }

    fn decode_state(operation: &str, row: &SqliteRow) -> Result<OrchestrationState, StoreError> {
        let data: String = row
            .try_get("state_data")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        serde_json::from_str(&data)
            .map_err(|e| StoreError::corrupted(operation, format!("Failed to deserialize state: {e}")))
    }

    fn decode_jump_start(operation: &str, row: &SqliteRow) -> Result<JumpStartEntity, StoreError> {
        let state = Self::decode_state(operation, row)?;
        let jump_start_time: i64 = row
            .try_get("jump_start_time")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        Ok(JumpStartEntity::new(state, jump_start_time as u64))
    }

    fn decode_history(operation: &str, row: &SqliteRow) -> Result<HistoryEntity, StoreError> {
        let instance_id: String = row
            .try_get("instance_id")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        let execution_id: String = row
            .try_get("execution_id")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        let sequence_number: i64 = row
            .try_get("sequence_number")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        let event_timestamp: i64 = row
            .try_get("event_timestamp")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        let event_data: String = row
            .try_get("event_data")
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        let event: HistoryEvent = serde_json::from_str(&event_data).map_err(|e| {
            StoreError::corrupted(
                operation,
                format!(
                    "Failed to deserialize history event {sequence_number} for instance '{instance_id}' execution {execution_id}: {e}"
                ),
            )
        })?;
        Ok(HistoryEntity {
            instance_id,
            execution_id,
            sequence_number: sequence_number as u64,
            event_timestamp: event_timestamp as u64,
            event,
        })
    }

    fn encode_state(operation: &str, state: &OrchestrationState) -> Result<String, StoreError> {
        serde_json::to_string(state)
            .map_err(|e| StoreError::corrupted(operation, format!("Serialization error: {e}")))
    }

    /// Upsert state-shaped rows into `table`; `jump_start_times` is set for
    /// the jump-start table only.
    async fn upsert_states(
        &self,
        operation: &str,
        table: &str,
        rows: Vec<(OrchestrationState, Option<u64>)>,
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let with_jump_start = rows.iter().any(|(_, t)| t.is_some());
        let sql = if with_jump_start {
            format!(
                "INSERT OR REPLACE INTO {table} (instance_id, execution_id, name, version, status, created_time, \
                 last_updated_time, completed_time, state_data, jump_start_time) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            )
        } else {
            format!(
                "INSERT OR REPLACE INTO {table} (instance_id, execution_id, name, version, status, created_time, \
                 last_updated_time, completed_time, state_data) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            )
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;

        for (state, jump_start_time) in &rows {
            let data = Self::encode_state(operation, state)?;
            let mut q = sqlx::query(&sql)
                .bind(state.instance_id())
                .bind(state.execution_id())
                .bind(&state.name)
                .bind(state.version.as_deref())
                .bind(state.status.as_str())
                .bind(sql_int(state.created_time))
                .bind(sql_int(state.last_updated_time))
                .bind(state.completed_time.map(sql_int))
                .bind(data);
            if with_jump_start {
                q = q.bind(sql_int(jump_start_time.unwrap_or(state.created_time)));
            }
            q.execute(&mut *tx)
                .await
                .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        Ok(())
    }

    async fn delete_keys(
        &self,
        operation: &str,
        table: &str,
        keys: Vec<(String, String)>,
    ) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let sql = format!("DELETE FROM {table} WHERE instance_id = ? AND execution_id = ?");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        for (instance_id, execution_id) in keys {
            sqlx::query(&sql)
                .bind(instance_id)
                .bind(execution_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        }
        tx.commit()
            .await
            .map_err(|e| Self::sqlx_to_store_error(operation, e))?;
        Ok(())
    }
}

const STATE_COLUMNS: &str = "state_data";
const JUMP_START_COLUMNS: &str = "state_data, jump_start_time";
const HISTORY_COLUMNS: &str = "instance_id, execution_id, sequence_number, event_timestamp, event_data";

#[async_trait::async_trait]
impl StorageClient for SqliteStorageClient {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_store_if_not_exists(&self) -> Result<(), StoreError> {
        let op = "create_store_if_not_exists";
        let state_columns = r#"
                instance_id TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT,
                status TEXT NOT NULL,
                created_time INTEGER NOT NULL,
                last_updated_time INTEGER NOT NULL,
                completed_time INTEGER,
                state_data TEXT NOT NULL"#;

        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({state_columns}, PRIMARY KEY (instance_id, execution_id))",
                self.state_table
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({state_columns}, jump_start_time INTEGER NOT NULL, \
                 PRIMARY KEY (instance_id, execution_id))",
                self.jump_start_table
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {} (
                instance_id TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                event_timestamp INTEGER NOT NULL,
                event_data TEXT NOT NULL,
                PRIMARY KEY (instance_id, execution_id, sequence_number)
            )"#,
                self.history_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_status ON {0}(status)",
                self.state_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_time ON {0}(jump_start_time)",
                self.jump_start_table
            ),
        ];

        for sql in statements {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        }
        debug!(target: "duroxide::providers::sqlite", state_table = %self.state_table, "store created");
        Ok(())
    }

    async fn delete_store_if_exists(&self) -> Result<(), StoreError> {
        for table in [&self.state_table, &self.history_table, &self.jump_start_table] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await
                .map_err(|e| Self::sqlx_to_store_error("delete_store_if_exists", e))?;
        }
        debug!(target: "duroxide::providers::sqlite", state_table = %self.state_table, "store deleted");
        Ok(())
    }

    async fn write_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        let op = "write_history";
        if entities.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {} (instance_id, execution_id, sequence_number, event_type, event_timestamp, event_data) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.history_table
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        for entity in &entities {
            let event_data = serde_json::to_string(&entity.event)
                .map_err(|e| StoreError::corrupted(op, format!("Serialization error: {e}")))?;
            sqlx::query(&sql)
                .bind(&entity.instance_id)
                .bind(&entity.execution_id)
                .bind(sql_int(entity.sequence_number))
                .bind(entity.event.event_type())
                .bind(sql_int(entity.event_timestamp))
                .bind(event_data)
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        }
        tx.commit().await.map_err(|e| Self::sqlx_to_store_error(op, e))?;
        Ok(())
    }

    async fn delete_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        let op = "delete_history";
        if entities.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM {} WHERE instance_id = ? AND execution_id = ? AND sequence_number = ?",
            self.history_table
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        for entity in &entities {
            sqlx::query(&sql)
                .bind(&entity.instance_id)
                .bind(&entity.execution_id)
                .bind(sql_int(entity.sequence_number))
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        }
        tx.commit().await.map_err(|e| Self::sqlx_to_store_error(op, e))?;
        Ok(())
    }

    async fn read_history(&self, instance_id: &str, execution_id: &str) -> Result<Vec<HistoryEntity>, StoreError> {
        let op = "read_history";
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM {} WHERE instance_id = ? AND execution_id = ?",
            self.history_table
        );
        let rows = sqlx::query(&sql)
            .bind(instance_id)
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        rows.iter().map(|row| Self::decode_history(op, row)).collect()
    }

    async fn write_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        let rows = entities.into_iter().map(|e| (e.state, None)).collect();
        self.upsert_states("write_state", &self.state_table, rows).await
    }

    async fn delete_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        let keys = entities
            .into_iter()
            .map(|e| (e.state.instance.instance_id, e.state.instance.execution_id))
            .collect();
        self.delete_keys("delete_state", &self.state_table, keys).await
    }

    async fn read_state(&self, instance_id: &str, execution_id: &str) -> Result<Vec<StateEntity>, StoreError> {
        let op = "read_state";
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM {} WHERE instance_id = ? AND execution_id = ?",
            self.state_table
        );
        let rows = sqlx::query(&sql)
            .bind(instance_id)
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        rows.iter()
            .map(|row| Self::decode_state(op, row).map(StateEntity::from))
            .collect()
    }

    async fn query_state(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<StateEntity>, StoreError> {
        let op = "query_state";
        let (rows, continuation_token) = self
            .query_rows(op, &self.state_table, STATE_COLUMNS, query, continuation_token)
            .await?;
        let results = rows
            .iter()
            .map(|row| Self::decode_state(op, row).map(StateEntity::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuerySegment {
            results,
            continuation_token,
        })
    }

    async fn write_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        let rows = entities
            .into_iter()
            .map(|e| (e.state, Some(e.jump_start_time)))
            .collect();
        self.upsert_states("write_jump_start", &self.jump_start_table, rows).await
    }

    async fn delete_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        let keys = entities
            .into_iter()
            .map(|e| (e.state.instance.instance_id, e.state.instance.execution_id))
            .collect();
        self.delete_keys("delete_jump_start", &self.jump_start_table, keys).await
    }

    async fn query_jump_start(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<JumpStartEntity>, StoreError> {
        let op = "query_jump_start";
        let (rows, continuation_token) = self
            .query_rows(op, &self.jump_start_table, JUMP_START_COLUMNS, query, continuation_token)
            .await?;
        let results = rows
            .iter()
            .map(|row| Self::decode_jump_start(op, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuerySegment {
            results,
            continuation_token,
        })
    }

    async fn query_jump_start_window(&self, from: u64, to: u64, top: u32) -> Result<Vec<JumpStartEntity>, StoreError> {
        let op = "query_jump_start_window";
        let sql = format!(
            "SELECT {JUMP_START_COLUMNS} FROM {} WHERE jump_start_time >= ? AND jump_start_time <= ? \
             ORDER BY jump_start_time, instance_id, execution_id LIMIT ?",
            self.jump_start_table
        );
        let rows = sqlx::query(&sql)
            .bind(sql_int(from))
            .bind(sql_int(to))
            .bind(i64::from(top))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        rows.iter().map(|row| Self::decode_jump_start(op, row)).collect()
    }

    async fn purge_history(&self, threshold: u64, mode: TimeRangeFilterType) -> Result<u64, StoreError> {
        let op = "purge_history";
        let table = &self.history_table;
        let partitions = match mode {
            TimeRangeFilterType::CreatedTime => format!(
                "SELECT instance_id, execution_id FROM {table} \
                 GROUP BY instance_id, execution_id HAVING MIN(event_timestamp) < ?"
            ),
            TimeRangeFilterType::LastUpdatedTime => format!(
                "SELECT instance_id, execution_id FROM {table} \
                 GROUP BY instance_id, execution_id HAVING MAX(event_timestamp) < ?"
            ),
            TimeRangeFilterType::CompletedTime => format!(
                "SELECT instance_id, execution_id FROM {table} \
                 WHERE event_type IN ('{}', '{}') \
                 GROUP BY instance_id, execution_id HAVING MAX(event_timestamp) < ?",
                "ExecutionCompleted", "ContinuedAsNew"
            ),
        };
        let sql = format!("DELETE FROM {table} WHERE (instance_id, execution_id) IN ({partitions})");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        let result = sqlx::query(&sql)
            .bind(sql_int(threshold))
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::sqlx_to_store_error(op, e))?;
        tx.commit().await.map_err(|e| Self::sqlx_to_store_error(op, e))?;

        let removed = result.rows_affected();
        debug!(target: "duroxide::providers::sqlite", threshold, ?mode, removed, "purged history");
        Ok(removed)
    }
}
