//! SQLite-backed memory store.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC so that
//! lexicographic ordering in SQL matches chronological ordering.

use super::store::{
    LongTermQuery, LongTermRecord, MemoryStore, NewLongTermRecord, TaskRecord, TaskStatus,
    TaskUpdate,
};
use crate::errors::EnsembleError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS long_term_memory (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT,
        importance REAL NOT NULL DEFAULT 0.5,
        timestamp TEXT NOT NULL,
        accessed_count INTEGER NOT NULL DEFAULT 0,
        last_accessed TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_long_term_agent_importance
        ON long_term_memory (agent_id, importance DESC, timestamp DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        task_description TEXT NOT NULL,
        result TEXT,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        metadata TEXT,
        UNIQUE (agent_id, task_id)
    )
    "#,
];

#[derive(Debug, sqlx::FromRow)]
struct LongTermRow {
    id: i64,
    agent_id: String,
    memory_type: String,
    content: String,
    metadata: Option<String>,
    importance: f64,
    timestamp: String,
    accessed_count: i64,
    last_accessed: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    agent_id: String,
    task_id: String,
    task_description: String,
    result: Option<String>,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    metadata: Option<String>,
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, EnsembleError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EnsembleError::StorageError(format!("Invalid timestamp '{}': {}", value, e)))
}

fn parse_metadata(value: Option<&str>) -> Value {
    value
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(Value::Null)
}

impl TryFrom<LongTermRow> for LongTermRecord {
    type Error = EnsembleError;

    fn try_from(row: LongTermRow) -> Result<Self, Self::Error> {
        Ok(LongTermRecord {
            id: row.id,
            agent_id: row.agent_id,
            memory_type: row.memory_type,
            content: row.content,
            metadata: parse_metadata(row.metadata.as_deref()),
            importance: row.importance,
            timestamp: parse_ts(&row.timestamp)?,
            accessed_count: row.accessed_count,
            last_accessed: row.last_accessed.as_deref().map(parse_ts).transpose()?,
        })
    }
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = EnsembleError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(TaskRecord {
            task_id: row.task_id,
            agent_id: row.agent_id,
            description: row.task_description,
            status: TaskStatus::parse(&row.status)?,
            started_at: parse_ts(&row.started_at)?,
            completed_at: row.completed_at.as_deref().map(parse_ts).transpose()?,
            result: row.result,
            metadata: parse_metadata(row.metadata.as_deref()),
        })
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self, EnsembleError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                EnsembleError::StorageError(format!(
                    "Failed to open database {}: {}",
                    path.display(),
                    e
                ))
            })?;

        log::info!("Opened memory database at {}", path.display());
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating tables when missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, EnsembleError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn insert_long_term(&self, record: NewLongTermRecord) -> Result<i64, EnsembleError> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let result = sqlx::query(
            r#"
            INSERT INTO long_term_memory (
                agent_id, memory_type, content, metadata, importance, timestamp, accessed_count
            )
            VALUES (?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&record.agent_id)
        .bind(&record.memory_type)
        .bind(&record.content)
        .bind(metadata)
        .bind(record.importance)
        .bind(format_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn search_long_term(
        &self,
        query: &LongTermQuery,
    ) -> Result<Vec<LongTermRecord>, EnsembleError> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, LongTermRow>(
            r#"
            SELECT id, agent_id, memory_type, content, metadata, importance,
                   timestamp, accessed_count, last_accessed
            FROM long_term_memory
            WHERE agent_id = ?
              AND importance >= ?
              AND (? IS NULL OR memory_type = ?)
            ORDER BY importance DESC, timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(&query.agent_id)
        .bind(query.min_importance)
        .bind(query.memory_type.as_deref())
        .bind(query.memory_type.as_deref())
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if !rows.is_empty() {
            let mut update = QueryBuilder::<Sqlite>::new(
                "UPDATE long_term_memory SET accessed_count = accessed_count + 1, last_accessed = ",
            );
            update.push_bind(format_ts(Utc::now()));
            update.push(" WHERE id IN (");
            let mut ids = update.separated(", ");
            for row in &rows {
                ids.push_bind(row.id);
            }
            ids.push_unseparated(")");
            update.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        rows.into_iter().map(LongTermRecord::try_from).collect()
    }

    async fn insert_task(&self, record: TaskRecord) -> Result<(), EnsembleError> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let result = sqlx::query(
            r#"
            INSERT INTO task_history (
                agent_id, task_id, task_description, result, status,
                started_at, completed_at, metadata
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (agent_id, task_id) DO NOTHING
            "#,
        )
        .bind(&record.agent_id)
        .bind(&record.task_id)
        .bind(&record.description)
        .bind(record.result.as_deref())
        .bind(record.status.as_str())
        .bind(format_ts(record.started_at))
        .bind(record.completed_at.map(format_ts))
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EnsembleError::ValidationError(format!(
                "Task '{}' already exists",
                record.task_id
            )));
        }
        Ok(())
    }

    async fn update_task(
        &self,
        agent_id: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<bool, EnsembleError> {
        if update.is_empty() {
            return Ok(self.get_task(agent_id, task_id).await?.is_some());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE task_history SET ");
        let mut fields = builder.separated(", ");
        if let Some(status) = update.status {
            fields.push("status = ");
            fields.push_bind_unseparated(status.as_str());
            if status.is_terminal() {
                fields.push("completed_at = ");
                fields.push_bind_unseparated(format_ts(Utc::now()));
            }
        }
        if let Some(result) = &update.result {
            fields.push("result = ");
            fields.push_bind_unseparated(result.clone());
        }
        builder.push(" WHERE agent_id = ");
        builder.push_bind(agent_id.to_string());
        builder.push(" AND task_id = ");
        builder.push_bind(task_id.to_string());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_task(
        &self,
        agent_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, EnsembleError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT agent_id, task_id, task_description, result, status,
                   started_at, completed_at, metadata
            FROM task_history
            WHERE agent_id = ? AND task_id = ?
            "#,
        )
        .bind(agent_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TaskRecord::try_from).transpose()
    }

    async fn task_history(
        &self,
        agent_id: &str,
        limit: usize,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, EnsembleError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let status = status.map(TaskStatus::as_str);
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT agent_id, task_id, task_description, result, status,
                   started_at, completed_at, metadata
            FROM task_history
            WHERE agent_id = ?
              AND (? IS NULL OR status = ?)
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(agent_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should initialize");
        SqliteStore::from_pool(pool)
            .await
            .expect("schema should be created")
    }

    fn new_record(importance: f64, content: &str) -> NewLongTermRecord {
        NewLongTermRecord {
            agent_id: "agent".to_string(),
            memory_type: "fact".to_string(),
            content: content.to_string(),
            metadata: json!({"source": "test"}),
            importance,
        }
    }

    #[tokio::test]
    async fn test_search_orders_and_increments_access() {
        let store = setup_store().await;
        store.insert_long_term(new_record(0.4, "b")).await.unwrap();
        store.insert_long_term(new_record(0.8, "a")).await.unwrap();
        store.insert_long_term(new_record(0.1, "c")).await.unwrap();

        let query = LongTermQuery {
            agent_id: "agent".to_string(),
            memory_type: Some("fact".to_string()),
            limit: 5,
            min_importance: 0.2,
        };
        let results = store.search_long_term(&query).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert_eq!(results[0].metadata, json!({"source": "test"}));
        assert_eq!(results[0].accessed_count, 0);

        let again = store.search_long_term(&query).await.unwrap();
        assert!(again.iter().all(|r| r.accessed_count == 1 && r.last_accessed.is_some()));

        let (untouched,): (i64,) =
            sqlx::query_as("SELECT accessed_count FROM long_term_memory WHERE content = 'c'")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(untouched, 0);
    }

    #[tokio::test]
    async fn test_task_update_and_history() {
        let store = setup_store().await;
        for (i, id) in ["t1", "t2"].iter().enumerate() {
            store
                .insert_task(TaskRecord {
                    task_id: id.to_string(),
                    agent_id: "agent".to_string(),
                    description: format!("task {}", i),
                    status: TaskStatus::Started,
                    started_at: Utc::now(),
                    completed_at: None,
                    result: None,
                    metadata: json!({}),
                })
                .await
                .unwrap();
        }

        let changed = store
            .update_task(
                "agent",
                "t1",
                &TaskUpdate {
                    status: Some(TaskStatus::Failed),
                    result: Some("boom".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(changed);

        let t1 = store.get_task("agent", "t1").await.unwrap().unwrap();
        assert_eq!(t1.status, TaskStatus::Failed);
        assert!(t1.completed_at.is_some());

        let result_only = store
            .update_task(
                "agent",
                "t2",
                &TaskUpdate {
                    status: None,
                    result: Some("partial".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(result_only);
        let t2 = store.get_task("agent", "t2").await.unwrap().unwrap();
        assert_eq!(t2.status, TaskStatus::Started);
        assert!(t2.completed_at.is_none());

        let history = store.task_history("agent", 10, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].task_id, "t2");

        let failed = store
            .task_history("agent", 10, Some(TaskStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task_id, "t1");
    }

    #[tokio::test]
    async fn test_duplicate_task_rejected() {
        let store = setup_store().await;
        let task = TaskRecord {
            task_id: "dup".to_string(),
            agent_id: "agent".to_string(),
            description: "x".to_string(),
            status: TaskStatus::Started,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            metadata: json!({}),
        };
        store.insert_task(task.clone()).await.unwrap();
        let err = store.insert_task(task).await.unwrap_err();
        assert!(matches!(err, EnsembleError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.insert_long_term(new_record(0.9, "durable")).await.unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteStore::open(&path).await.unwrap();
        let results = reopened
            .search_long_term(&LongTermQuery {
                agent_id: "agent".to_string(),
                memory_type: None,
                limit: 1,
                min_importance: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(results[0].content, "durable");
    }
}
