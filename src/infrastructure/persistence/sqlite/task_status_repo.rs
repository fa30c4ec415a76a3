//! SQLite Status Store
//!
//! 状态转换用条件 UPDATE 实现（`WHERE status IN (...)`），单条语句原子完成；
//! 影响行数为 0 时再读一次区分 NotFound 与 InvalidTransition。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{StatusStoreError, StatusStorePort};
use crate::domain::task::{ImageExtension, Task, TaskId, TaskStatus};

/// SQLite Status Store
pub struct SqliteStatusStore {
    pool: DbPool,
}

impl SqliteStatusStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// 条件更新失败后，判断是任务不存在还是非法转换
    async fn rejected_transition(
        &self,
        task_id: &TaskId,
        to: TaskStatus,
    ) -> StatusStoreError {
        match self.find(task_id).await {
            Ok(Some(task)) => StatusStoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status(),
                to,
            },
            Ok(None) => StatusStoreError::NotFound(task_id.to_string()),
            Err(e) => e,
        }
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: String,
    extension: String,
    image_ref: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    attempts: i64,
    created_at: String,
    updated_at: String,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StatusStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StatusStoreError::SerializationError(e.to_string()))
}

impl TryFrom<TaskRow> for Task {
    type Error = StatusStoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = TaskId::parse(&row.id)
            .ok_or_else(|| StatusStoreError::SerializationError(format!("bad task id: {}", row.id)))?;
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(StatusStoreError::SerializationError)?;

        Ok(Task::restore(
            id,
            ImageExtension::restore(row.extension),
            row.image_ref,
            status,
            row.result,
            row.error,
            u32::try_from(row.attempts).unwrap_or(u32::MAX),
            parse_time(&row.created_at)?,
            parse_time(&row.updated_at)?,
        ))
    }
}

fn db_error(e: sqlx::Error) -> StatusStoreError {
    StatusStoreError::DatabaseError(e.to_string())
}

#[async_trait]
impl StatusStorePort for SqliteStatusStore {
    async fn create(&self, task: &Task) -> Result<(), StatusStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (id, extension, image_ref, status, result, error, attempts, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id().to_string())
        .bind(task.extension().as_str())
        .bind(task.image_ref())
        .bind(task.status().as_str())
        .bind(task.result())
        .bind(task.error())
        .bind(i64::from(task.attempts()))
        .bind(task.created_at().to_rfc3339())
        .bind(task.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StatusStoreError::AlreadyExists(task.id().to_string()))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn find(&self, task_id: &TaskId) -> Result<Option<Task>, StatusStoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            SELECT id, extension, image_ref, status, result, error, attempts, created_at, updated_at
            FROM tasks WHERE id = ?
            "#,
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Task::try_from).transpose()
    }

    async fn mark_processing(&self, task_id: &TaskId) -> Result<(), StatusStoreError> {
        let done = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'Processing', attempts = attempts + 1, updated_at = ?
            WHERE id = ? AND status IN ('Pending', 'Processing')
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(self.rejected_transition(task_id, TaskStatus::Processing).await);
        }

        tracing::debug!(task_id = %task_id, "Task marked Processing");
        Ok(())
    }

    async fn mark_success(&self, task_id: &TaskId, result: &str) -> Result<(), StatusStoreError> {
        let done = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'Success', result = ?, updated_at = ?
            WHERE id = ? AND status = 'Processing'
            "#,
        )
        .bind(result)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(self.rejected_transition(task_id, TaskStatus::Success).await);
        }

        tracing::debug!(task_id = %task_id, "Task marked Success");
        Ok(())
    }

    async fn mark_failure(&self, task_id: &TaskId, error: &str) -> Result<(), StatusStoreError> {
        let done = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'Failure', error = ?, updated_at = ?
            WHERE id = ? AND status = 'Processing'
            "#,
        )
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(self.rejected_transition(task_id, TaskStatus::Failure).await);
        }

        tracing::debug!(task_id = %task_id, "Task marked Failure");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::sqlite::{create_pool, run_migrations, DatabaseConfig};
    use tempfile::tempdir;

    async fn memory_store() -> SqliteStatusStore {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStatusStore::new(pool)
    }

    fn new_task() -> Task {
        Task::new(
            TaskId::new(),
            ImageExtension::restore("png"),
            "data/images/cat.png",
        )
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = memory_store().await;
        let task = new_task();
        store.create(&task).await.unwrap();

        let found = store.find(task.id()).await.unwrap().unwrap();
        assert_eq!(found.id(), task.id());
        assert_eq!(found.status(), TaskStatus::Pending);
        assert_eq!(found.extension().as_str(), "png");
        assert_eq!(found.image_ref(), "data/images/cat.png");
        assert!(found.result().is_none());
        assert!(found.error().is_none());

        assert!(store.find(&TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = memory_store().await;
        let task = new_task();
        store.create(&task).await.unwrap();

        assert!(matches!(
            store.create(&task).await,
            Err(StatusStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_success_transition() {
        let store = memory_store().await;
        let task = new_task();
        store.create(&task).await.unwrap();

        store.mark_processing(task.id()).await.unwrap();
        store
            .mark_success(task.id(), "a cat sitting on a couch")
            .await
            .unwrap();

        let found = store.find(task.id()).await.unwrap().unwrap();
        assert_eq!(found.status(), TaskStatus::Success);
        assert_eq!(found.result(), Some("a cat sitting on a couch"));
        assert!(found.error().is_none());
        assert_eq!(found.attempts(), 1);
    }

    #[tokio::test]
    async fn test_terminal_is_final() {
        let store = memory_store().await;
        let task = new_task();
        store.create(&task).await.unwrap();
        store.mark_processing(task.id()).await.unwrap();
        store.mark_failure(task.id(), "engine exited with 1").await.unwrap();

        let err = store.mark_success(task.id(), "late").await.unwrap_err();
        assert!(matches!(
            err,
            StatusStoreError::InvalidTransition {
                from: TaskStatus::Failure,
                to: TaskStatus::Success,
                ..
            }
        ));
        assert!(store.mark_processing(task.id()).await.is_err());
        assert!(store.mark_failure(task.id(), "again").await.is_err());

        let found = store.find(task.id()).await.unwrap().unwrap();
        assert_eq!(found.status(), TaskStatus::Failure);
        assert_eq!(found.error(), Some("engine exited with 1"));
        assert!(found.result().is_none());
    }

    #[tokio::test]
    async fn test_pending_cannot_jump_to_terminal() {
        let store = memory_store().await;
        let task = new_task();
        store.create(&task).await.unwrap();

        assert!(matches!(
            store.mark_success(task.id(), "x").await,
            Err(StatusStoreError::InvalidTransition {
                from: TaskStatus::Pending,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reprocessing_counts_attempts() {
        let store = memory_store().await;
        let task = new_task();
        store.create(&task).await.unwrap();

        store.mark_processing(task.id()).await.unwrap();
        store.mark_processing(task.id()).await.unwrap();

        let found = store.find(task.id()).await.unwrap().unwrap();
        assert_eq!(found.status(), TaskStatus::Processing);
        assert_eq!(found.attempts(), 2);
    }

    #[tokio::test]
    async fn test_unknown_task_transition() {
        let store = memory_store().await;
        assert!(matches!(
            store.mark_processing(&TaskId::new()).await,
            Err(StatusStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("capflow.db");
        let task = new_task();

        {
            let pool = create_pool(&DatabaseConfig::new(&db_path)).await.unwrap();
            run_migrations(&pool).await.unwrap();
            let store = SqliteStatusStore::new(pool.clone());
            store.create(&task).await.unwrap();
            store.mark_processing(task.id()).await.unwrap();
            pool.close().await;
        }

        let pool = create_pool(&DatabaseConfig::new(&db_path)).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SqliteStatusStore::new(pool);
        let found = store.find(task.id()).await.unwrap().unwrap();
        assert_eq!(found.status(), TaskStatus::Processing);
    }
}
