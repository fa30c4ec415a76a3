//! 任务生命周期集成测试
//!
//! 提交方 → 队列 → Worker → 轮询方，全部通过公开 API 组装

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use capflow::application::{
    ApplicationError, GetTaskError, GetTaskErrorHandler, GetTaskResult, GetTaskResultHandler,
    GetTaskStatus, GetTaskStatusHandler, MessageQueuePort, QueueMessage, StatusStorePort,
    SubmissionPolicy, SubmitCaption, SubmitCaptionHandler,
};
use capflow::domain::task::{ImageExtension, TaskId, TaskStatus};
use capflow::infrastructure::adapters::{FakeCaptionEngine, FileBlobStore};
use capflow::infrastructure::persistence::sqlite::{create_pool, run_migrations, DatabaseConfig};
use capflow::infrastructure::worker::DeliveryOutcome;
use capflow::infrastructure::{
    CaptionWorker, CaptionWorkerConfig, InMemoryStatusStore, SledMessageQueue, SledQueueConfig,
    SqliteStatusStore,
};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    status_store: Arc<dyn StatusStorePort>,
    queue: Arc<SledMessageQueue>,
    blob_store: Arc<FileBlobStore>,
    submitter: SubmitCaptionHandler,
    status: GetTaskStatusHandler,
    result: GetTaskResultHandler,
    error: GetTaskErrorHandler,
}

impl Harness {
    async fn with_store(status_store: Arc<dyn StatusStorePort>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blob_store = Arc::new(FileBlobStore::new(dir.path().join("images")).await.unwrap());
        let queue =
            Arc::new(SledMessageQueue::open(&SledQueueConfig::temporary("task_queue")).unwrap());

        let submitter = SubmitCaptionHandler::new(
            status_store.clone(),
            blob_store.clone(),
            queue.clone(),
            SubmissionPolicy::default(),
        );

        Self {
            _dir: dir,
            status: GetTaskStatusHandler::new(status_store.clone()),
            result: GetTaskResultHandler::new(status_store.clone()),
            error: GetTaskErrorHandler::new(status_store.clone()),
            status_store,
            queue,
            blob_store,
            submitter,
        }
    }

    async fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryStatusStore::new())).await
    }

    async fn sqlite() -> Self {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Self::with_store(Arc::new(SqliteStatusStore::new(pool))).await
    }

    fn worker(&self, engine: Arc<FakeCaptionEngine>, engine_timeout: Duration) -> CaptionWorker {
        let config = CaptionWorkerConfig {
            engine_timeout,
            poll_interval: Duration::from_millis(50),
            ..CaptionWorkerConfig::default()
        };
        CaptionWorker::new(
            config,
            self.queue.clone(),
            self.status_store.clone(),
            self.blob_store.clone(),
            engine,
        )
    }

    async fn submit(&self, extension: &str) -> Result<String, ApplicationError> {
        self.submitter
            .handle(SubmitCaption {
                image_data: b"fake image bytes".to_vec(),
                extension: extension.to_string(),
            })
            .await
            .map(|r| r.task_id.to_string())
    }

    async fn status_of(&self, task_id: &str) -> TaskStatus {
        self.status
            .handle(GetTaskStatus {
                task_id: task_id.to_string(),
            })
            .await
            .unwrap()
            .status
    }
}

#[tokio::test]
async fn test_png_captioned_successfully() {
    for harness in [Harness::in_memory().await, Harness::sqlite().await] {
        let engine = Arc::new(FakeCaptionEngine::returning("a cat sitting on a couch"));
        let worker = harness.worker(engine.clone(), Duration::from_secs(5));

        let task_id = harness.submit("png").await.unwrap();
        assert_eq!(harness.status_of(&task_id).await, TaskStatus::Pending);

        let outcome = worker.run_once().await.unwrap();
        assert_eq!(outcome, Some(DeliveryOutcome::Succeeded));

        assert_eq!(harness.status_of(&task_id).await, TaskStatus::Success);
        let view = harness
            .result
            .handle(GetTaskResult {
                task_id: task_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(view.result, "a cat sitting on a couch");

        let err = harness
            .error
            .handle(GetTaskError { task_id })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));

        let stats = harness.queue.stats().await.unwrap();
        assert_eq!((stats.ready, stats.in_flight), (0, 0));
        assert_eq!(engine.calls(), 1);
    }
}

#[tokio::test]
async fn test_engine_timeout_recorded_as_failure() {
    let harness = Harness::sqlite().await;
    let engine = Arc::new(
        FakeCaptionEngine::returning("too late").with_delay(Duration::from_millis(500)),
    );
    let worker = harness.worker(engine, Duration::from_millis(50));

    let task_id = harness.submit("jpg").await.unwrap();
    let outcome = worker.run_once().await.unwrap();
    assert_eq!(outcome, Some(DeliveryOutcome::Failed));

    assert_eq!(harness.status_of(&task_id).await, TaskStatus::Failure);
    let view = harness
        .error
        .handle(GetTaskError {
            task_id: task_id.clone(),
        })
        .await
        .unwrap();
    assert!(view.error.contains("timed out"), "error was {:?}", view.error);

    let err = harness
        .result
        .handle(GetTaskResult { task_id })
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::NotFound { .. }));
}

#[tokio::test]
async fn test_unsupported_extension_leaves_no_trace() {
    let harness = Harness::in_memory().await;

    let err = harness.submit("pdf").await.unwrap_err();
    assert!(matches!(err, ApplicationError::ValidationError(_)));

    let stats = harness.queue.stats().await.unwrap();
    assert_eq!(stats.ready, 0);

    let mut entries = tokio::fs::read_dir(harness.blob_store.base_dir()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_delivery_is_noop() {
    let harness = Harness::in_memory().await;
    let engine = Arc::new(FakeCaptionEngine::returning("a dog on the grass"));
    let worker = harness.worker(engine.clone(), Duration::from_secs(5));

    let task_id = harness.submit("jpeg").await.unwrap();
    assert_eq!(
        worker.run_once().await.unwrap(),
        Some(DeliveryOutcome::Succeeded)
    );

    // 同一任务再次入队，模拟至少一次投递
    let id = TaskId::parse(&task_id).unwrap();
    let extension = ImageExtension::restore("jpeg");
    harness
        .queue
        .publish(&QueueMessage::new(id, extension))
        .await
        .unwrap();

    assert_eq!(
        worker.run_once().await.unwrap(),
        Some(DeliveryOutcome::Duplicate)
    );
    assert_eq!(engine.calls(), 1);

    let view = harness
        .result
        .handle(GetTaskResult { task_id })
        .await
        .unwrap();
    assert_eq!(view.result, "a dog on the grass");
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let harness = Harness::sqlite().await;
    let task_id = harness.submit("png").await.unwrap();
    let id = TaskId::parse(&task_id).unwrap();

    harness.status_store.mark_processing(&id).await.unwrap();
    harness
        .status_store
        .mark_failure(&id, "engine crashed")
        .await
        .unwrap();

    assert!(harness.status_store.mark_processing(&id).await.is_err());
    assert!(harness
        .status_store
        .mark_success(&id, "late result")
        .await
        .is_err());

    assert_eq!(harness.status_of(&task_id).await, TaskStatus::Failure);
    let view = harness
        .error
        .handle(GetTaskError { task_id })
        .await
        .unwrap();
    assert_eq!(view.error, "engine crashed");
}

#[tokio::test]
async fn test_unknown_and_malformed_ids_not_found() {
    let harness = Harness::in_memory().await;

    for raw in [TaskId::new().to_string(), "not-a-task-id".to_string()] {
        let err = harness
            .status
            .handle(GetTaskStatus {
                task_id: raw.clone(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
    }
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_ids() {
    let harness = Arc::new(Harness::in_memory().await);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move { harness.submit("png").await }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 20);
    assert_eq!(harness.queue.stats().await.unwrap().ready, 20);
}

#[tokio::test]
async fn test_worker_drains_queue_until_cancelled() {
    let harness = Harness::in_memory().await;
    let engine = Arc::new(FakeCaptionEngine::returning("a photo"));
    let worker = harness.worker(engine.clone(), Duration::from_secs(5));

    let mut task_ids = Vec::new();
    for _ in 0..5 {
        task_ids.push(harness.submit("png").await.unwrap());
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(worker.run(cancel.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut done = 0;
        for task_id in &task_ids {
            if harness.status_of(task_id).await == TaskStatus::Success {
                done += 1;
            }
        }
        if done == task_ids.len() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "worker did not drain queue");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(engine.calls(), 5);
}
