//! Caption Worker - Background Caption Task Processor
//!
//! 消费 → 处理 → 确认：
//! 1. 读取任务状态，已是终态则直接 ack（重复投递）
//! 2. 标记 Processing
//! 3. 在超时预算内调用引擎
//! 4. 写入 Success / Failure，落盘后再 ack
//!
//! 引擎失败只会变成任务的 Failure，不会中断循环；
//! 存储 / 队列故障则 nack 该消息，并在循环层面退避

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::backoff::{Backoff, BackoffConfig};
use crate::application::ports::{
    BlobStorePort, CaptionEnginePort, CaptionRequest, Delivery, EngineError, MessageQueuePort,
    QueueError, StatusStoreError, StatusStorePort,
};
use crate::domain::task::TaskId;

/// Worker 配置
#[derive(Debug, Clone)]
pub struct CaptionWorkerConfig {
    /// 并发的消费循环数
    pub concurrency: usize,
    /// 单次引擎调用的超时
    pub engine_timeout: Duration,
    /// 队列空闲时单次 receive 的最长等待
    pub poll_interval: Duration,
    /// 超过该投递次数的消息进入死信
    pub max_deliveries: u32,
    pub backoff: BackoffConfig,
}

impl Default for CaptionWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            engine_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            max_deliveries: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

/// 基础设施错误，消息会被 nack 并触发退避
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Status store error: {0}")]
    StatusStore(#[from] StatusStoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// 单条投递的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 引擎成功，结果已写入
    Succeeded,
    /// 引擎失败或超时，错误已写入
    Failed,
    /// 任务已是终态，仅确认消息
    Duplicate,
    /// 消息进入死信
    DeadLettered,
}

/// 描述任务 Worker
pub struct CaptionWorker {
    config: CaptionWorkerConfig,
    queue: Arc<dyn MessageQueuePort>,
    status_store: Arc<dyn StatusStorePort>,
    blob_store: Arc<dyn BlobStorePort>,
    engine: Arc<dyn CaptionEnginePort>,
}

impl CaptionWorker {
    pub fn new(
        config: CaptionWorkerConfig,
        queue: Arc<dyn MessageQueuePort>,
        status_store: Arc<dyn StatusStorePort>,
        blob_store: Arc<dyn BlobStorePort>,
        engine: Arc<dyn CaptionEnginePort>,
    ) -> Self {
        Self {
            config,
            queue,
            status_store,
            blob_store,
            engine,
        }
    }

    /// 启动 Worker，直到 `cancel` 被触发且所有循环退出
    pub async fn run(self, cancel: CancellationToken) {
        let worker = Arc::new(self);
        let concurrency = worker.config.concurrency.max(1);

        tracing::info!(
            concurrency = concurrency,
            engine = worker.engine.name(),
            engine_timeout_ms = worker.config.engine_timeout.as_millis() as u64,
            "CaptionWorker started"
        );

        let mut loops = JoinSet::new();
        for worker_id in 0..concurrency {
            let worker = worker.clone();
            let cancel = cancel.clone();
            loops.spawn(async move { worker.run_loop(worker_id, cancel).await });
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker loop panicked");
            }
        }

        tracing::info!("CaptionWorker stopped");
    }

    async fn run_loop(&self, worker_id: usize, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.queue.receive(self.config.poll_interval) => received,
            };

            match received {
                Ok(None) => {}
                Ok(Some(delivery)) => match self.handle(&delivery).await {
                    Ok(outcome) => {
                        backoff.reset();
                        tracing::debug!(
                            worker_id = worker_id,
                            task_id = %delivery.message.task_id,
                            outcome = ?outcome,
                            "Delivery handled"
                        );
                    }
                    Err(_) => {
                        if !backoff.wait(&cancel).await {
                            break;
                        }
                    }
                },
                Err(e) => {
                    tracing::error!(worker_id = worker_id, error = %e, "Failed to receive from queue");
                    if !backoff.wait(&cancel).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(worker_id = worker_id, "Worker loop exited");
    }

    /// 取一条消息并处理（不等待），队列为空返回 `Ok(None)`
    pub async fn run_once(&self) -> Result<Option<DeliveryOutcome>, WorkerError> {
        match self.queue.receive(Duration::ZERO).await? {
            Some(delivery) => self.handle(&delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// 处理投递，基础设施失败时 nack
    async fn handle(&self, delivery: &Delivery) -> Result<DeliveryOutcome, WorkerError> {
        match self.process_delivery(delivery).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(
                    task_id = %delivery.message.task_id,
                    delivery_tag = delivery.tag,
                    error = %e,
                    "Infrastructure failure, returning message to queue"
                );
                if let Err(nack_err) = self.queue.nack(delivery.tag).await {
                    tracing::error!(
                        delivery_tag = delivery.tag,
                        error = %nack_err,
                        "Failed to nack message"
                    );
                }
                Err(e)
            }
        }
    }

    /// 驱动一条投递对应任务的状态机
    pub async fn process_delivery(
        &self,
        delivery: &Delivery,
    ) -> Result<DeliveryOutcome, WorkerError> {
        let task_id = delivery.message.task_id;

        let Some(task) = self.status_store.find(&task_id).await? else {
            self.queue.dead_letter(delivery.tag, "unknown task").await?;
            return Ok(DeliveryOutcome::DeadLettered);
        };

        // 幂等保护
        if task.is_terminal() {
            tracing::info!(
                task_id = %task_id,
                status = %task.status(),
                "Task already terminal, acknowledging duplicate delivery"
            );
            self.queue.ack(delivery.tag).await?;
            return Ok(DeliveryOutcome::Duplicate);
        }

        if delivery.delivery_count > self.config.max_deliveries {
            return self.give_up(delivery, &task_id).await;
        }

        match self.status_store.mark_processing(&task_id).await {
            Ok(()) => {}
            Err(StatusStoreError::InvalidTransition { .. }) => {
                // 另一个 worker 已经写入终态
                self.queue.ack(delivery.tag).await?;
                return Ok(DeliveryOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            task_id = %task_id,
            delivery_count = delivery.delivery_count,
            engine = self.engine.name(),
            "Captioning started"
        );

        let outcome = match self.invoke_engine(&task_id, delivery).await {
            Ok(caption) => {
                tracing::info!(task_id = %task_id, caption_len = caption.len(), "Caption succeeded");
                self.status_store
                    .mark_success(&task_id, &caption)
                    .await
                    .map(|_| DeliveryOutcome::Succeeded)
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Caption failed");
                self.status_store
                    .mark_failure(&task_id, &e.to_string())
                    .await
                    .map(|_| DeliveryOutcome::Failed)
            }
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(StatusStoreError::InvalidTransition { from, .. }) => {
                tracing::info!(
                    task_id = %task_id,
                    status = %from,
                    "Task finished by another worker, dropping result"
                );
                DeliveryOutcome::Duplicate
            }
            Err(e) => return Err(e.into()),
        };

        // 终态已落盘，才确认消息
        self.queue.ack(delivery.tag).await?;
        Ok(outcome)
    }

    async fn invoke_engine(
        &self,
        task_id: &TaskId,
        delivery: &Delivery,
    ) -> Result<String, EngineError> {
        let extension = &delivery.message.extension;
        if !self.blob_store.exists(task_id, extension).await {
            return Err(EngineError::Failed(format!(
                "image for task {} is missing",
                task_id
            )));
        }

        let request = CaptionRequest {
            task_id: task_id.to_string(),
            image_path: self.blob_store.image_path(task_id, extension),
        };

        match tokio::time::timeout(self.config.engine_timeout, self.engine.caption(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.config.engine_timeout)),
        }
    }

    /// 超过投递上限：记录 Failure 并移入死信
    async fn give_up(
        &self,
        delivery: &Delivery,
        task_id: &TaskId,
    ) -> Result<DeliveryOutcome, WorkerError> {
        let reason = format!("exceeded {} delivery attempts", self.config.max_deliveries);

        tracing::warn!(
            task_id = %task_id,
            delivery_count = delivery.delivery_count,
            "Delivery limit reached"
        );

        match self.status_store.mark_processing(task_id).await {
            Ok(()) | Err(StatusStoreError::InvalidTransition { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        match self.status_store.mark_failure(task_id, &reason).await {
            Ok(()) | Err(StatusStoreError::InvalidTransition { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        self.queue.dead_letter(delivery.tag, &reason).await?;
        Ok(DeliveryOutcome::DeadLettered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{QueueMessage, QueueStats};
    use crate::domain::task::{ImageExtension, Task, TaskStatus};
    use crate::infrastructure::adapters::{FakeCaptionEngine, FileBlobStore};
    use crate::infrastructure::memory::InMemoryStatusStore;
    use crate::infrastructure::persistence::sled::{SledMessageQueue, SledQueueConfig};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        queue: Arc<SledMessageQueue>,
        store: Arc<InMemoryStatusStore>,
        blobs: Arc<FileBlobStore>,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        Harness {
            queue: Arc::new(SledMessageQueue::open(&SledQueueConfig::temporary("task_queue")).unwrap()),
            store: Arc::new(InMemoryStatusStore::new()),
            blobs: Arc::new(FileBlobStore::new(dir.path()).await.unwrap()),
            _dir: dir,
        }
    }

    fn config() -> CaptionWorkerConfig {
        CaptionWorkerConfig {
            engine_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            max_deliveries: 3,
            ..Default::default()
        }
    }

    impl Harness {
        fn worker(&self, engine: Arc<dyn CaptionEnginePort>) -> CaptionWorker {
            CaptionWorker::new(
                config(),
                self.queue.clone(),
                self.store.clone(),
                self.blobs.clone(),
                engine,
            )
        }

        /// 按提交顺序写入图片、状态、消息
        async fn submit(&self) -> TaskId {
            let id = TaskId::new();
            let ext = ImageExtension::restore("png");
            let path = self.blobs.save(&id, &ext, b"png bytes").await.unwrap();
            self.store
                .create(&Task::new(id, ext.clone(), path.to_string_lossy()))
                .await
                .unwrap();
            self.queue.publish(&QueueMessage::new(id, ext)).await.unwrap();
            id
        }

        async fn task(&self, id: &TaskId) -> Task {
            self.store.find(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_success_persists_result_then_acks() {
        let h = harness().await;
        let worker = h.worker(Arc::new(FakeCaptionEngine::returning("a cat sitting on a couch")));
        let id = h.submit().await;

        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::Succeeded));

        let task = h.task(&id).await;
        assert_eq!(task.status(), TaskStatus::Success);
        assert_eq!(task.result(), Some("a cat sitting on a couch"));
        assert_eq!(h.queue.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_engine_failure_recorded_not_retried() {
        let h = harness().await;
        let worker = h.worker(Arc::new(FakeCaptionEngine::failing("model crashed")));
        let id = h.submit().await;

        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::Failed));

        let task = h.task(&id).await;
        assert_eq!(task.status(), TaskStatus::Failure);
        assert!(task.error().unwrap().contains("model crashed"));
        assert_eq!(h.queue.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_engine_timeout_recorded() {
        let h = harness().await;
        let engine = FakeCaptionEngine::returning("too late").with_delay(Duration::from_secs(5));
        let worker = h.worker(Arc::new(engine));
        let id = h.submit().await;

        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::Failed));

        let task = h.task(&id).await;
        assert_eq!(task.status(), TaskStatus::Failure);
        assert!(task.error().unwrap().contains("timed out"));
        assert!(task.result().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_noop() {
        let h = harness().await;
        let engine = Arc::new(FakeCaptionEngine::returning("first"));
        let worker = h.worker(engine.clone());
        let id = h.submit().await;
        worker.run_once().await.unwrap();

        // 同一任务的第二条消息
        h.queue
            .publish(&QueueMessage::new(id, ImageExtension::restore("png")))
            .await
            .unwrap();
        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::Duplicate));

        assert_eq!(engine.calls(), 1);
        assert_eq!(h.task(&id).await.result(), Some("first"));
        assert_eq!(h.queue.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_processing_task_is_rerun() {
        let h = harness().await;
        let id = h.submit().await;
        // 上一个 worker 标记 Processing 后崩溃
        h.store.mark_processing(&id).await.unwrap();

        let worker = h.worker(Arc::new(FakeCaptionEngine::returning("a dog")));
        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::Succeeded));

        let task = h.task(&id).await;
        assert_eq!(task.status(), TaskStatus::Success);
        assert_eq!(task.attempts(), 2);
    }

    #[tokio::test]
    async fn test_unknown_task_dead_lettered() {
        let h = harness().await;
        h.queue
            .publish(&QueueMessage::new(TaskId::new(), ImageExtension::restore("png")))
            .await
            .unwrap();

        let worker = h.worker(Arc::new(FakeCaptionEngine::returning("x")));
        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::DeadLettered));
        assert_eq!(h.queue.stats().await.unwrap().dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_missing_blob_is_task_failure() {
        let h = harness().await;
        let id = TaskId::new();
        let ext = ImageExtension::restore("jpg");
        h.store
            .create(&Task::new(id, ext.clone(), "gone.jpg"))
            .await
            .unwrap();
        h.queue.publish(&QueueMessage::new(id, ext)).await.unwrap();

        let worker = h.worker(Arc::new(FakeCaptionEngine::returning("x")));
        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::Failed));
        assert!(h.task(&id).await.error().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_redelivery_cap_dead_letters_and_fails_task() {
        let h = harness().await;
        let id = h.submit().await;

        // 模拟多次崩溃：领取后退回
        for _ in 0..3 {
            let d = h.queue.receive(Duration::ZERO).await.unwrap().unwrap();
            h.queue.nack(d.tag).await.unwrap();
        }

        let engine = Arc::new(FakeCaptionEngine::returning("never"));
        let worker = h.worker(engine.clone());
        assert_eq!(worker.run_once().await.unwrap(), Some(DeliveryOutcome::DeadLettered));

        let task = h.task(&id).await;
        assert_eq!(task.status(), TaskStatus::Failure);
        assert_eq!(task.error(), Some("exceeded 3 delivery attempts"));
        assert_eq!(engine.calls(), 0);

        let stats = h.queue.stats().await.unwrap();
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.ready, 0);
    }

    struct UnavailableStore;

    #[async_trait]
    impl StatusStorePort for UnavailableStore {
        async fn create(&self, _: &Task) -> Result<(), StatusStoreError> {
            Err(StatusStoreError::DatabaseError("database is locked".into()))
        }
        async fn find(&self, _: &TaskId) -> Result<Option<Task>, StatusStoreError> {
            Err(StatusStoreError::DatabaseError("database is locked".into()))
        }
        async fn mark_processing(&self, _: &TaskId) -> Result<(), StatusStoreError> {
            Err(StatusStoreError::DatabaseError("database is locked".into()))
        }
        async fn mark_success(&self, _: &TaskId, _: &str) -> Result<(), StatusStoreError> {
            Err(StatusStoreError::DatabaseError("database is locked".into()))
        }
        async fn mark_failure(&self, _: &TaskId, _: &str) -> Result<(), StatusStoreError> {
            Err(StatusStoreError::DatabaseError("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_infrastructure_failure_leaves_message_unacked() {
        let h = harness().await;
        h.submit().await;

        let worker = CaptionWorker::new(
            config(),
            h.queue.clone(),
            Arc::new(UnavailableStore),
            h.blobs.clone(),
            Arc::new(FakeCaptionEngine::returning("x")),
        );

        assert!(matches!(worker.run_once().await, Err(WorkerError::StatusStore(_))));

        let stats = h.queue.stats().await.unwrap();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_on_cancel() {
        let h = harness().await;
        let ids = [h.submit().await, h.submit().await, h.submit().await];

        let mut cfg = config();
        cfg.concurrency = 2;
        let worker = CaptionWorker::new(
            cfg,
            h.queue.clone(),
            h.store.clone(),
            h.blobs.clone(),
            Arc::new(FakeCaptionEngine::returning("ok")),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let mut done = 0;
            for id in &ids {
                if h.task(id).await.status() == TaskStatus::Success {
                    done += 1;
                }
            }
            if done == ids.len() || tokio::time::Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        for id in &ids {
            assert_eq!(h.task(id).await.status(), TaskStatus::Success);
        }
    }
}
