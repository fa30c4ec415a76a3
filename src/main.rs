//! Capflow - 异步图片描述任务系统
//!
//! 启动顺序：配置 → 日志 → 存储（SQLite / 图片目录 / sled 队列）→ 引擎 → Worker → HTTP。
//! 关闭顺序相反：HTTP 停止 → Worker 取消并等待 → 队列 flush

use std::sync::Arc;
use std::time::Duration;

use capflow::application::SubmissionPolicy;
use capflow::config::{load_config, print_config, AppConfig};
use capflow::infrastructure::adapters::{build_engine, FileBlobStore};
use capflow::infrastructure::http::{AppState, HttpServer};
use capflow::infrastructure::persistence::sled::{SledMessageQueue, SledQueueConfig};
use capflow::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteStatusStore,
};
use capflow::infrastructure::worker::{BackoffConfig, CaptionWorker, CaptionWorkerConfig};
use tokio_util::sync::CancellationToken;

fn init_logging(config: &AppConfig) {
    let log_filter = format!(
        "{},capflow={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_logging(&config);

    tracing::info!("Capflow - 异步图片描述任务系统");
    print_config(&config);

    // 确保数据目录存在
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if let Some(parent) = std::path::Path::new(&config.queue.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Status Store
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;
    let status_store = Arc::new(SqliteStatusStore::new(pool.clone()));

    // Blob Store
    let blob_store = Arc::new(FileBlobStore::new(&config.storage.image_dir).await?);

    // Message Queue：整个进程共享一个句柄
    let queue = Arc::new(SledMessageQueue::open(&SledQueueConfig {
        db_path: config.queue.path.clone(),
        name: config.queue.name.clone(),
        temporary: false,
    })?);

    // Caption Engine
    let engine = build_engine(&config.engine, config.worker.engine_timeout())?;
    if !engine.health_check().await {
        tracing::warn!(
            engine = engine.name(),
            "Caption engine health check failed, tasks will fail until it is available"
        );
    }

    // Worker
    let worker_config = CaptionWorkerConfig {
        concurrency: config.worker.concurrency,
        engine_timeout: config.worker.engine_timeout(),
        poll_interval: config.queue.poll_interval(),
        max_deliveries: config.queue.max_deliveries,
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(config.worker.backoff_initial_ms),
            max_delay: Duration::from_millis(config.worker.backoff_max_ms),
            multiplier: config.worker.backoff_multiplier,
        },
    };
    let worker = CaptionWorker::new(
        worker_config,
        queue.clone(),
        status_store.clone(),
        blob_store.clone(),
        engine,
    );

    let cancel = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));

    // HTTP 服务器
    let policy = SubmissionPolicy {
        allowed_extensions: config.storage.allowed_extensions.clone(),
        max_upload_size: config.storage.max_upload_size,
    };
    let state = AppState::new(status_store, blob_store, queue.clone(), policy);
    let server = HttpServer::new(config.server.clone(), state);

    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    // 等待 Worker 处理完当前消息
    cancel.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task failed");
    }

    queue.flush().await?;
    pool.close().await;

    tracing::info!("Shutdown complete");

    Ok(())
}
