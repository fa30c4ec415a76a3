//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, EngineKind};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `CAPFLOW_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `CAPFLOW_SERVER__PORT=8080`
/// - `CAPFLOW_WORKER__CONCURRENCY=4`
/// - `CAPFLOW_ENGINE__KIND=http`
/// - `CAPFLOW_ENGINE__ARGS=caption.py,--image,{image}`（逗号分隔）
/// - `CAPFLOW_STORAGE__ALLOWED_EXTENSIONS=png,jpg`
/// - `CAPFLOW_ENGINE__ENV=MODEL=blip,DEVICE=cpu`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5060)?
        .set_default("server.max_body_bytes", 16_u64 * 1024 * 1024)?
        .set_default("storage.image_dir", "data/images")?
        .set_default("storage.allowed_extensions", vec!["png", "jpg", "jpeg"])?
        .set_default("storage.max_upload_size", 10_u64 * 1024 * 1024)?
        .set_default("database.path", "data/capflow.db")?
        .set_default("database.max_connections", 5)?
        .set_default("queue.path", "data/queue.sled")?
        .set_default("queue.name", "task_queue")?
        .set_default("queue.poll_interval_ms", 1000)?
        .set_default("queue.max_deliveries", 5)?
        .set_default("worker.concurrency", 1)?
        .set_default("worker.engine_timeout_secs", 120)?
        .set_default("worker.backoff_initial_ms", 500)?
        .set_default("worker.backoff_max_ms", 30_000)?
        .set_default("worker.backoff_multiplier", 2.0)?
        .set_default("engine.kind", "process")?
        .set_default("engine.program", "python3")?
        .set_default("engine.args", vec!["caption.py", "{image}"])?
        .set_default("engine.url", "http://localhost:8000")?
        .set_default("engine.fake_caption", "a photo")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("CAPFLOW")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("storage.allowed_extensions")
            .with_list_parse_key("engine.args")
            .with_list_parse_key("engine.env")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    if config.database.path.is_empty() {
        return Err(invalid("Database path cannot be empty"));
    }

    if config.storage.allowed_extensions.is_empty() {
        return Err(invalid("Allowed extensions cannot be empty"));
    }

    if config.queue.name.is_empty() {
        return Err(invalid("Queue name cannot be empty"));
    }
    if config.queue.path.is_empty() {
        return Err(invalid("Queue path cannot be empty"));
    }
    if config.queue.poll_interval_ms == 0 {
        return Err(invalid("Queue poll interval cannot be 0"));
    }
    if config.queue.max_deliveries == 0 {
        return Err(invalid("Queue max_deliveries cannot be 0"));
    }

    if config.worker.concurrency == 0 {
        return Err(invalid("Worker concurrency cannot be 0"));
    }
    if config.worker.engine_timeout_secs == 0 {
        return Err(invalid("Engine timeout cannot be 0"));
    }
    if config.worker.backoff_initial_ms == 0 {
        return Err(invalid("Backoff initial delay cannot be 0"));
    }
    if config.worker.backoff_max_ms < config.worker.backoff_initial_ms {
        return Err(invalid("Backoff max delay cannot be less than the initial delay"));
    }
    if config.worker.backoff_multiplier < 1.0 {
        return Err(invalid("Backoff multiplier must be at least 1.0"));
    }

    match config.engine.kind {
        EngineKind::Process if config.engine.program.is_empty() => {
            return Err(invalid("Engine program cannot be empty for process engine"));
        }
        EngineKind::Http if config.engine.url.is_empty() => {
            return Err(invalid("Engine URL cannot be empty for http engine"));
        }
        _ => {}
    }

    config.engine.env_map().map_err(ConfigError::ValidationError)?;

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Max Body: {} bytes", config.server.max_body_bytes);
    tracing::info!("Image Directory: {:?}", config.storage.image_dir);
    tracing::info!("Allowed Extensions: {:?}", config.storage.allowed_extensions);
    tracing::info!("Max Upload: {} bytes", config.storage.max_upload_size);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Database Max Connections: {}", config.database.max_connections);
    tracing::info!("Queue: {} ({})", config.queue.name, config.queue.path);
    tracing::info!("Queue Max Deliveries: {}", config.queue.max_deliveries);
    tracing::info!("Worker Concurrency: {}", config.worker.concurrency);
    tracing::info!("Engine Timeout: {}s", config.worker.engine_timeout_secs);
    tracing::info!("Engine: {}", config.engine.kind.as_str());
    match config.engine.kind {
        EngineKind::Process => {
            tracing::info!("Engine Command: {} {:?}", config.engine.program, config.engine.args);
        }
        EngineKind::Http => tracing::info!("Engine URL: {}", config.engine.url),
        EngineKind::Fake => {}
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
