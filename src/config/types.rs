//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 图片存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 数据库配置（Status Store）
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 消息队列配置
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 描述引擎配置
    #[serde(default)]
    pub engine: EngineConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 请求体大小上限（字节）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5060
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024 // 16 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 图片存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 图片存储目录
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// 允许的扩展名（不带点，小写）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// 上传文件最大大小（字节），默认 10MB
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("data/images")
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
}

fn default_max_upload_size() -> u64 {
    10 * 1024 * 1024 // 10 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            allowed_extensions: default_allowed_extensions(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/capflow.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 消息队列配置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// sled 数据库路径
    #[serde(default = "default_queue_path")]
    pub path: String,

    /// 队列名
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// 空闲时单次 receive 的最长等待（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 最大投递次数，超过后进入死信
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

fn default_queue_path() -> String {
    "data/queue.sled".to_string()
}

fn default_queue_name() -> String {
    "task_queue".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_deliveries() -> u32 {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            name: default_queue_name(),
            poll_interval_ms: default_poll_interval_ms(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 并发消费循环数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// 引擎调用超时（秒）
    #[serde(default = "default_engine_timeout")]
    pub engine_timeout_secs: u64,

    /// 基础设施故障后的首次退避（毫秒）
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// 退避上限（毫秒）
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// 退避倍数
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_concurrency() -> usize {
    1
}

fn default_engine_timeout() -> u64 {
    120
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            engine_timeout_secs: default_engine_timeout(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl WorkerConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}

/// 引擎类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// 本地子进程
    #[default]
    Process,
    /// 外部 HTTP 服务
    Http,
    /// 固定输出（测试 / 本地调试）
    Fake,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Process => "process",
            EngineKind::Http => "http",
            EngineKind::Fake => "fake",
        }
    }
}

/// 描述引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,

    /// process: 可执行程序
    #[serde(default = "default_engine_program")]
    pub program: String,

    /// process: 参数列表，`{image}` 替换为图片路径
    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,

    /// process: 工作目录
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// process: 额外环境变量，`KEY=VALUE` 形式
    ///
    /// 键名保留大小写（配置文件中的表键会被转成小写）
    #[serde(default)]
    pub env: Vec<String>,

    /// http: 服务基础 URL
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// fake: 固定返回的描述
    #[serde(default = "default_fake_caption")]
    pub fake_caption: String,
}

fn default_engine_program() -> String {
    "python3".to_string()
}

fn default_engine_args() -> Vec<String> {
    vec!["caption.py".to_string(), "{image}".to_string()]
}

fn default_engine_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_fake_caption() -> String {
    "a photo".to_string()
}

impl EngineConfig {
    /// 解析 `KEY=VALUE` 环境变量列表
    pub fn env_map(&self) -> Result<HashMap<String, String>, String> {
        self.env
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.to_string()))
                }
                _ => Err(format!("invalid engine env entry: {:?}", entry)),
            })
            .collect()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            program: default_engine_program(),
            args: default_engine_args(),
            working_dir: None,
            env: Vec::new(),
            url: default_engine_url(),
            fake_caption: default_fake_caption(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
