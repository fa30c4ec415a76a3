//! Process Caption Engine - 以子进程方式调用外部描述程序
//!
//! 直接执行程序 + 参数列表，不经过 shell。参数中的 `{image}` 占位符替换为图片路径，
//! 没有任何参数包含占位符时，图片路径追加为最后一个参数。
//!
//! 约定：退出码 0 且 stdout 非空，stdout（去掉首尾空白）即描述文本

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::application::ports::{CaptionEnginePort, CaptionRequest, EngineError};

/// 图片路径占位符
pub const IMAGE_PLACEHOLDER: &str = "{image}";

/// 单个输出流最多读取的字节数
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// 进程引擎配置
#[derive(Debug, Clone)]
pub struct ProcessEngineConfig {
    /// 可执行程序
    pub program: String,
    /// 参数列表
    pub args: Vec<String>,
    /// 工作目录，None 表示继承当前进程
    pub working_dir: Option<PathBuf>,
    /// 额外环境变量
    pub env: HashMap<String, String>,
    /// 超时后杀掉子进程
    pub timeout: Duration,
}

impl Default for ProcessEngineConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["caption.py".to_string(), IMAGE_PLACEHOLDER.to_string()],
            working_dir: None,
            env: HashMap::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ProcessEngineConfig {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// 进程描述引擎
pub struct ProcessCaptionEngine {
    config: ProcessEngineConfig,
}

impl ProcessCaptionEngine {
    pub fn new(config: ProcessEngineConfig) -> Self {
        Self { config }
    }

    /// 生成实际的参数列表
    fn build_args(&self, image_path: &Path) -> Vec<String> {
        let image = image_path.to_string_lossy();
        let mut substituted = false;

        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                if arg.contains(IMAGE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(IMAGE_PLACEHOLDER, &image)
                } else {
                    arg.clone()
                }
            })
            .collect();

        if !substituted {
            args.push(image.into_owned());
        }
        args
    }
}

/// 读取输出流，只保留前 `MAX_OUTPUT_BYTES` 字节
///
/// 超出部分继续读到 sink，子进程不会因管道关闭收到 SIGPIPE
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

#[async_trait]
impl CaptionEnginePort for ProcessCaptionEngine {
    async fn caption(&self, request: &CaptionRequest) -> Result<String, EngineError> {
        let args = self.build_args(&request.image_path);

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            task_id = %request.task_id,
            program = %self.config.program,
            args = ?args,
            "Spawning caption process"
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            EngineError::IoError(format!("failed to spawn {}: {}", self.config.program, e))
        })?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(EngineError::IoError(e.to_string())),
            Err(_) => {
                // 显式杀掉并回收，避免留下僵尸进程
                let _ = child.kill().await;
                tracing::warn!(
                    task_id = %request.task_id,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Caption process killed after timeout"
                );
                return Err(EngineError::Timeout(self.config.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

        tracing::debug!(
            task_id = %request.task_id,
            exit_code = ?status.code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Caption process exited"
        );

        if !status.success() {
            let detail = stderr.trim();
            return Err(EngineError::Failed(match status.code() {
                Some(code) if detail.is_empty() => format!("process exited with code {}", code),
                Some(code) => format!("process exited with code {}: {}", code, detail),
                None if detail.is_empty() => "process terminated by signal".to_string(),
                None => format!("process terminated by signal: {}", detail),
            }));
        }

        let caption = stdout.trim();
        if caption.is_empty() {
            return Err(EngineError::InvalidOutput(
                "process produced no caption on stdout".to_string(),
            ));
        }

        Ok(caption.to_string())
    }

    fn name(&self) -> &'static str {
        "process"
    }

    async fn health_check(&self) -> bool {
        let program = Path::new(&self.config.program);
        if program.components().count() > 1 {
            return program.is_file();
        }
        // 裸程序名，在 PATH 中查找
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }
}
