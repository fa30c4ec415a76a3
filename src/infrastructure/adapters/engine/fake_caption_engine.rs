//! Fake Caption Engine - 用于测试和本地运行的引擎
//!
//! 不调用任何外部程序，返回固定文本或固定错误

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::application::ports::{CaptionEnginePort, CaptionRequest, EngineError};

/// Fake Caption Engine 配置
#[derive(Debug, Clone)]
pub struct FakeCaptionEngineConfig {
    /// 固定返回的描述
    pub caption: String,
    /// 模拟推理延迟
    pub delay: Duration,
    /// 设置后总是以该信息失败
    pub fail_with: Option<String>,
}

impl Default for FakeCaptionEngineConfig {
    fn default() -> Self {
        Self {
            caption: "a photo".to_string(),
            delay: Duration::ZERO,
            fail_with: None,
        }
    }
}

/// Fake Caption Engine
pub struct FakeCaptionEngine {
    config: FakeCaptionEngineConfig,
    calls: AtomicUsize,
}

impl FakeCaptionEngine {
    pub fn new(config: FakeCaptionEngineConfig) -> Self {
        tracing::info!(
            caption = %config.caption,
            delay_ms = config.delay.as_millis() as u64,
            "FakeCaptionEngine initialized"
        );
        Self {
            config,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(caption: impl Into<String>) -> Self {
        Self::new(FakeCaptionEngineConfig {
            caption: caption.into(),
            ..Default::default()
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(FakeCaptionEngineConfig {
            fail_with: Some(message.into()),
            ..Default::default()
        })
    }

    /// 被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionEnginePort for FakeCaptionEngine {
    async fn caption(&self, request: &CaptionRequest) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            task_id = %request.task_id,
            image = %request.image_path.display(),
            "FakeCaptionEngine: returning fixed caption"
        );

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        match &self.config.fail_with {
            Some(message) => Err(EngineError::Failed(message.clone())),
            None => Ok(self.config.caption.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> CaptionRequest {
        CaptionRequest {
            task_id: "t".to_string(),
            image_path: PathBuf::from("cat.png"),
        }
    }

    #[tokio::test]
    async fn test_returns_fixed_caption() {
        let engine = FakeCaptionEngine::returning("a cat sitting on a couch");
        assert_eq!(engine.caption(&request()).await.unwrap(), "a cat sitting on a couch");
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_engine() {
        let engine = FakeCaptionEngine::failing("model crashed");
        match engine.caption(&request()).await {
            Err(EngineError::Failed(msg)) => assert_eq!(msg, "model crashed"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
