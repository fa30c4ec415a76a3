//! Caption Engine Adapters
//!
//! - `process`: 直接执行本地程序（默认）
//! - `http`: 调用外部描述服务
//! - `fake`: 固定输出，用于测试和本地调试

mod fake_caption_engine;
mod http_caption_engine;
mod process_caption_engine;

pub use fake_caption_engine::{FakeCaptionEngine, FakeCaptionEngineConfig};
pub use http_caption_engine::*;
pub use process_caption_engine::*;

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{CaptionEnginePort, EngineError};
use crate::config::{EngineConfig, EngineKind};

/// 根据配置创建引擎
pub fn build_engine(
    config: &EngineConfig,
    timeout: Duration,
) -> Result<Arc<dyn CaptionEnginePort>, EngineError> {
    let engine: Arc<dyn CaptionEnginePort> = match config.kind {
        EngineKind::Process => Arc::new(ProcessCaptionEngine::new(ProcessEngineConfig {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env_map().map_err(EngineError::Failed)?,
            timeout,
        })),
        EngineKind::Http => Arc::new(HttpCaptionEngine::new(
            HttpEngineConfig::new(config.url.clone()).with_timeout(timeout.as_secs().max(1)),
        )?),
        EngineKind::Fake => Arc::new(FakeCaptionEngine::returning(config.fake_caption.clone())),
    };

    tracing::info!(engine = engine.name(), "Caption engine created");
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_each_kind() {
        let mut config = EngineConfig::default();
        let timeout = Duration::from_secs(5);

        assert_eq!(build_engine(&config, timeout).unwrap().name(), "process");

        config.kind = EngineKind::Http;
        assert_eq!(build_engine(&config, timeout).unwrap().name(), "http");

        config.kind = EngineKind::Fake;
        assert_eq!(build_engine(&config, timeout).unwrap().name(), "fake");
    }
}
