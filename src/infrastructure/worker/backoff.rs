//! 指数退避
//!
//! 仅用于 worker 循环层面的基础设施故障（队列 / 存储不可达），不用于单个任务的重试

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 退避参数
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// 第一次等待时长
    pub initial_delay: Duration,
    /// 等待时长上限
    pub max_delay: Duration,
    /// 每次失败后的增长倍数
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// 计算下一次等待时长，不超过 `max_delay`
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// 单个 worker 循环持有的退避状态
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial_delay.min(config.max_delay),
            config,
            failures: 0,
        }
    }

    /// 下一次将要等待的时长
    pub fn current(&self) -> Duration {
        self.current
    }

    /// 连续失败次数
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// 成功处理一条消息后重置
    pub fn reset(&mut self) {
        if self.failures > 0 {
            tracing::debug!(failures = self.failures, "Backoff reset");
        }
        self.current = self.config.initial_delay.min(self.config.max_delay);
        self.failures = 0;
    }

    /// 返回本次等待时长，并推进到下一档
    pub fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.failures += 1;
        self.current = next_delay(self.current, &self.config);
        delay
    }

    /// 等待一次退避，被取消时返回 false
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.advance();
        tracing::warn!(
            delay_ms = delay.as_millis() as u64,
            failures = self.failures,
            "Backing off after infrastructure failure"
        );

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
