use std::time::Duration;

use crate::config::Config;
use crate::core::error::DownloadError;

/// 命令行程序在任务失败后重新发起下载的策略
///
/// 引擎本身从不重试，这里只决定是否以及何时再次调用 `download`。
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免重试风暴
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay: Duration::from_secs(config.retry_delay),
            max_delay: Duration::from_secs(config.retry_max_delay.max(config.retry_delay)),
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &DownloadError, retry_count: usize) -> bool {
        if retry_count >= self.max_retries {
            return false;
        }
        match error {
            DownloadError::NetworkError(_) | DownloadError::SizeMismatch { .. } => true,
            // 5xx 和 429 通常是暂时的
            DownloadError::ServerError(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn get_delay(&self, retry_count: usize) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(retry_count as i32);

        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (delay_secs + jitter).max(0.1); // 最小延迟100ms

        Duration::from_secs_f64(final_delay).min(self.max_delay)
    }
}
