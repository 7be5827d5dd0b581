use std::future::Future;
use std::time::Duration;

use tracing::warn;

use slicer_core::Result;

/// 指数退避重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 随机抖动占退避间隔的比例（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Default::default()
        }
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 0 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exponential = base * 2f64.powi(attempt.min(16) as i32);
        let jitter = exponential * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        Duration::from_secs_f64((exponential + jitter).max(base))
    }

    /// 执行操作，失败时按策略重试，返回最后一次的错误
    pub async fn run<F, Fut, T>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "{}失败 (重试 {}/{}), {}ms 后重试: {}",
                        what,
                        attempt,
                        self.max_attempts - 1,
                        delay.as_millis(),
                        e
                    );
                    metrics::counter!("slicer_retries_total", "operation" => what.to_string())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
