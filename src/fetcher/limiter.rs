// src/fetcher/limiter.rs

use crate::error::*;
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;

/// 全部工作线程共享的出站请求令牌桶。只约束网络请求，不约束台账操作。
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl RateLimiter {
    /// 每分钟 `per_minute` 个令牌，突发容量与单次补充量一致，不囤积。
    pub fn per_minute(per_minute: u32) -> AppResult<Self> {
        let per_minute = NonZeroU32::new(per_minute)
            .ok_or_else(|| AppError::Config("速率上限必须大于 0".to_string()))?;
        let burst = NonZeroU32::new(per_minute.get().div_ceil(6).max(1)).unwrap();
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        Ok(Self {
            inner: governor::RateLimiter::direct(quota),
        })
    }

    /// 挂起当前任务直到拿到一个令牌。
    pub async fn take(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_zero_rate_is_config_error() {
        assert!(matches!(
            RateLimiter::per_minute(0),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_burst_then_throttle() {
        // 600/min = 10/s，突发 100；突发内的请求应立即通过
        let limiter = RateLimiter::per_minute(600).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.take().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
