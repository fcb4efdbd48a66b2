//! 时间源
//!
//! `block` 的超时判断与最小间隔控制都基于单调时钟，不受系统时间回拨影响。
//! 默认实现基于 tokio 时间驱动，测试中可配合 `start_paused` 精确推进时间。

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// 单调时钟与休眠能力
#[async_trait]
pub trait Clock: Send + Sync {
    /// 当前单调时间
    fn now(&self) -> Instant;

    /// 挂起当前任务指定时长
    async fn sleep(&self, duration: Duration);
}

/// 基于 tokio 时间驱动的时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
