//! 锁协议实现
//!
//! `Lock` 只保存身份信息（名称、持有者令牌、租约时长），"是否持有"每次都从
//! 存储中读取。存储是唯一的事实来源，本地状态会因为租约并发过期而失真。

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, TokioClock};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::{LockError, Result};
use crate::metrics;
use crate::owner::{OwnerTokenSource, UuidOwnerTokens};
use crate::store::LockStore;

/// 阻塞获取参数
#[derive(Debug, Clone)]
pub struct BlockOptions {
    /// 最长等待时间，至少会尝试一次获取
    pub timeout: Duration,
    /// 从调用开始到临界区完成的最小间隔，0 表示不限制
    pub min_gap: Duration,
    /// 取消信号，值变为 true 时在下一个轮询边界退出
    pub cancel: Option<watch::Receiver<bool>>,
}

impl BlockOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            min_gap: Duration::ZERO,
            cancel: None,
        }
    }

    pub fn min_gap(mut self, min_gap: Duration) -> Self {
        self.min_gap = min_gap;
        self
    }

    pub fn cancel_on(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl From<Duration> for BlockOptions {
    fn from(timeout: Duration) -> Self {
        Self::new(timeout)
    }
}

/// 分布式锁
///
/// 同一实例不应被多个任务并发调用 `acquire` / `release`，需要时由调用方自行串行化。
pub struct Lock<S: LockStore + ?Sized> {
    name: String,
    owner: String,
    ttl: Duration,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

/// `Lock` 构建器
pub struct LockBuilder<S: LockStore + ?Sized> {
    name: String,
    ttl: Duration,
    store: Arc<S>,
    owner: Option<String>,
    tokens: Arc<dyn OwnerTokenSource>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl<S: LockStore + ?Sized> LockBuilder<S> {
    /// 指定持有者令牌（如从上游请求传递过来的令牌）
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// 未指定持有者时使用的令牌来源
    pub fn token_source(mut self, tokens: Arc<dyn OwnerTokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn build(self) -> Result<Lock<S>> {
        if self.name.is_empty() {
            return Err(LockError::InvalidName);
        }
        if self.ttl.is_zero() {
            return Err(LockError::InvalidTtl { name: self.name });
        }

        let owner = match self.owner {
            Some(owner) => owner,
            None => self.tokens.generate(),
        };

        Ok(Lock {
            name: self.name,
            owner,
            ttl: self.ttl,
            store: self.store,
            clock: self.clock,
            poll_interval: self.poll_interval,
        })
    }
}

impl<S: LockStore + ?Sized> Lock<S> {
    /// 使用默认令牌来源、时钟和轮询间隔创建锁
    pub fn new(store: Arc<S>, name: impl Into<String>, ttl: Duration) -> Result<Self> {
        Self::builder(store, name, ttl).build()
    }

    pub fn builder(store: Arc<S>, name: impl Into<String>, ttl: Duration) -> LockBuilder<S> {
        LockBuilder {
            name: name.into(),
            ttl,
            store,
            owner: None,
            tokens: Arc::new(UuidOwnerTokens),
            clock: Arc::new(TokioClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 持有者令牌，可交给协作方用于后续释放
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 尝试获取锁，立即返回
    ///
    /// 返回 true 表示本次调用新建立了租约；锁被他人持有时返回 false，无副作用。
    #[instrument(skip(self), fields(lock = %self.name))]
    pub async fn acquire(&self) -> Result<bool> {
        let acquired = self
            .store
            .try_set(&self.name, &self.owner, self.ttl)
            .await?;
        metrics::record_acquire(&self.name, acquired);

        if acquired {
            debug!(owner = %self.owner, ttl_ms = self.ttl.as_millis() as u64, "Lock acquired");
        } else {
            debug!("Lock is held by another owner");
        }
        Ok(acquired)
    }

    /// 释放锁
    ///
    /// 只有存储中记录的持有者是本实例时才删除，否则为空操作。
    /// 删除本身是原子的 compare-and-delete，租约在检查之后过期并被他人获取时
    /// 也不会误删他人的租约。返回 true 表示本次调用删除了租约。
    #[instrument(skip(self), fields(lock = %self.name))]
    pub async fn release(&self) -> Result<bool> {
        if !self.is_owned_by_current_process().await? {
            debug!(owner = %self.owner, "Lock not owned by this instance, release skipped");
            metrics::record_release(&self.name, false);
            return Ok(false);
        }

        let released = self
            .store
            .compare_and_delete(&self.name, &self.owner)
            .await?;
        metrics::record_release(&self.name, released);

        if released {
            debug!("Lock released");
        } else {
            debug!(owner = %self.owner, "Lease changed hands before release, nothing deleted");
        }
        Ok(released)
    }

    /// 存储中记录的持有者是否为本实例
    pub async fn is_owned_by_current_process(&self) -> Result<bool> {
        let current = self.store.current_owner(&self.name).await?;
        Ok(current.as_deref() == Some(self.owner.as_str()))
    }

    /// 尝试一次获取，成功时执行回调并保证释放
    ///
    /// 未获取到锁时返回 `Ok(None)`，回调不会执行。
    pub async fn get<F, Fut, T, E>(&self, callback: F) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        if !self.acquire().await? {
            return Ok(None);
        }
        self.run_then_release(callback()).await.map(Some)
    }

    /// 尝试一次获取，成功时执行 `callback`，失败时执行 `on_failure`
    ///
    /// 未获取到锁时不会尝试释放。
    pub async fn get_or_else<F, Fut, G, GFut, T, E>(
        &self,
        callback: F,
        on_failure: G,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        if !self.acquire().await? {
            return on_failure().await;
        }
        self.run_then_release(callback()).await
    }

    /// 尝试一次获取，成功时返回守卫，租约保持持有直到显式释放
    pub async fn try_lock(&self) -> Result<Option<LockGuard<'_, S>>> {
        if self.acquire().await? {
            Ok(Some(LockGuard::new(self)))
        } else {
            Ok(None)
        }
    }

    /// 阻塞获取，成功时返回守卫
    ///
    /// 超时返回 `LockError::Timeout`，收到取消信号返回 `LockError::Cancelled`。
    /// `min_gap` 只作用于 `block_with` 的临界区，这里会被忽略。
    pub async fn block(&self, options: impl Into<BlockOptions>) -> Result<LockGuard<'_, S>> {
        let mut options = options.into();
        let started = self.clock.now();
        self.wait_until_acquired(started, options.timeout, options.cancel.as_mut())
            .await?;
        Ok(LockGuard::new(self))
    }

    /// 阻塞获取后执行回调，并保证释放
    ///
    /// 回调成功完成且距调用开始不足 `min_gap` 时，先补足剩余时间再释放，
    /// 用于限制受保护操作的完成频率。
    pub async fn block_with<F, Fut, T, E>(
        &self,
        options: impl Into<BlockOptions>,
        callback: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let mut options = options.into();
        let started = self.clock.now();
        self.wait_until_acquired(started, options.timeout, options.cancel.as_mut())
            .await?;

        let min_gap = options.min_gap;
        let work = async move {
            let value = callback().await?;
            self.pace(started, min_gap).await;
            Ok::<T, E>(value)
        };
        self.run_then_release(work).await
    }

    async fn wait_until_acquired(
        &self,
        started: Instant,
        timeout: Duration,
        mut cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<()> {
        loop {
            if self.acquire().await? {
                let waited = self.clock.now().saturating_duration_since(started);
                metrics::record_block(&self.name, "acquired", waited.as_secs_f64());
                return Ok(());
            }

            let sleep_ms = self.poll_interval.as_millis() as u64;
            info!(lock = %self.name, sleep_ms, "Lock not acquired, sleeping before retry");

            match cancel.as_deref_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = self.clock.sleep(self.poll_interval) => {}
                        _ = cancelled(rx) => {
                            let waited = self.clock.now().saturating_duration_since(started);
                            metrics::record_block(&self.name, "cancelled", waited.as_secs_f64());
                            info!(lock = %self.name, "Lock wait cancelled");
                            return Err(LockError::Cancelled {
                                name: self.name.clone(),
                            });
                        }
                    }
                }
                None => self.clock.sleep(self.poll_interval).await,
            }

            let waited = self.clock.now().saturating_duration_since(started);
            if waited >= timeout {
                metrics::record_block(&self.name, "timeout", waited.as_secs_f64());
                warn!(lock = %self.name, waited_ms = waited.as_millis() as u64, "Lock wait timed out");
                return Err(LockError::Timeout {
                    name: self.name.clone(),
                    waited,
                });
            }
        }
    }

    async fn pace(&self, started: Instant, min_gap: Duration) {
        if min_gap.is_zero() {
            return;
        }
        let elapsed = self.clock.now().saturating_duration_since(started);
        let left = min_gap.saturating_sub(elapsed);
        if !left.is_zero() {
            info!(
                lock = %self.name,
                sleep_ms = left.as_millis() as u64,
                "Critical section finished too fast, pacing"
            );
            self.clock.sleep(left).await;
        }
    }

    /// 执行受保护的操作，无论成功、失败还是 panic 都会释放锁
    ///
    /// 操作失败时释放错误只记录日志，原始错误原样返回。
    async fn run_then_release<Fut, T, E>(&self, work: Fut) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let outcome = AssertUnwindSafe(work).catch_unwind().await;
        let released = self.release().await;

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(e) = released {
                    warn!(
                        lock = %self.name,
                        owner = %self.owner,
                        error = %e,
                        "Release after failed callback failed - lock will expire via TTL"
                    );
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(e) = released {
                    warn!(
                        lock = %self.name,
                        owner = %self.owner,
                        error = %e,
                        "Release after panicked callback failed - lock will expire via TTL"
                    );
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl<S: LockStore + ?Sized> fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("ttl", &self.ttl)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// 等待取消信号变为 true；发送端关闭后永不返回
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// 锁守卫
///
/// 持有租约期间的句柄。Drop 无法执行异步释放，未显式 `release()` 或
/// `detach()` 就被 drop 时只记录警告，租约随后通过 TTL 过期。
#[must_use = "dropping the guard does not release the lock"]
pub struct LockGuard<'a, S: LockStore + ?Sized> {
    lock: &'a Lock<S>,
    finished: bool,
}

impl<'a, S: LockStore + ?Sized> LockGuard<'a, S> {
    fn new(lock: &'a Lock<S>) -> Self {
        Self {
            lock,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        self.lock.name()
    }

    pub fn owner(&self) -> &str {
        self.lock.owner()
    }

    /// 显式释放锁
    pub async fn release(mut self) -> Result<bool> {
        self.finished = true;
        self.lock.release().await
    }

    /// 放弃守卫但保留租约，由调用方稍后通过 `Lock::release` 或
    /// 持有相同令牌的协作方释放
    pub fn detach(mut self) -> &'a Lock<S> {
        self.finished = true;
        self.lock
    }
}

impl<S: LockStore + ?Sized> fmt::Debug for LockGuard<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.lock.name)
            .field("owner", &self.lock.owner)
            .finish_non_exhaustive()
    }
}

impl<S: LockStore + ?Sized> Drop for LockGuard<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                lock = %self.lock.name,
                owner = %self.lock.owner,
                "LockGuard dropped without explicit release - lock will expire via TTL"
            );
        }
    }
}
