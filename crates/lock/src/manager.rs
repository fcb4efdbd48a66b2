//! 分布式锁管理器
//!
//! 持有存储、配置、令牌来源和时钟，按名称创建 `Lock` 实例。

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, TokioClock};
use crate::config::LockConfig;
use crate::error::Result;
use crate::lock::Lock;
use crate::owner::{OwnerTokenSource, UuidOwnerTokens};
use crate::store::LockStore;

/// 分布式锁管理器
///
/// 每次 `lock()` 都会生成新的持有者令牌，不同调用得到的锁实例互相竞争。
pub struct LockManager<S: LockStore + ?Sized> {
    store: Arc<S>,
    config: LockConfig,
    tokens: Arc<dyn OwnerTokenSource>,
    clock: Arc<dyn Clock>,
}

impl<S: LockStore + ?Sized> Clone for LockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            tokens: Arc::clone(&self.tokens),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: LockStore + ?Sized> LockManager<S> {
    /// 创建锁管理器
    ///
    /// # Arguments
    /// - `store`: 锁存储
    /// - `config`: 锁配置
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            tokens: Arc::new(UuidOwnerTokens),
            clock: Arc::new(TokioClock),
        }
    }

    /// 使用默认配置创建锁管理器
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, LockConfig::default())
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn OwnerTokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// 使用默认 TTL 创建锁
    pub fn lock(&self, name: &str) -> Result<Lock<S>> {
        self.lock_with_ttl(name, self.config.default_ttl)
    }

    /// 使用指定 TTL 创建锁
    pub fn lock_with_ttl(&self, name: &str, ttl: Duration) -> Result<Lock<S>> {
        Lock::builder(Arc::clone(&self.store), name, ttl)
            .token_source(Arc::clone(&self.tokens))
            .clock(Arc::clone(&self.clock))
            .poll_interval(self.config.poll_interval)
            .build()
    }

    /// 用已知的持有者令牌重建锁
    ///
    /// 用于跨请求边界传递令牌后，由协作方完成释放或所有权检查。
    pub fn restore(&self, name: &str, owner: &str) -> Result<Lock<S>> {
        Lock::builder(Arc::clone(&self.store), name, self.config.default_ttl)
            .owner(owner)
            .clock(Arc::clone(&self.clock))
            .poll_interval(self.config.poll_interval)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLockStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager() -> LockManager<MemoryLockStore> {
        LockManager::with_defaults(Arc::new(MemoryLockStore::new()))
    }

    #[test]
    fn test_lock_uses_config_defaults() {
        let manager = manager();
        let lock = manager.lock("report").unwrap();
        assert_eq!(lock.name(), "report");
        assert_eq!(lock.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_each_lock_gets_fresh_owner() {
        let counter = Arc::new(AtomicU32::new(0));
        let source = counter.clone();
        let manager = manager().with_token_source(Arc::new(move || {
            format!("token-{}", source.fetch_add(1, Ordering::SeqCst))
        }));

        assert_eq!(manager.lock("a").unwrap().owner(), "token-0");
        assert_eq!(manager.lock("a").unwrap().owner(), "token-1");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lock_rejects_empty_name() {
        assert!(manager().lock("").is_err());
    }

    #[tokio::test]
    async fn test_restored_lock_can_release_handed_over_lease() {
        let manager = manager();
        let original = manager.lock_with_ttl("import", Duration::from_secs(5)).unwrap();
        assert!(original.acquire().await.unwrap());

        let token = original.owner().to_string();
        let restored = manager.restore("import", &token).unwrap();
        assert!(restored.is_owned_by_current_process().await.unwrap());
        assert!(restored.release().await.unwrap());

        assert!(manager.store().current_owner("import").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_with_wrong_token_cannot_release() {
        let manager = manager();
        let original = manager.lock("import").unwrap();
        assert!(original.acquire().await.unwrap());

        let stranger = manager.restore("import", "forged-token").unwrap();
        assert!(!stranger.release().await.unwrap());
        assert!(original.is_owned_by_current_process().await.unwrap());
    }
}
