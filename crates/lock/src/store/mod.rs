//! 锁存储抽象
//!
//! 锁协议层只依赖存储提供的三个原子能力，不在本地缓存"是否持有"的状态：
//!
//! - `try_set`: 不存在时写入并设置过期时间（不得覆盖未过期的记录）
//! - `compare_and_delete`: 当前值等于 owner 时删除（单个不可分割的操作）
//! - `current_owner`: 只读查询当前持有者
//!
//! 已提供 Redis、PostgreSQL 与进程内存三种实现。

mod memory;
mod postgres;
mod redis;

pub use self::memory::MemoryLockStore;
pub use self::postgres::PostgresLockStore;
pub use self::redis::RedisLockStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// 锁存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// 原子地"不存在则写入"，并设置租约时长
    ///
    /// 返回 true 表示本次调用新建立了租约。
    async fn try_set(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// 原子地"值等于 owner 时删除"
    ///
    /// 返回 true 表示确实删除了记录。
    async fn compare_and_delete(&self, name: &str, owner: &str) -> Result<bool, StoreError>;

    /// 查询当前持有者，不存在或已过期时返回 None
    async fn current_owner(&self, name: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
impl<S: LockStore + ?Sized> LockStore for Arc<S> {
    async fn try_set(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        (**self).try_set(name, owner, ttl).await
    }

    async fn compare_and_delete(&self, name: &str, owner: &str) -> Result<bool, StoreError> {
        (**self).compare_and_delete(name, owner).await
    }

    async fn current_owner(&self, name: &str) -> Result<Option<String>, StoreError> {
        (**self).current_owner(name).await
    }
}
