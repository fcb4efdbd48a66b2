//! 内存锁存储
//!
//! 使用 DashMap 实现的进程内租约表，适用于测试、本地开发和单机部署。
//! 过期时间基于 tokio 单调时钟计算。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use super::LockStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 内存锁存储
///
/// 克隆后的实例共享同一张租约表。
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    leases: Arc<DashMap<String, Lease>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的租约数量
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.leases
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    /// 清空所有租约
    pub fn clear(&self) {
        self.leases.clear();
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_set(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Internal(format!("TTL 超出范围: {:?}", ttl)))?;
        let lease = Lease {
            owner: owner.to_string(),
            expires_at,
        };

        // entry 持有分片写锁，检查与写入在同一临界区内完成
        match self.leases.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                debug!(lock = %name, "Replacing expired in-memory lease");
                occupied.insert(lease);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, name: &str, owner: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = self
            .leases
            .remove_if(name, |_, lease| lease.owner == owner && lease.is_live(now));
        Ok(removed.is_some())
    }

    async fn current_owner(&self, name: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .leases
            .get(name)
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.owner.clone()))
    }
}
