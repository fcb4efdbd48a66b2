//! Redis 锁存储
//!
//! 获取使用 `SET key owner NX PX ttl` 原子操作，释放使用 Lua 脚本原子地
//! 校验 owner 并删除，避免检查与删除之间的竞态。

use std::time::Duration;

use async_trait::async_trait;
use redis::Client as RedisClient;
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument};

use super::LockStore;
use crate::error::StoreError;

/// 只有当锁的 owner 匹配时才删除
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Redis 锁存储
#[derive(Clone)]
pub struct RedisLockStore {
    client: RedisClient,
    key_prefix: String,
}

impl RedisLockStore {
    /// 创建 Redis 锁存储
    ///
    /// # Arguments
    /// - `client`: Redis 客户端
    /// - `key_prefix`: 锁 key 前缀，如 `lock:`
    pub fn new(client: RedisClient, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    /// 通过连接地址创建
    pub fn open(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = RedisClient::open(url)?;
        Ok(Self::new(client, key_prefix))
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }
}

/// 转换为 PX 参数；PX 不接受 0，亚毫秒 TTL 向上取整
fn ttl_millis(ttl: Duration) -> Result<u64, StoreError> {
    u64::try_from(ttl.as_millis())
        .map(|ms| ms.max(1))
        .map_err(|_| StoreError::Internal(format!("TTL 超出范围: {:?}", ttl)))
}

#[async_trait]
impl LockStore for RedisLockStore {
    #[instrument(skip(self, owner))]
    async fn try_set(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.get_conn().await?;

        // SET NX 成功时返回 "OK"，失败时返回 nil
        let result: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(name))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    #[instrument(skip(self, owner))]
    async fn compare_and_delete(&self, name: &str, owner: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_conn().await?;

        let deleted: i32 = redis::Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(self.lock_key(name))
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;

        debug!(lock = %name, deleted, "Redis compare-and-delete finished");
        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn current_owner(&self, name: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_conn().await?;
        let owner: Option<String> = redis::cmd("GET")
            .arg(self.lock_key(name))
            .query_async(&mut conn)
            .await?;
        Ok(owner)
    }
}
