//! PostgreSQL 锁存储
//!
//! 适用于没有 Redis 的部署。过期时间由数据库 `NOW()` 计算，
//! 所有竞争者以数据库时钟为准。

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use super::LockStore;
use crate::error::StoreError;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS distributed_locks (
        lock_key    TEXT PRIMARY KEY,
        owner_id    TEXT NOT NULL,
        expires_at  TIMESTAMPTZ NOT NULL
    )
"#;

/// PostgreSQL 锁存储
#[derive(Clone)]
pub struct PostgresLockStore {
    pool: PgPool,
}

impl PostgresLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 创建 `distributed_locks` 表（已存在时跳过）
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        info!("distributed_locks table ready");
        Ok(())
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LockStore for PostgresLockStore {
    /// 单条语句完成获取：记录不存在时插入，存在但已过期时接管，
    /// 未过期时 WHERE 条件不成立，影响行数为 0。
    #[instrument(skip(self, owner))]
    async fn try_set(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis())
            .map_err(|_| StoreError::Internal(format!("TTL 超出范围: {:?}", ttl)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO distributed_locks (lock_key, owner_id, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3::float8 / 1000.0))
            ON CONFLICT (lock_key) DO UPDATE
                SET owner_id = EXCLUDED.owner_id,
                    expires_at = EXCLUDED.expires_at
                WHERE distributed_locks.expires_at <= NOW()
            "#,
        )
        .bind(name)
        .bind(owner)
        .bind(ttl_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, owner))]
    async fn compare_and_delete(&self, name: &str, owner: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query(r#"DELETE FROM distributed_locks WHERE lock_key = $1 AND owner_id = $2"#)
                .bind(name)
                .bind(owner)
                .execute(&self.pool)
                .await?;

        debug!(lock = %name, rows = result.rows_affected(), "Database compare-and-delete finished");
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn current_owner(&self, name: &str) -> Result<Option<String>, StoreError> {
        let owner: Option<String> = sqlx::query_scalar(
            r#"SELECT owner_id FROM distributed_locks WHERE lock_key = $1 AND expires_at > NOW()"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner)
    }
}
