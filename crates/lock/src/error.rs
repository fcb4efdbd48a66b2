//! 锁错误定义
//!
//! 区分存储层错误（`StoreError`）与锁协议层错误（`LockError`）。
//! 获取失败（锁被他人持有）不是错误，调用方通过 `bool` / `Option` 分支处理。

use std::time::Duration;

use thiserror::Error;

/// 存储后端错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("存储内部错误: {0}")]
    Internal(String),
}

impl StoreError {
    /// 是否为瞬时错误（网络抖动、连接池耗尽等）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Database(_))
    }
}

/// 锁协议错误
#[derive(Debug, Error)]
pub enum LockError {
    #[error("锁名称不能为空")]
    InvalidName,

    #[error("锁的 TTL 必须大于 0: lock={name}")]
    InvalidTtl { name: String },

    #[error("等待锁超时: lock={name} waited={waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("等待锁被取消: lock={name}")]
    Cancelled { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 锁操作结果类型别名
pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName => "INVALID_LOCK_NAME",
            Self::InvalidTtl { .. } => "INVALID_LOCK_TTL",
            Self::Timeout { .. } => "LOCK_TIMEOUT",
            Self::Cancelled { .. } => "LOCK_WAIT_CANCELLED",
            Self::Store(_) => "LOCK_STORE_ERROR",
        }
    }

    /// 是否为 `block` 超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// 是否为可重试错误
    ///
    /// 超时与存储瞬时故障由调用方决定是否重试，本层不会自动重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
