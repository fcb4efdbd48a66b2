//! 分布式锁
//!
//! 基于共享存储（Redis / PostgreSQL）的跨进程互斥锁协议层。
//!
//! ## 设计理念
//!
//! - **存储即事实**: 不在本地记录是否持有，每次从存储读取
//! - **安全释放**: 只释放自己持有的租约，防止误删他人的锁
//! - **有界等待**: `block` 以固定间隔轮询，超时或收到取消信号即返回
//! - **保证释放**: `get` / `block_with` 在回调成功、失败或 panic 后都会释放锁
//!
//! ## 使用示例
//!
//! ```ignore
//! let store = Arc::new(RedisLockStore::open("redis://localhost:6379", "lock:")?);
//! let manager = LockManager::with_defaults(store);
//!
//! let lock = manager.lock("report:daily")?;
//! let rows = lock
//!     .block_with(Duration::from_secs(10), || async { build_report().await })
//!     .await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
mod lock;
mod manager;
pub mod metrics;
pub mod owner;
pub mod store;

pub use clock::{Clock, TokioClock};
pub use config::LockConfig;
pub use error::{LockError, Result, StoreError};
pub use lock::{BlockOptions, Lock, LockBuilder, LockGuard};
pub use manager::LockManager;
pub use owner::{OwnerTokenSource, RandomStringTokens, UuidOwnerTokens};
pub use store::{LockStore, MemoryLockStore, PostgresLockStore, RedisLockStore};
