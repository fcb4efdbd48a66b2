//! 命令执行器
//!
//! 负责执行各 CLI 子命令的具体逻辑。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

use tollgate_lock::{
    BlockOptions, LockConfig, LockError, LockManager, LockStore, MemoryLockStore,
    PostgresLockStore, RedisLockStore,
};
use tollgate_shared::config::{AppConfig, LockSettings, StoreBackend};
use tollgate_shared::database;

/// 锁被占用或等待超时时的退出码（sysexits EX_TEMPFAIL）
pub const EXIT_LOCK_BUSY: i32 = 75;

/// 等待被 Ctrl+C 中止时的退出码
pub const EXIT_INTERRUPTED: i32 = 130;

/// 命令执行器
///
/// 持有按配置选定后端的锁管理器。
pub struct CommandRunner {
    manager: LockManager<dyn LockStore>,
}

impl CommandRunner {
    pub fn new(manager: LockManager<dyn LockStore>) -> Self {
        Self { manager }
    }

    /// 根据配置连接存储后端并创建执行器
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn LockStore> = match config.backend {
            StoreBackend::Redis => {
                let store = RedisLockStore::open(&config.redis.url, config.lock.key_prefix.clone())
                    .context("创建 Redis 客户端失败")?;
                store.health_check().await.context("Redis 连接失败")?;
                Arc::new(store)
            }
            StoreBackend::Postgres => {
                let pool = database::connect(&config.database)
                    .await
                    .context("PostgreSQL 连接失败")?;
                let store = PostgresLockStore::new(pool);
                store.ensure_schema().await?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                warn!("Memory backend only coordinates within this process");
                Arc::new(MemoryLockStore::new())
            }
        };

        tollgate_lock::metrics::describe();

        info!(backend = %config.backend, "Lock store ready");
        Ok(Self::new(LockManager::new(store, lock_config(&config.lock))))
    }

    /// 执行 run 命令
    ///
    /// 返回子进程退出码；等待超时返回 `EXIT_LOCK_BUSY`，被中止返回 `EXIT_INTERRUPTED`。
    pub async fn run_blocking(
        &self,
        name: &str,
        ttl: Option<u64>,
        timeout: u64,
        min_gap_ms: u64,
        command: &[String],
    ) -> Result<i32> {
        let lock = self.lock(name, ttl)?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, cancelling lock wait...");
                let _ = cancel_tx.send(true);
            }
        });

        let options = BlockOptions::new(Duration::from_secs(timeout))
            .min_gap(Duration::from_millis(min_gap_ms))
            .cancel_on(cancel_rx);

        info!(lock = %name, owner = %lock.owner(), timeout_secs = timeout, "Waiting for lock");
        let result = lock
            .block_with(options, || run_child(command))
            .await;

        match result {
            Ok(code) => Ok(code),
            Err(err) => match err.downcast_ref::<LockError>() {
                Some(LockError::Timeout { waited, .. }) => {
                    warn!(lock = %name, waited_ms = waited.as_millis() as u64, "Gave up waiting for lock");
                    Ok(EXIT_LOCK_BUSY)
                }
                Some(LockError::Cancelled { .. }) => Ok(EXIT_INTERRUPTED),
                _ => Err(err),
            },
        }
    }

    /// 执行 try 命令
    pub async fn run_once(&self, name: &str, ttl: Option<u64>, command: &[String]) -> Result<i32> {
        let lock = self.lock(name, ttl)?;

        lock.get_or_else(
            || run_child(command),
            || async {
                info!(lock = %name, "Lock is busy, command skipped");
                Ok(EXIT_LOCK_BUSY)
            },
        )
        .await
    }

    /// 执行 owner 命令
    pub async fn show_owner(&self, name: &str) -> Result<Option<String>> {
        let owner = self.manager.store().current_owner(name).await?;
        match &owner {
            Some(owner) => println!("{}", owner),
            None => println!("<free>"),
        }
        Ok(owner)
    }

    /// 执行 release 命令
    pub async fn release(&self, name: &str, owner: &str) -> Result<bool> {
        let lock = self.manager.restore(name, owner)?;
        let released = lock.release().await?;
        if released {
            println!("released");
        } else {
            println!("not owner, nothing released");
        }
        Ok(released)
    }

    fn lock(&self, name: &str, ttl: Option<u64>) -> Result<tollgate_lock::Lock<dyn LockStore>> {
        let lock = match ttl {
            Some(secs) => self.manager.lock_with_ttl(name, Duration::from_secs(secs))?,
            None => self.manager.lock(name)?,
        };
        Ok(lock)
    }
}

/// 锁配置中与协议相关的部分，key 前缀在创建存储时单独传入
fn lock_config(settings: &LockSettings) -> LockConfig {
    LockConfig {
        default_ttl: settings.default_ttl(),
        poll_interval: settings.poll_interval(),
    }
}

/// 执行子进程并返回退出码
async fn run_child(command: &[String]) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("缺少要执行的命令");
    };

    info!(program = %program, "Running command under lock");
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("无法启动命令: {}", program))?;

    // 被信号终止时没有退出码
    Ok(status.code().unwrap_or(1))
}
