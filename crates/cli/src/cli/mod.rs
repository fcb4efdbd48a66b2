//! CLI 模块
//!
//! 提供命令行接口，支持以下功能：
//!
//! - `run` - 阻塞等待锁，获取后执行命令
//! - `try` - 只尝试一次，锁被占用时跳过命令
//! - `owner` - 查看锁的当前持有者
//! - `release` - 使用持有者令牌释放锁
//!
//! # 使用示例
//!
//! ```bash
//! # 最多等待 60 秒，获取锁后执行备份
//! tollgate run -n backup -t 60 -- pg_dump -Fc app
//!
//! # 锁被占用时直接跳过（退出码 75）
//! tollgate try -n nightly-report -- ./report.sh
//!
//! # 查看与释放
//! tollgate owner -n backup
//! tollgate release -n backup -o 5f0c7a1e-...
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::{CommandRunner, EXIT_INTERRUPTED, EXIT_LOCK_BUSY};
