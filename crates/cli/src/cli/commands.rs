//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use clap::{Parser, Subcommand};
use tollgate_shared::config::StoreBackend;

/// 分布式锁命令行工具
///
/// 在锁的保护下执行命令，或查看、释放存储中的租约。
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(version, about = "基于 Redis / PostgreSQL 的分布式锁工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// 存储后端 (redis, postgres, memory)，覆盖配置文件
    #[arg(short, long)]
    pub backend: Option<StoreBackend>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 阻塞等待锁，获取后执行命令并释放
    ///
    /// Ctrl+C 会中止等待。
    Run {
        /// 锁名称
        #[arg(short, long)]
        name: String,

        /// 租约时长（秒），默认使用配置
        #[arg(long)]
        ttl: Option<u64>,

        /// 最长等待时间（秒）
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// 两次执行完成之间的最小间隔（毫秒）
        #[arg(long, default_value = "0")]
        min_gap_ms: u64,

        /// 要执行的命令及参数
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// 只尝试一次获取锁，锁被占用时以退出码 75 返回
    Try {
        /// 锁名称
        #[arg(short, long)]
        name: String,

        /// 租约时长（秒），默认使用配置
        #[arg(long)]
        ttl: Option<u64>,

        /// 要执行的命令及参数
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// 查看锁的当前持有者
    Owner {
        /// 锁名称
        #[arg(short, long)]
        name: String,
    },

    /// 使用持有者令牌释放锁，令牌不匹配时不做任何操作
    Release {
        /// 锁名称
        #[arg(short, long)]
        name: String,

        /// 持有者令牌
        #[arg(short, long)]
        owner: String,
    },
}

// ============================================================================
// 单元测试
// ============================================================================
