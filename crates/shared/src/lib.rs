//! 共享库
//!
//! 包含各二进制共用的配置加载、日志初始化与数据库连接代码。

pub mod config;
pub mod database;
pub mod observability;
