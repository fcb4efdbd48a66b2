//! Tollgate 命令行工具
//!
//! 在分布式锁保护下执行外部命令。

pub mod cli;
