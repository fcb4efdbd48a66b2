//! 数据库连接管理模块
//!
//! 提供 PostgreSQL 连接池构建。

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;

/// 创建数据库连接池
#[instrument(skip(config))]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&config.url)
        .await?;

    info!("Database connection pool created");
    Ok(pool)
}
