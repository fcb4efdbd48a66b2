//! 统一可观测性模块
//!
//! 所有二进制通过单一入口点初始化日志，确保一致的输出格式与过滤规则。

pub mod tracing;

use ::tracing::info;
use anyhow::Result;

pub use crate::config::ObservabilityConfig;

/// 统一初始化可观测性
///
/// # Example
///
/// ```ignore
/// use tollgate_shared::config::AppConfig;
/// use tollgate_shared::observability;
///
/// let config = AppConfig::load("tollgate")?;
/// observability::init(&config.service_name, &config.observability)?;
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;

    info!(
        service = %service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );
    Ok(())
}
