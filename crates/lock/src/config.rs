//! 锁配置
//!
//! key 前缀属于存储实现（见 `RedisLockStore`），不在这里配置。

use std::time::Duration;

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 锁配置
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// 默认租约时长
    pub default_ttl: Duration,
    /// `block` 等待时的固定轮询间隔
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_config_default() {
        let config = LockConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_lock_config_custom() {
        let config = LockConfig {
            poll_interval: Duration::from_millis(50),
            ..Default::default()
        };
        assert_eq!(config.default_ttl, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }
}
