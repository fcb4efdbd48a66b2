//! 锁持有者令牌生成
//!
//! 令牌是"本次获取"的能力凭证，而不是用户或进程身份。

use rand::Rng;
use rand::distr::Alphanumeric;
use uuid::Uuid;

/// 持有者令牌来源
pub trait OwnerTokenSource: Send + Sync {
    fn generate(&self) -> String;
}

/// 使用 UUID v4 作为令牌（默认）
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidOwnerTokens;

impl OwnerTokenSource for UuidOwnerTokens {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// 随机字母数字字符串令牌
#[derive(Debug, Clone, Copy)]
pub struct RandomStringTokens {
    pub len: usize,
}

impl Default for RandomStringTokens {
    fn default() -> Self {
        Self { len: 16 }
    }
}

impl OwnerTokenSource for RandomStringTokens {
    fn generate(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

impl<F> OwnerTokenSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}
