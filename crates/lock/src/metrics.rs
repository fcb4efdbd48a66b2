//! 锁指标
//!
//! 基于 metrics crate 记录，未安装 recorder 时为空操作。

/// 注册指标描述
pub fn describe() {
    metrics::describe_counter!("lock_acquire_total", "Total number of lock acquire attempts");
    metrics::describe_counter!("lock_release_total", "Total number of lock release calls");
    metrics::describe_counter!("lock_block_total", "Total number of blocking acquisitions");
    metrics::describe_histogram!(
        "lock_wait_duration_seconds",
        "Time spent waiting in blocking acquisition"
    );
}

/// 记录一次获取尝试
#[inline]
pub fn record_acquire(lock: &str, acquired: bool) {
    let outcome = if acquired { "acquired" } else { "contended" };
    metrics::counter!(
        "lock_acquire_total",
        "lock" => lock.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录一次释放
#[inline]
pub fn record_release(lock: &str, released: bool) {
    let outcome = if released { "released" } else { "not_owner" };
    metrics::counter!(
        "lock_release_total",
        "lock" => lock.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录一次阻塞获取的结果与等待时长
#[inline]
pub fn record_block(lock: &str, outcome: &'static str, waited_secs: f64) {
    metrics::counter!(
        "lock_block_total",
        "lock" => lock.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!(
        "lock_wait_duration_seconds",
        "lock" => lock.to_string(),
        "outcome" => outcome
    )
    .record(waited_secs);
}
