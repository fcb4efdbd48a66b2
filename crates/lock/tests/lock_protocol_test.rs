//! 锁协议集成测试
//!
//! 使用内存存储验证多个竞争者之间的互斥、安全释放和阻塞获取行为。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tollgate_lock::{
    BlockOptions, LockConfig, LockError, LockManager, LockStore, MemoryLockStore,
};

#[derive(Debug)]
enum TaskError {
    Lock(LockError),
    Overlap,
}

impl From<LockError> for TaskError {
    fn from(err: LockError) -> Self {
        TaskError::Lock(err)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tollgate_lock=debug")
        .with_test_writer()
        .try_init();
}

fn fast_manager() -> LockManager<MemoryLockStore> {
    let config = LockConfig {
        default_ttl: Duration::from_secs(10),
        poll_interval: Duration::from_millis(5),
    };
    LockManager::new(Arc::new(MemoryLockStore::new()), config)
}

// ==================== 互斥 ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_contenders_never_overlap() {
    init_tracing();
    let manager = fast_manager();
    let inside = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let lock = manager.lock("inventory").unwrap();
        let inside = inside.clone();
        let completed = completed.clone();
        handles.push(tokio::spawn(async move {
            lock.block_with(Duration::from_secs(10), move || async move {
                if inside.swap(true, Ordering::SeqCst) {
                    return Err(TaskError::Overlap);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.store(false, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
        }));
    }

    for handle in handles {
        let result: Result<(), TaskError> = handle.await.unwrap();
        assert!(result.is_ok(), "critical sections overlapped: {:?}", result);
    }
    assert_eq!(completed.load(Ordering::SeqCst), 8);
    assert!(
        manager
            .store()
            .current_owner("inventory")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_only_one_of_many_single_attempts_wins() {
    let manager = fast_manager();
    let locks: Vec<_> = (0..5).map(|_| manager.lock("nightly").unwrap()).collect();

    let mut winners = 0;
    for lock in &locks {
        if lock.acquire().await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    // 非持有者的释放全部是空操作
    let mut released = 0;
    for lock in &locks {
        if lock.release().await.unwrap() {
            released += 1;
        }
    }
    assert_eq!(released, 1);
}

// ==================== 安全释放 ====================

#[tokio::test]
async fn test_stale_holder_cannot_release_successor_lease() {
    init_tracing();
    let store = Arc::new(MemoryLockStore::new());
    let config = LockConfig {
        default_ttl: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
    };
    let manager = LockManager::new(store.clone(), config);

    let first = manager.lock("sync").unwrap();
    assert!(first.acquire().await.unwrap());

    // 第一个持有者的租约过期，第二个持有者接手
    tokio::time::sleep(Duration::from_millis(80)).await;
    let second = manager.lock_with_ttl("sync", Duration::from_secs(10)).unwrap();
    assert!(second.acquire().await.unwrap());

    // 第一个持有者迟到的释放不能删除第二个持有者的租约
    assert!(!first.release().await.unwrap());
    assert_eq!(
        store.current_owner("sync").await.unwrap().as_deref(),
        Some(second.owner())
    );
    assert!(second.release().await.unwrap());
}

// ==================== 阻塞获取 ====================

#[tokio::test]
async fn test_block_timeout_boundary_real_time() {
    let store = Arc::new(MemoryLockStore::new());
    store
        .try_set("export", "someone-else", Duration::from_secs(30))
        .await
        .unwrap();

    let manager = LockManager::with_defaults(store);
    let lock = manager.lock("export").unwrap();

    let start = Instant::now();
    let err = lock.block(Duration::from_secs(1)).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1250 + 200));
}

#[tokio::test]
async fn test_min_gap_paces_completion_real_time() {
    let manager = fast_manager();
    let lock = manager.lock("webhook").unwrap();

    let start = Instant::now();
    let options = BlockOptions::new(Duration::from_secs(1)).min_gap(Duration::from_millis(500));
    let result: Result<u8, TaskError> = lock
        .block_with(options, || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        })
        .await;

    assert_eq!(result.unwrap(), 1);
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_block_with_timeout_surfaces_lock_error_to_caller() {
    let manager = fast_manager();
    let holder = manager.lock("ledger").unwrap();
    assert!(holder.acquire().await.unwrap());

    let waiter = manager.lock("ledger").unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let result: Result<(), TaskError> = waiter
        .block_with(Duration::from_millis(50), move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

    match result {
        Err(TaskError::Lock(LockError::Timeout { name, waited })) => {
            assert_eq!(name, "ledger");
            assert!(waited >= Duration::from_millis(50));
        }
        other => panic!("expected lock timeout, got {:?}", other),
    }
    assert!(!ran.load(Ordering::SeqCst));
    assert!(holder.is_owned_by_current_process().await.unwrap());
}

#[tokio::test]
async fn test_guard_handoff_via_owner_token() {
    let manager = fast_manager();
    let lock = manager.lock("session:42").unwrap();

    let token = {
        let guard = lock.block(Duration::from_secs(1)).await.unwrap();
        guard.detach().owner().to_string()
    };

    // 另一条调用路径使用传递过来的令牌完成释放
    let cooperating = manager.restore("session:42", &token).unwrap();
    assert!(cooperating.release().await.unwrap());
    assert!(!lock.is_owned_by_current_process().await.unwrap());
}
