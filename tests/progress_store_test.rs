// tests/progress_store_test.rs

use book_dl::fetcher::ProgressStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// 单次认领保证：N 个条目在 T 个线程下并发认领，
/// 每个序号恰好被认领一次，无重复也无遗漏。
#[test]
fn test_concurrent_acquire_is_single_claim() {
    const CATALOG_SIZE: u32 = 500;
    const THREADS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        ProgressStore::open(1, CATALOG_SIZE, dir.path().join("claim.progress")).unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let mut claimed = Vec::new();
            while let Some(id) = store.acquire_next() {
                claimed.push(id);
            }
            claimed
        }));
    }

    let mut all: Vec<u32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(all.len(), CATALOG_SIZE as usize, "认领总数必须等于目录大小");
    let unique: HashSet<u32> = all.iter().copied().collect();
    assert_eq!(unique.len(), CATALOG_SIZE as usize, "不允许重复认领");
    all.sort_unstable();
    assert_eq!(all.first(), Some(&1));
    assert_eq!(all.last(), Some(&CATALOG_SIZE));
}

/// 断点恢复幂等：完成一部分后关闭再打开，
/// 新的认领序列绝不返回已完成的序号。
#[test]
fn test_reopen_skips_completed_even_under_concurrency() {
    const CATALOG_SIZE: u32 = 100;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resume.progress");

    let completed: HashSet<u32> = {
        let store = Arc::new(ProgressStore::open(1, CATALOG_SIZE, &path).unwrap());
        let mut done = HashSet::new();
        // 完成所有偶数序号
        while let Some(id) = store.acquire_next() {
            if id % 2 == 0 {
                store.mark_completed(id).unwrap();
                done.insert(id);
            }
        }
        done
    };
    assert_eq!(completed.len(), 50);

    let store = Arc::new(ProgressStore::open(1, CATALOG_SIZE, &path).unwrap());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let mut claimed = Vec::new();
            while let Some(id) = store.acquire_next() {
                claimed.push(id);
            }
            claimed
        }));
    }
    let reclaimed: Vec<u32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(reclaimed.len(), 50);
    for id in &reclaimed {
        assert!(
            !completed.contains(id),
            "已完成的序号 {} 不应被重新认领",
            id
        );
    }
}

/// 完成落盘发生在 mark_completed 而非认领时：
/// 只认领不完成的运行等于没有发生过。
#[test]
fn test_claims_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volatile.progress");
    {
        let store = ProgressStore::open(1, 10, &path).unwrap();
        for _ in 0..10 {
            store.acquire_next();
        }
        assert_eq!(store.acquire_next(), None);
    }
    let store = ProgressStore::open(1, 10, &path).unwrap();
    assert_eq!(store.acquire_next(), Some(1));
    assert!(!store.is_finished());
}
