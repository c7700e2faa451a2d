use std::sync::atomic::{AtomicUsize, Ordering};

use crate::sync::SyncerStatus;

#[tokio::test]
async fn test_start_once_runs_start_a_single_time() {
    let status = SyncerStatus::new();
    let calls = AtomicUsize::new(0);
    let start = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<(), String>(())
    };

    assert_eq!(status.start_once(start).await, Ok(true));
    assert_eq!(status.start_once(start).await, Ok(false));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(status.is_started().await);
}

#[tokio::test]
async fn test_concurrent_start_once() {
    let status = SyncerStatus::new();
    let calls = AtomicUsize::new(0);
    let start = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<(), String>(())
    };

    let (first, second) = tokio::join!(status.start_once(start), status.start_once(start));
    let mut results = vec![first.unwrap(), second.unwrap()];
    results.sort();
    assert_eq!(results, vec![false, true]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_start_leaves_flag_unset() {
    let status = SyncerStatus::new();

    let result = status.start_once(|| Err("boom".to_string())).await;
    assert_eq!(result, Err("boom".to_string()));
    assert!(!status.is_started().await);

    assert_eq!(status.start_once(|| Ok::<(), String>(())).await, Ok(true));
}
