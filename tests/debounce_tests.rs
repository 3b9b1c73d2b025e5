use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use daikin_bridge::{ChangeAggregator, StatePoller};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;

const QUIET: Duration = Duration::from_millis(300);

#[tokio::test(start_paused = true)]
async fn identical_burst_collapses_to_one_notification() {
    let (aggregator, mut rx) = ChangeAggregator::new(QUIET);

    aggregator.push("cool".to_string()).await;
    aggregator.push("cool".to_string()).await;
    aggregator.push("cool".to_string()).await;

    let emitted = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(emitted.as_deref(), Some("cool"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn distinct_burst_emits_only_the_final_value() {
    let (aggregator, mut rx) = ChangeAggregator::new(QUIET);

    aggregator.push(18).await;
    aggregator.push(19).await;
    aggregator.push(20).await;

    let emitted = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(emitted, Some(20));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn repeat_of_last_emitted_value_is_suppressed() {
    let (aggregator, mut rx) = ChangeAggregator::new(QUIET);

    aggregator.push("heat".to_string()).await;
    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("heat"));

    // Same value again after the quiet period: no second notification.
    aggregator.push("heat".to_string()).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // A different value still goes through.
    aggregator.push("auto".to_string()).await;
    let next = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(next.as_deref(), Some("auto"));
}

#[tokio::test(start_paused = true)]
async fn poller_fetches_on_interval_after_initial_delay() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = calls.clone();
    let (_poller, mut rx) = StatePoller::spawn(
        Duration::from_secs(10),
        Duration::from_secs(5),
        move || {
            let calls = fetch_calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        },
    );

    let first = timeout(Duration::from_secs(30), rx.recv()).await.unwrap();
    assert_eq!(first, Some(1));
    let second = timeout(Duration::from_secs(30), rx.recv()).await.unwrap();
    assert_eq!(second, Some(2));
}

#[tokio::test(start_paused = true)]
async fn suspend_guard_brackets_outbound_sends() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = calls.clone();
    let (poller, mut rx) = StatePoller::spawn(
        Duration::from_secs(10),
        Duration::from_secs(5),
        move || {
            let calls = fetch_calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        },
    );

    timeout(Duration::from_secs(30), rx.recv()).await.unwrap();

    {
        let _pause = poller.suspend();
        assert!(poller.is_paused());
        // Several intervals elapse while paused; no poll results arrive.
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    // Guard dropped (send finished, successfully or not): polling resumes.
    assert!(!poller.is_paused());
    let resumed = timeout(Duration::from_secs(30), rx.recv()).await.unwrap();
    assert!(resumed.is_some());
}
