//! Contract Test: Scheduler Lifecycle
//!
//! This test verifies the on/off state machine of the scheduler.
//!
//! Constraints verified:
//! - A second activate() is a no-op (one loop, one immediate delivery)
//! - deactivate() is idempotent and never blocks
//! - deactivate() leaves an in-flight cycle to finish on its own
//! - Ticks missed during a slow cycle collapse into one catch-up delivery
//! - A stopped scheduler never delivers again
//! - The scheduler can be restarted after being stopped
//!
//! If this test fails, someone has introduced:
//! - Duplicate background loops
//! - Leaked timers after deactivation
//! - A stop that waits on the weather provider
//! - A burst of queued deliveries after a slow fetch
//! - Double cancellation panics

mod common;

use common::*;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn double_activate_starts_one_loop() {
    let h = Harness::new(MINUTE, 0, 23, 12);

    h.scheduler.activate();
    h.scheduler.activate();
    settle().await;

    assert!(h.scheduler.is_running());
    assert_eq!(
        h.notifier.broadcast_count(),
        1,
        "Second activation must not fire another immediate delivery"
    );

    // One tick, one loop: exactly one more delivery
    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    assert_eq!(h.notifier.broadcast_count(), 2);

    h.scheduler.deactivate();
}

#[tokio::test(start_paused = true)]
async fn double_deactivate_is_safe() {
    let h = Harness::new(MINUTE, 0, 23, 12);

    h.scheduler.activate();
    settle().await;

    h.scheduler.deactivate();
    h.scheduler.deactivate();
    assert!(!h.scheduler.is_running());
    assert_eq!(h.scheduler.current_period(), None);

    tokio::time::sleep(MINUTE * 10).await;
    assert_eq!(
        h.notifier.broadcast_count(),
        1,
        "No delivery may happen after deactivation"
    );
}

#[tokio::test(start_paused = true)]
async fn deactivate_when_stopped_is_noop() {
    let h = Harness::new(MINUTE, 0, 23, 12);

    h.scheduler.deactivate();
    settle().await;

    assert!(!h.scheduler.is_running());
    assert_eq!(h.provider.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduler_restarts_after_stop() {
    let h = Harness::new(MINUTE, 0, 23, 12);

    h.scheduler.activate();
    settle().await;
    h.scheduler.deactivate();

    h.scheduler.activate();
    settle().await;

    assert!(h.scheduler.is_running());
    assert_eq!(
        h.notifier.broadcast_count(),
        2,
        "Each activation fires its own immediate delivery"
    );

    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    assert_eq!(
        h.notifier.broadcast_count(),
        3,
        "Only the new loop ticks"
    );

    h.scheduler.deactivate();
}

#[tokio::test(start_paused = true)]
async fn activation_reads_interval_from_config() {
    let h = Harness::new(MINUTE * 3, 0, 23, 12);
    assert_eq!(h.scheduler.current_period(), None);

    h.scheduler.activate();
    assert_eq!(h.scheduler.current_period(), Some(MINUTE * 3));
    settle().await;

    // Nothing before the first full interval
    tokio::time::sleep(MINUTE * 2).await;
    assert_eq!(h.provider.fetch_count(), 1);

    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    assert_eq!(h.provider.fetch_count(), 2);

    h.scheduler.deactivate();
}

#[tokio::test(start_paused = true)]
async fn dropping_scheduler_stops_loop() {
    let h = Harness::new(MINUTE, 0, 23, 12);
    let provider = h.provider.clone();

    h.scheduler.activate();
    settle().await;
    drop(h);

    tokio::time::sleep(MINUTE * 5).await;
    assert_eq!(provider.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn deactivate_does_not_wait_for_in_flight_cycle() {
    let provider = CountingProvider::gated();
    let h = Harness::with_provider(MINUTE, 0, 23, 12, provider.clone());

    h.scheduler.activate();
    settle().await;
    assert_eq!(provider.fetch_count(), 1);

    // First tick parks the loop inside its cycle
    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    assert_eq!(provider.fetch_count(), 2);
    assert_eq!(provider.completed_count(), 0);

    h.scheduler.deactivate();
    assert!(!h.scheduler.is_running());
    assert_eq!(h.notifier.broadcast_count(), 0);

    provider.open_gate();
    settle().await;
    assert_eq!(provider.completed_count(), 2);
    assert_eq!(
        h.notifier.broadcast_count(),
        2,
        "Cycles in flight at deactivation must still deliver"
    );

    tokio::time::sleep(MINUTE * 10).await;
    assert_eq!(provider.fetch_count(), 2);
    assert_eq!(h.notifier.broadcast_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn ticks_missed_during_slow_cycle_are_coalesced() {
    let provider = CountingProvider::gated();
    let h = Harness::with_provider(MINUTE, 0, 23, 12, provider.clone());

    h.scheduler.activate();
    settle().await;

    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    assert_eq!(provider.fetch_count(), 2);

    // Five ticks fall due while the scheduled fetch is stuck
    tokio::time::sleep(MINUTE * 5).await;
    assert_eq!(provider.fetch_count(), 2, "Cycles must never overlap");

    provider.open_gate();
    settle().await;
    assert_eq!(
        provider.fetch_count(),
        3,
        "Missed ticks collapse into a single catch-up cycle"
    );
    assert_eq!(h.notifier.broadcast_count(), 3);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.fetch_count(), 3);

    // Back on the original one-minute grid
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.fetch_count(), 4);

    h.scheduler.deactivate();
}
