//! Tests for the one-action-at-a-time gate.

use std::time::Duration;

use strictly_client::{ActionGate, GateOutcome};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_second_call_is_busy_while_first_in_flight() {
    let gate = ActionGate::new();

    let (first, second) = tokio::join!(
        gate.try_run(|| async {
            sleep(Duration::from_millis(50)).await;
            1
        }),
        gate.try_run(|| async { 2 }),
    );

    assert_eq!(first, GateOutcome::Ran(1));
    assert_eq!(second, GateOutcome::Busy);
    assert!(!gate.is_busy());
}

#[tokio::test]
async fn test_busy_call_never_runs_action() {
    let gate = ActionGate::new();
    let mut ran_second = false;

    let (first, second) = tokio::join!(
        gate.try_run(|| async {
            tokio::task::yield_now().await;
        }),
        gate.try_run(|| {
            ran_second = true;
            async {}
        }),
    );

    assert_eq!(first, GateOutcome::Ran(()));
    assert!(second.is_busy());
    assert!(!ran_second);
}

#[tokio::test]
async fn test_released_after_error() {
    let gate = ActionGate::new();

    let failed: GateOutcome<Result<(), String>> =
        gate.try_run(|| async { Err("rejected".to_string()) }).await;
    assert_eq!(failed, GateOutcome::Ran(Err("rejected".to_string())));
    assert!(!gate.is_busy());

    let next = gate.try_run(|| async { 7 }).await;
    assert_eq!(next, GateOutcome::Ran(7));
}

#[tokio::test(start_paused = true)]
async fn test_released_when_future_dropped() {
    let gate = ActionGate::new();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(10),
        gate.try_run(|| sleep(Duration::from_secs(60))),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!gate.is_busy());
}

#[tokio::test]
async fn test_released_after_panic() {
    let gate = ActionGate::new();
    let task_gate = gate.clone();

    let joined = tokio::spawn(async move {
        task_gate
            .try_run(|| async {
                if gate_should_panic() {
                    panic!("action blew up");
                }
            })
            .await
    })
    .await;

    assert!(joined.is_err());
    assert!(!gate.is_busy());
}

fn gate_should_panic() -> bool {
    true
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_the_flag() {
    let gate = ActionGate::new();
    let clone = gate.clone();

    let (first, second) = tokio::join!(
        gate.try_run(|| sleep(Duration::from_millis(20))),
        clone.try_run(|| async {}),
    );

    assert_eq!(first, GateOutcome::Ran(()));
    assert_eq!(second, GateOutcome::Busy);
}
