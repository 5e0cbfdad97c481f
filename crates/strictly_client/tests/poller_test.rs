//! Tests for single-flight periodic refresh.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use strictly_client::{ClientError, ClientErrorKind, SingleFlightPoller};
use tokio::time::sleep;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Callback counting calls and the peak number running at once.
#[derive(Debug, Default)]
struct Probe {
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Probe {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn slow_callback(
    probe: Arc<Probe>,
    work: Duration,
) -> impl Fn() -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send>>
+ Send
+ Sync
+ 'static {
    move || {
        let probe = probe.clone();
        Box::pin(async move {
            probe.calls.fetch_add(1, Ordering::SeqCst);
            let now = probe.running.fetch_add(1, Ordering::SeqCst) + 1;
            probe.peak.fetch_max(now, Ordering::SeqCst);
            sleep(work).await;
            probe.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_invokes_immediately_then_every_period() {
    let probe = Arc::new(Probe::default());
    let _poller = SingleFlightPoller::start("test", Some(ms(100)), slow_callback(probe.clone(), ms(1)));

    sleep(ms(350)).await;

    // Ticks at 0, 100, 200 and 300.
    assert_eq!(probe.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_slow_callback_never_overlaps() {
    let probe = Arc::new(Probe::default());
    let poller =
        SingleFlightPoller::start("test", Some(ms(100)), slow_callback(probe.clone(), ms(250)));

    sleep(ms(950)).await;

    assert_eq!(probe.peak(), 1);
    // Runs at 0, 300, 600 and 900; every other tick is dropped.
    assert_eq!(probe.calls(), 4);
    assert_eq!(poller.invocations(), 4);
    assert_eq!(poller.skipped_ticks(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_start_waits_one_period() {
    let probe = Arc::new(Probe::default());
    let _poller = SingleFlightPoller::start_deferred(
        "test",
        Some(ms(2000)),
        slow_callback(probe.clone(), ms(1)),
    );

    sleep(ms(1900)).await;
    assert_eq!(probe.calls(), 0);

    sleep(ms(200)).await;
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_interval_runs_once() {
    let probe = Arc::new(Probe::default());
    let poller = SingleFlightPoller::start("test", None, slow_callback(probe.clone(), ms(1)));

    sleep(ms(10_000)).await;

    assert_eq!(probe.calls(), 1);
    assert!(!poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_disabled() {
    let probe = Arc::new(Probe::default());
    let _poller =
        SingleFlightPoller::start("test", Some(Duration::ZERO), slow_callback(probe.clone(), ms(1)));

    sleep(ms(10_000)).await;

    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_deferred_runs_nothing() {
    let probe = Arc::new(Probe::default());
    let poller = SingleFlightPoller::start_deferred("test", None, slow_callback(probe.clone(), ms(1)));

    sleep(ms(10_000)).await;

    assert_eq!(probe.calls(), 0);
    assert!(!poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_ticks() {
    let probe = Arc::new(Probe::default());
    let mut poller =
        SingleFlightPoller::start("test", Some(ms(100)), slow_callback(probe.clone(), ms(1)));

    sleep(ms(350)).await;
    assert!(poller.is_running());
    poller.stop();
    let before = probe.calls();

    sleep(ms(1000)).await;

    assert!(!poller.is_running());
    assert_eq!(probe.calls(), before);
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_in_flight_call_finish() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let mut poller = SingleFlightPoller::start("test", Some(ms(1000)), move || {
        let flag = flag.clone();
        async move {
            sleep(ms(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    sleep(ms(50)).await;
    assert!(poller.is_in_flight());
    poller.stop();

    sleep(ms(300)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert!(!poller.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_failures_keep_polling() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _poller = SingleFlightPoller::start("test", Some(ms(100)), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::new(ClientErrorKind::Transport(
                "connection refused".to_string(),
            )))
        }
    });

    sleep(ms(350)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_drop_cancels_timer() {
    let probe = Arc::new(Probe::default());
    let poller =
        SingleFlightPoller::start("test", Some(ms(100)), slow_callback(probe.clone(), ms(1)));

    sleep(ms(150)).await;
    drop(poller);
    let before = probe.calls();

    sleep(ms(1000)).await;
    assert_eq!(probe.calls(), before);
}
