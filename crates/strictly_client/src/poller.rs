//! Cancellable periodic refresh with a single-flight guarantee.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, trace, warn};

use crate::error::ClientError;

/// Clears the in-flight flag when the invocation settles, however it ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Counters {
    invocations: AtomicU64,
    skipped: AtomicU64,
}

/// Runs a refresh callback on an interval, never more than one at a time.
///
/// If the previous invocation has not settled when a tick comes due, the
/// tick is dropped: no queueing and no overlap. Stopping cancels the timer
/// only; an invocation already running is left to finish, and the callback
/// is responsible for checking whether its result is still wanted.
#[derive(Debug)]
pub struct SingleFlightPoller {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
    in_flight: Arc<AtomicBool>,
}

impl SingleFlightPoller {
    /// Invokes `callback` now and then every `interval`.
    ///
    /// A `None` or zero interval disables polling: the callback runs once.
    pub fn start<F, Fut>(name: &'static str, interval: Option<Duration>, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        Self::spawn(name, interval, false, callback)
    }

    /// Like [`start`](Self::start) but waits one interval before the first
    /// invocation, for callers that already refreshed.
    ///
    /// With polling disabled nothing runs at all.
    pub fn start_deferred<F, Fut>(
        name: &'static str,
        interval: Option<Duration>,
        callback: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        Self::spawn(name, interval, true, callback)
    }

    #[instrument(skip(callback))]
    fn spawn<F, Fut>(
        name: &'static str,
        interval: Option<Duration>,
        deferred: bool,
        callback: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let in_flight = Arc::new(AtomicBool::new(false));
        let period = interval.filter(|period| !period.is_zero());

        let handle = match (period, deferred) {
            (None, true) => {
                debug!(name, "Polling disabled, nothing scheduled");
                None
            }
            (None, false) => {
                debug!(name, "Polling disabled, single invocation");
                let callback = Arc::new(callback);
                try_invoke(name, &callback, &counters, &in_flight);
                None
            }
            (Some(period), deferred) => {
                info!(name, period_ms = period.as_millis() as u64, "Starting poller");
                let task = tick_loop(
                    name,
                    period,
                    deferred,
                    Arc::new(callback),
                    cancel.clone(),
                    counters.clone(),
                    in_flight.clone(),
                );
                Some(tokio::spawn(task.instrument(info_span!("poller", name))))
            }
        };

        Self {
            name,
            cancel,
            handle,
            counters,
            in_flight,
        }
    }

    /// Cancels the timer. An in-flight invocation keeps running.
    #[instrument(skip(self), fields(name = self.name))]
    pub fn stop(&mut self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping poller");
            self.cancel.cancel();
        }
        self.handle.take();
    }

    /// True until [`stop`](Self::stop) is called or the poller is dropped.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.cancel.is_cancelled()
    }

    /// True while a callback invocation has not settled.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of callback invocations started.
    pub fn invocations(&self) -> u64 {
        self.counters.invocations.load(Ordering::Relaxed)
    }

    /// Number of ticks dropped because an invocation was still in flight.
    pub fn skipped_ticks(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }
}

impl Drop for SingleFlightPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn tick_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    deferred: bool,
    callback: Arc<F>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    in_flight: Arc<AtomicBool>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
{
    let start = if deferred {
        Instant::now() + period
    } else {
        Instant::now()
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Poller cancelled");
                return;
            }
            _ = ticker.tick() => {
                try_invoke(name, &callback, &counters, &in_flight);
            }
        }
    }
}

/// Starts one invocation unless one is already in flight.
fn try_invoke<F, Fut>(
    name: &'static str,
    callback: &Arc<F>,
    counters: &Arc<Counters>,
    in_flight: &Arc<AtomicBool>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
{
    if in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        trace!(name, "Previous refresh still in flight, skipping tick");
        return;
    }
    counters.invocations.fetch_add(1, Ordering::Relaxed);

    let guard = InFlight(in_flight.clone());
    let fut = (callback.as_ref())();
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = fut.await {
            warn!(name, error = %e, "Refresh failed, will retry on next tick");
        }
    });
}
