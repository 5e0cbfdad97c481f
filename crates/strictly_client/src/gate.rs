//! One-at-a-time guard for mutating game actions.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument};

/// Result of [`ActionGate::try_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The action ran and settled with this value.
    Ran(T),
    /// Another guarded action was in flight; nothing was run.
    Busy,
}

impl<T> GateOutcome<T> {
    /// True if the action was refused.
    pub fn is_busy(&self) -> bool {
        matches!(self, GateOutcome::Busy)
    }
}

/// Releases the busy flag on drop: success, error, panic or cancellation.
struct Held(Arc<AtomicBool>);

impl Drop for Held {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
        debug!("Action gate released");
    }
}

/// Busy flag shared by every mutating action of one game session.
///
/// Move, close, rematch and join all go through the same gate, so no two
/// of them are ever in flight together against the same snapshot. Clones
/// share the flag.
#[derive(Debug, Clone, Default)]
pub struct ActionGate {
    busy: Arc<AtomicBool>,
}

impl ActionGate {
    /// Creates an idle gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a guarded action is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Runs `action` unless another guarded action is in flight.
    ///
    /// Never queues: a busy gate returns [`GateOutcome::Busy`] immediately
    /// without calling `action`.
    #[instrument(skip_all)]
    pub async fn try_run<F, Fut, T>(&self, action: F) -> GateOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Action gate busy, refusing");
            return GateOutcome::Busy;
        }
        let _held = Held(self.busy.clone());
        GateOutcome::Ran(action().await)
    }
}
