//! Per-game synchronization: polling, guarded actions, snapshot adoption.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use strictly_board::{DerivedView, GameId, GameSnapshot, SnapshotVersion, derive_view};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::GameBackend;
use crate::error::{ClientError, ClientErrorKind};
use crate::gate::{ActionGate, GateOutcome};
use crate::poller::SingleFlightPoller;
use crate::session::SessionStore;

/// How a guarded action settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    /// The backend accepted the action.
    Completed(T),
    /// Another action on this game was in flight; nothing was sent.
    Busy,
    /// The controller was unmounted before the response arrived.
    Discarded,
}

impl<T> ActionOutcome<T> {
    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            ActionOutcome::Completed(value) => Some(value),
            ActionOutcome::Busy | ActionOutcome::Discarded => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Adopted {
    version: SnapshotVersion,
    ticket: u64,
}

#[derive(Debug, Default)]
struct SyncState {
    adopted: Option<Adopted>,
    last_error: Option<String>,
}

/// Keeps one game's snapshot in sync with the backend.
///
/// Polls on an interval, runs mutating actions through an [`ActionGate`],
/// and adopts every authoritative snapshot that is not older than the one
/// held. Adopted snapshots are published on a watch channel.
///
/// Construct with [`GameSyncController::new`], then [`mount`](Self::mount).
/// After [`unmount`](Self::unmount) every late response is dropped.
#[derive(Debug)]
pub struct GameSyncController<B: GameBackend + 'static> {
    game_id: GameId,
    backend: Arc<B>,
    session: Arc<SessionStore>,
    gate: ActionGate,
    interval: Option<Duration>,
    state: Mutex<SyncState>,
    snapshot: watch::Sender<Option<GameSnapshot>>,
    alive: AtomicBool,
    next_ticket: AtomicU64,
    poller: Mutex<Option<SingleFlightPoller>>,
}

impl<B: GameBackend + 'static> GameSyncController<B> {
    /// Creates an unmounted controller for `game_id`.
    ///
    /// `interval` is the poll period; `None` or zero disables polling.
    #[instrument(skip(backend, session))]
    pub fn new(
        game_id: GameId,
        backend: Arc<B>,
        session: Arc<SessionStore>,
        interval: Option<Duration>,
    ) -> Arc<Self> {
        let (snapshot, _) = watch::channel(None);
        Arc::new(Self {
            game_id,
            backend,
            session,
            gate: ActionGate::new(),
            interval,
            state: Mutex::new(SyncState::default()),
            snapshot,
            alive: AtomicBool::new(true),
            next_ticket: AtomicU64::new(0),
            poller: Mutex::new(None),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<SingleFlightPoller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Game this controller follows.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// False once unmounted.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// True while the poller is scheduled.
    pub fn is_polling(&self) -> bool {
        self.lock_poller()
            .as_ref()
            .is_some_and(SingleFlightPoller::is_running)
    }

    /// Gate shared by this game's actions.
    pub fn gate(&self) -> &ActionGate {
        &self.gate
    }

    /// Refreshes once, then polls every interval.
    ///
    /// The poller is started even if the first refresh fails; the failure
    /// is recorded in [`last_error`](Self::last_error) and returned.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn mount(self: &Arc<Self>) -> Result<bool, ClientError> {
        if !self.is_alive() {
            debug!("Mount after unmount ignored");
            return Ok(false);
        }
        info!("Mounting game view");
        let first = self.refresh().await;

        if !self.is_alive() {
            return first;
        }
        let mut poller = self.lock_poller();
        if poller.is_none() {
            let weak = Arc::downgrade(self);
            *poller = Some(SingleFlightPoller::start_deferred(
                "game",
                self.interval,
                move || {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(controller) => controller.refresh().await.map(|_| ()),
                            None => Ok(()),
                        }
                    }
                },
            ));
        }
        first
    }

    /// Stops polling and drops every later settlement.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub fn unmount(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!("Unmounting game view");
        }
        if let Some(mut poller) = self.lock_poller().take() {
            poller.stop();
        }
    }

    /// Fetches the game and adopts the result if it is not older than the
    /// held snapshot. Returns whether it was adopted.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn refresh(&self) -> Result<bool, ClientError> {
        if !self.is_alive() {
            return Ok(false);
        }
        let ticket = self.issue_ticket();
        match self.backend.fetch_game(self.game_id).await {
            Ok(snapshot) => {
                self.clear_error();
                Ok(self.adopt(snapshot, ticket))
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Latest adopted snapshot.
    pub fn snapshot(&self) -> Option<GameSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// View of the latest snapshot for the signed-in member.
    pub fn view(&self) -> Option<DerivedView> {
        let profile = self.session.profile();
        self.snapshot
            .borrow()
            .as_ref()
            .map(|snapshot| derive_view(snapshot, profile.as_ref()))
    }

    /// Receives every adopted snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<GameSnapshot>> {
        self.snapshot.subscribe()
    }

    /// User-facing message of the last failed poll or action, cleared on the
    /// next success.
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// Plays `position` if the view allows it.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn make_move(
        &self,
        position: usize,
    ) -> Result<ActionOutcome<GameSnapshot>, ClientError> {
        let view = self.require_view()?;
        if !view.is_legal_move(position) {
            return Err(illegal(format!("Cell {} is not a legal move", position)));
        }
        let ticket = self.issue_ticket();
        self.guarded("move", || async move {
            let snapshot = self.backend.submit_move(self.game_id, position).await?;
            self.adopt(snapshot.clone(), ticket);
            Ok(snapshot)
        })
        .await
    }

    /// Closes the game if the view allows it.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn close(&self) -> Result<ActionOutcome<GameSnapshot>, ClientError> {
        if !*self.require_view()?.can_close() {
            return Err(illegal("Only the creator may close an open or finished game"));
        }
        let ticket = self.issue_ticket();
        self.guarded("close", || async move {
            let snapshot = self.backend.close_game(self.game_id).await?;
            self.adopt(snapshot.clone(), ticket);
            Ok(snapshot)
        })
        .await
    }

    /// Takes the open seat if the view allows it.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn join(&self) -> Result<ActionOutcome<GameSnapshot>, ClientError> {
        if !*self.require_view()?.can_join() {
            return Err(illegal("This game cannot be joined"));
        }
        let ticket = self.issue_ticket();
        self.guarded("join", || async move {
            let snapshot = self.backend.join_game(self.game_id).await?;
            self.adopt(snapshot.clone(), ticket);
            Ok(snapshot)
        })
        .await
    }

    /// Requests a rematch. The completed value is the new game's id; the
    /// caller moves to it.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn rematch(&self) -> Result<ActionOutcome<GameId>, ClientError> {
        if !*self.require_view()?.can_rematch() {
            return Err(illegal("A rematch needs a finished game"));
        }
        self.guarded("rematch", || async move {
            let game = self.backend.request_rematch(self.game_id).await?;
            info!(new_game_id = game.id, "Rematch created");
            Ok(game.id)
        })
        .await
    }

    fn require_view(&self) -> Result<DerivedView, ClientError> {
        self.view().ok_or_else(|| illegal("Game not loaded yet"))
    }

    async fn guarded<T, F, Fut>(
        &self,
        action: &'static str,
        request: F,
    ) -> Result<ActionOutcome<T>, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let result = match self.gate.try_run(request).await {
            GateOutcome::Busy => {
                debug!(action, "Another action in flight");
                return Ok(ActionOutcome::Busy);
            }
            GateOutcome::Ran(result) => result,
        };
        if !self.is_alive() {
            debug!(action, "Unmounted while in flight, discarding");
            return Ok(ActionOutcome::Discarded);
        }
        match result {
            Ok(value) => {
                self.clear_error();
                Ok(ActionOutcome::Completed(value))
            }
            Err(e) => {
                warn!(action, error = %e, "Action failed");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    fn issue_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Replaces the held snapshot with `snapshot` unless it is older.
    fn adopt(&self, snapshot: GameSnapshot, ticket: u64) -> bool {
        if !self.is_alive() {
            return false;
        }
        if *snapshot.id() != self.game_id {
            warn!(got = snapshot.id(), "Snapshot for another game, discarding");
            return false;
        }
        let version = snapshot.version();
        let mut state = self.lock_state();
        let newer = match state.adopted {
            None => true,
            Some(held) => {
                version > held.version || (version == held.version && ticket > held.ticket)
            }
        };
        if !newer {
            debug!(ticket, ?version, "Older than held snapshot, discarding");
            return false;
        }
        state.adopted = Some(Adopted { version, ticket });
        debug!(ticket, ?version, status = %snapshot.status(), "Snapshot adopted");
        self.snapshot.send_replace(Some(snapshot));
        true
    }

    fn record_error(&self, error: &ClientError) {
        if self.is_alive() {
            self.lock_state().last_error = Some(error.user_message());
        }
    }

    fn clear_error(&self) {
        if self.is_alive() {
            self.lock_state().last_error = None;
        }
    }
}

impl<B: GameBackend + 'static> Drop for GameSyncController<B> {
    fn drop(&mut self) {
        let poller = self
            .poller
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut poller) = poller.take() {
            poller.stop();
        }
    }
}

#[track_caller]
fn illegal(message: impl Into<String>) -> ClientError {
    ClientError::new(ClientErrorKind::IllegalAction(message.into()))
}
