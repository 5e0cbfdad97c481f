//! Open-games listing kept in sync with the backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use strictly_board::{GameId, GameSnapshot, derive_for_user};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::GameBackend;
use crate::error::{ClientError, ClientErrorKind};
use crate::gate::{ActionGate, GateOutcome};
use crate::poller::SingleFlightPoller;
use crate::session::SessionStore;
use crate::sync::ActionOutcome;

#[derive(Debug, Default)]
struct LobbyState {
    adopted_ticket: u64,
    last_error: Option<String>,
}

/// Polls the open-games list and runs create and join through one gate.
///
/// Listings carry no version, so the response to the most recently issued
/// request wins.
#[derive(Debug)]
pub struct LobbyController<B: GameBackend + 'static> {
    backend: Arc<B>,
    session: Arc<SessionStore>,
    gate: ActionGate,
    interval: Option<Duration>,
    state: Mutex<LobbyState>,
    games: watch::Sender<Vec<GameSnapshot>>,
    alive: AtomicBool,
    next_ticket: AtomicU64,
    poller: Mutex<Option<SingleFlightPoller>>,
}

impl<B: GameBackend + 'static> LobbyController<B> {
    /// Creates an unmounted lobby.
    #[instrument(skip(backend, session))]
    pub fn new(
        backend: Arc<B>,
        session: Arc<SessionStore>,
        interval: Option<Duration>,
    ) -> Arc<Self> {
        let (games, _) = watch::channel(Vec::new());
        Arc::new(Self {
            backend,
            session,
            gate: ActionGate::new(),
            interval,
            state: Mutex::new(LobbyState::default()),
            games,
            alive: AtomicBool::new(true),
            next_ticket: AtomicU64::new(0),
            poller: Mutex::new(None),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, LobbyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<SingleFlightPoller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False once unmounted.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Refreshes once, then polls every interval.
    #[instrument(skip(self))]
    pub async fn mount(self: &Arc<Self>) -> Result<bool, ClientError> {
        if !self.is_alive() {
            return Ok(false);
        }
        info!("Mounting lobby");
        let first = self.refresh().await;

        if !self.is_alive() {
            return first;
        }
        let mut poller = self.lock_poller();
        if poller.is_none() {
            let weak = Arc::downgrade(self);
            *poller = Some(SingleFlightPoller::start_deferred(
                "lobby",
                self.interval,
                move || {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(lobby) => lobby.refresh().await.map(|_| ()),
                            None => Ok(()),
                        }
                    }
                },
            ));
        }
        first
    }

    /// Stops polling and drops every later settlement.
    #[instrument(skip(self))]
    pub fn unmount(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!("Unmounting lobby");
        }
        if let Some(mut poller) = self.lock_poller().take() {
            poller.stop();
        }
    }

    /// Fetches the open games. Returns whether the listing was adopted.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<bool, ClientError> {
        if !self.is_alive() {
            return Ok(false);
        }
        let ticket = self.next_ticket.fetch_add(1, Ordering::AcqRel) + 1;
        let result = self.backend.list_open_games().await;
        if !self.is_alive() {
            return Ok(false);
        }

        let mut state = self.lock_state();
        match result {
            Ok(games) => {
                state.last_error = None;
                if ticket <= state.adopted_ticket {
                    debug!(ticket, "Newer listing already held, discarding");
                    return Ok(false);
                }
                state.adopted_ticket = ticket;
                debug!(count = games.len(), "Open games adopted");
                self.games.send_replace(games);
                Ok(true)
            }
            Err(e) => {
                state.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Latest open-games listing.
    pub fn open_games(&self) -> Vec<GameSnapshot> {
        self.games.borrow().clone()
    }

    /// Receives every adopted listing.
    pub fn subscribe(&self) -> watch::Receiver<Vec<GameSnapshot>> {
        self.games.subscribe()
    }

    /// User-facing message of the last failure, cleared on the next success.
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// Creates a game owned by the signed-in member and returns its id.
    #[instrument(skip(self))]
    pub async fn create_game(&self) -> Result<ActionOutcome<GameId>, ClientError> {
        if !self.session.is_authenticated() {
            return Err(ClientError::new(ClientErrorKind::NotAuthenticated));
        }
        let outcome = self
            .gate
            .try_run(|| async { self.backend.create_game().await.map(|game| game.id) })
            .await;
        self.settle("create", outcome)
    }

    /// Joins a listed game the signed-in member may join.
    #[instrument(skip(self))]
    pub async fn join(&self, game_id: GameId) -> Result<ActionOutcome<GameSnapshot>, ClientError> {
        let listed = self
            .games
            .borrow()
            .iter()
            .find(|game| *game.id() == game_id)
            .cloned();
        let Some(game) = listed else {
            return Err(ClientError::new(ClientErrorKind::IllegalAction(format!(
                "Game {} is not open",
                game_id
            ))));
        };
        if !*derive_for_user(&game, self.session.user_id()).can_join() {
            return Err(ClientError::new(ClientErrorKind::IllegalAction(
                "This game cannot be joined".to_string(),
            )));
        }
        let outcome = self
            .gate
            .try_run(|| self.backend.join_game(game_id))
            .await;
        self.settle("join", outcome)
    }

    fn settle<T>(
        &self,
        action: &'static str,
        outcome: GateOutcome<Result<T, ClientError>>,
    ) -> Result<ActionOutcome<T>, ClientError> {
        let result = match outcome {
            GateOutcome::Busy => return Ok(ActionOutcome::Busy),
            GateOutcome::Ran(result) => result,
        };
        if !self.is_alive() {
            debug!(action, "Lobby unmounted while in flight, discarding");
            return Ok(ActionOutcome::Discarded);
        }
        match result {
            Ok(value) => {
                self.lock_state().last_error = None;
                info!(action, "Lobby action completed");
                Ok(ActionOutcome::Completed(value))
            }
            Err(e) => {
                warn!(action, error = %e, "Lobby action failed");
                self.lock_state().last_error = Some(e.user_message());
                Err(e)
            }
        }
    }
}

impl<B: GameBackend + 'static> Drop for LobbyController<B> {
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
