//! Shared fakes for client integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use strictly_board::{
    BOARD_CELLS, Board, Cell, GameId, GameRef, GameResult, GameSnapshot, GameStatus, Symbol,
    UserId, UserProfile,
};
use strictly_client::{
    ApiRequest, ApiResponse, AuthBackend, AuthResponse, ClientError, ClientErrorKind,
    Credentials, GameBackend, MemoryTokenStorage, ProfilePatch, Registration, SessionStore,
    StorageError, TokenStorage, Transport,
};

pub const GAME_ID: GameId = 1;
pub const X_USER: UserId = 10;
pub const O_USER: UserId = 20;
pub const STRANGER: UserId = 99;

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub fn member(id: UserId, username: &str) -> UserProfile {
    UserProfile::new(id, username.to_string(), None)
}

pub fn board(cells: [&str; 9]) -> Board {
    Board::parse(&cells).expect("valid board")
}

/// X (creator) against O, X to move on an empty board.
pub fn fresh_game() -> GameSnapshot {
    GameSnapshot::new(
        GAME_ID,
        Board::new(),
        GameStatus::InProgress,
        Some(Symbol::X),
        Some(X_USER),
        Some(O_USER),
        X_USER,
        None,
    )
}

pub fn open_game(id: GameId, creator: UserId) -> GameSnapshot {
    GameSnapshot::new(
        id,
        Board::new(),
        GameStatus::Open,
        None,
        Some(creator),
        None,
        creator,
        None,
    )
}

pub fn finished_draw() -> GameSnapshot {
    GameSnapshot::new(
        GAME_ID,
        board(["X", "O", "X", "X", "O", "O", "O", "X", "X"]),
        GameStatus::Finished,
        None,
        Some(X_USER),
        Some(O_USER),
        X_USER,
        Some(GameResult::Draw),
    )
}

fn stale(detail: &str) -> ClientError {
    ClientError::from_status(409, &format!(r#"{{"detail":"{}"}}"#, detail))
}

/// Applies a move the way the server would, without win detection.
pub fn play(game: &GameSnapshot, position: usize) -> Result<GameSnapshot, ClientError> {
    let symbol = game.turn().ok_or_else(|| stale("Game is not in progress"))?;
    let mut cells = *game.board().cells();
    if position >= BOARD_CELLS || !cells[position].is_empty() {
        return Err(stale("Cell is not available"));
    }
    cells[position] = Cell::Taken(symbol);
    let board = Board::from_cells(cells);
    let full = board.filled() == BOARD_CELLS;
    Ok(GameSnapshot::new(
        *game.id(),
        board,
        if full {
            GameStatus::Finished
        } else {
            GameStatus::InProgress
        },
        (!full).then(|| symbol.opponent()),
        *game.x_player(),
        *game.o_player(),
        *game.creator(),
        full.then_some(GameResult::Draw),
    ))
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// In-memory backend that counts every call.
#[derive(Debug)]
pub struct FakeBackend {
    game: Mutex<GameSnapshot>,
    open_games: Mutex<Vec<GameSnapshot>>,
    login: Mutex<Option<AuthResponse>>,
    profile: Mutex<Option<UserProfile>>,
    fetch_delay: Mutex<Duration>,
    action_delay: Mutex<Duration>,
    fail_fetch: AtomicBool,
    fail_logout: AtomicBool,
    next_game_id: AtomicU64,
    logged_out_tokens: Mutex<Vec<String>>,
    pub fetch_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub move_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub join_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub rematch_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(game: GameSnapshot) -> Self {
        Self {
            game: Mutex::new(game),
            open_games: Mutex::new(Vec::new()),
            login: Mutex::new(None),
            profile: Mutex::new(None),
            fetch_delay: Mutex::new(Duration::ZERO),
            action_delay: Mutex::new(Duration::ZERO),
            fail_fetch: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            next_game_id: AtomicU64::new(100),
            logged_out_tokens: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            move_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            join_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            rematch_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    pub fn game(&self) -> GameSnapshot {
        self.game.lock().unwrap().clone()
    }

    pub fn set_game(&self, game: GameSnapshot) {
        *self.game.lock().unwrap() = game;
    }

    pub fn set_open_games(&self, games: Vec<GameSnapshot>) {
        *self.open_games.lock().unwrap() = games;
    }

    pub fn set_login(&self, response: Option<AuthResponse>) {
        *self.login.lock().unwrap() = response;
    }

    pub fn set_profile(&self, profile: Option<UserProfile>) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_action_delay(&self, delay: Duration) {
        *self.action_delay.lock().unwrap() = delay;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn logged_out_tokens(&self) -> Vec<String> {
        self.logged_out_tokens.lock().unwrap().clone()
    }

    fn action_delay(&self) -> Duration {
        *self.action_delay.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<AuthResponse, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::from_status(400, r#"{"detail":"Invalid credentials"}"#))
    }

    async fn register(&self, _registration: &Registration) -> Result<AuthResponse, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| {
                ClientError::from_status(400, r#"{"username":["This username is taken."]}"#)
            })
    }

    async fn logout(&self, token: &str) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logged_out_tokens.lock().unwrap().push(token.to_string());
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ClientError::new(ClientErrorKind::Transport(
                "connection reset".to_string(),
            )));
        }
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<UserProfile, ClientError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::from_status(500, ""))
    }

    async fn update_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, ClientError> {
        let current = self
            .profile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::from_status(500, ""))?;
        let updated = UserProfile::new(
            *current.id(),
            current.username().clone(),
            Some(patch.display_name.clone()),
        );
        *self.profile.lock().unwrap() = Some(updated.clone());
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl GameBackend for FakeBackend {
    /// Returns the held game whatever `id` is asked for.
    async fn fetch_game(&self, _id: GameId) -> Result<GameSnapshot, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        // Captured before the delay, so a slow fetch returns old state.
        let game = self.game();
        let delay = *self.fetch_delay.lock().unwrap();
        pause(delay).await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::from_status(503, ""));
        }
        Ok(game)
    }

    async fn list_open_games(&self) -> Result<Vec<GameSnapshot>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let games = self.open_games.lock().unwrap().clone();
        let delay = *self.fetch_delay.lock().unwrap();
        pause(delay).await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::from_status(503, ""));
        }
        Ok(games)
    }

    async fn create_game(&self) -> Result<GameRef, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.action_delay()).await;
        Ok(GameRef::new(self.next_game_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn join_game(&self, id: GameId) -> Result<GameSnapshot, ClientError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.action_delay()).await;
        let mut games = self.open_games.lock().unwrap();
        let position = games
            .iter()
            .position(|game| *game.id() == id)
            .ok_or_else(|| stale("Game is no longer open"))?;
        let game = games.remove(position);
        Ok(GameSnapshot::new(
            id,
            Board::new(),
            GameStatus::InProgress,
            Some(Symbol::X),
            *game.x_player(),
            Some(O_USER),
            *game.creator(),
            None,
        ))
    }

    async fn submit_move(&self, id: GameId, position: usize) -> Result<GameSnapshot, ClientError> {
        self.move_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.action_delay()).await;
        let mut game = self.game.lock().unwrap();
        if *game.id() != id {
            return Err(ClientError::from_status(404, ""));
        }
        let next = play(&game, position)?;
        *game = next.clone();
        Ok(next)
    }

    async fn close_game(&self, id: GameId) -> Result<GameSnapshot, ClientError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.action_delay()).await;
        let mut game = self.game.lock().unwrap();
        if *game.id() != id {
            return Err(ClientError::from_status(404, ""));
        }
        let closed = GameSnapshot::new(
            id,
            game.board().clone(),
            GameStatus::Closed,
            None,
            *game.x_player(),
            *game.o_player(),
            *game.creator(),
            game.outcome(),
        );
        *game = closed.clone();
        Ok(closed)
    }

    async fn request_rematch(&self, _id: GameId) -> Result<GameRef, ClientError> {
        self.rematch_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.action_delay()).await;
        Ok(GameRef::new(self.next_game_id.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Signs `user` in against `backend` with an embedded profile.
pub async fn signed_in(backend: &FakeBackend, user: UserProfile) -> Arc<SessionStore> {
    backend.set_login(Some(AuthResponse {
        token: format!("token-{}", user.id()),
        member: Some(user.clone()),
    }));
    backend.set_profile(Some(user));
    let session = Arc::new(SessionStore::new(MemoryTokenStorage::default()));
    session
        .authenticate(backend, "player", "secret")
        .await
        .expect("sign in");
    session
}

#[derive(Debug)]
struct ScriptState {
    responses: VecDeque<ApiResponse>,
    requests: Vec<ApiRequest>,
    delay: Duration,
}

/// Transport replaying scripted responses and recording every request.
///
/// With the script exhausted it answers `200` with an empty body.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                responses: VecDeque::new(),
                requests: Vec::new(),
                delay: Duration::ZERO,
            })),
        }
    }

    pub fn respond(&self, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(ApiResponse::new(status, body.to_string()));
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> ApiRequest {
        self.requests().pop().expect("a request was sent")
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let (response, delay) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request);
            let response = state
                .responses
                .pop_front()
                .unwrap_or_else(|| ApiResponse::new(200, String::new()));
            (response, state.delay)
        };
        pause(delay).await;
        Ok(response)
    }
}

/// Storage whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStorage;

impl TokenStorage for FailingStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Err(StorageError::new("storage unavailable"))
    }

    fn save(&self, _token: &str) -> Result<(), StorageError> {
        Err(StorageError::new("disk full"))
    }

    fn clear(&self) -> Result<(), StorageError> {
        Err(StorageError::new("disk full"))
    }
}
