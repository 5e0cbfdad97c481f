//! Core domain types for server-reported tic-tac-toe state.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_new::new;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::instrument;

/// Server-assigned game identifier.
pub type GameId = u64;

/// Server-assigned member identifier.
pub type UserId = u64;

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// A player symbol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
pub enum Symbol {
    /// Player X (moves first).
    X,
    /// Player O.
    O,
}

impl Symbol {
    /// Returns the opposing symbol.
    pub fn opponent(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

/// A single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    /// Nobody has played here.
    Empty,
    /// Occupied by a symbol.
    Taken(Symbol),
}

impl Cell {
    /// Returns true if the cell is empty.
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }
}

/// Error raised when a board payload violates the 9-cell shape.
#[derive(Debug, Clone, Display, Error)]
#[display("Board error: {} at {}:{}", message, file, line)]
pub struct BoardError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl BoardError {
    /// Creates a new board error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// 3x3 board in row-major order.
///
/// On the wire the board is a list of nine strings, each `""`, `"X"` or
/// `"O"`. `null` is accepted as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<String>>", into = "Vec<String>")]
pub struct Board {
    cells: [Cell; BOARD_CELLS],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self {
            cells: [Cell::Empty; BOARD_CELLS],
        }
    }

    /// Builds a board from cells.
    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self { cells }
    }

    /// Parses the textual form used by the backend.
    #[instrument(skip(raw))]
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, BoardError> {
        if raw.len() != BOARD_CELLS {
            return Err(BoardError::new(format!(
                "expected {} cells, got {}",
                BOARD_CELLS,
                raw.len()
            )));
        }
        let mut cells = [Cell::Empty; BOARD_CELLS];
        for (idx, value) in raw.iter().enumerate() {
            cells[idx] = parse_cell(value.as_ref())?;
        }
        Ok(Self { cells })
    }

    /// Gets the cell at `pos`, if in range.
    pub fn get(&self, pos: usize) -> Option<Cell> {
        self.cells.get(pos).copied()
    }

    /// Returns all cells.
    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.cells
    }

    /// Indices of empty cells, ascending.
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(idx, _)| idx)
    }

    /// Number of occupied cells.
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// Formats the board as a human-readable grid; empty cells show their
    /// index so the user can type it.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let pos = row * 3 + col;
                let symbol = match self.cells[pos] {
                    Cell::Empty => pos.to_string(),
                    Cell::Taken(symbol) => symbol.to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cell(value: &str) -> Result<Cell, BoardError> {
    match value {
        "" => Ok(Cell::Empty),
        "X" => Ok(Cell::Taken(Symbol::X)),
        "O" => Ok(Cell::Taken(Symbol::O)),
        other => Err(BoardError::new(format!("unknown cell value {:?}", other))),
    }
}

impl TryFrom<Vec<Option<String>>> for Board {
    type Error = BoardError;

    fn try_from(raw: Vec<Option<String>>) -> Result<Self, Self::Error> {
        let values: Vec<String> = raw.into_iter().map(Option::unwrap_or_default).collect();
        Board::parse(&values)
    }
}

impl From<Board> for Vec<String> {
    fn from(board: Board) -> Self {
        board
            .cells
            .iter()
            .map(|cell| match cell {
                Cell::Empty => String::new(),
                Cell::Taken(symbol) => symbol.to_string(),
            })
            .collect()
    }
}

/// Lifecycle status of a game, as reported by the server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GameStatus {
    /// Waiting for a second player.
    Open,
    /// Both seats taken, moves being played.
    InProgress,
    /// Game ended with a result.
    Finished,
    /// Closed by its creator; terminal.
    Closed,
}

impl GameStatus {
    /// Position in the forward-only lifecycle.
    pub fn rank(self) -> u8 {
        match self {
            GameStatus::Open => 0,
            GameStatus::InProgress => 1,
            GameStatus::Finished => 2,
            GameStatus::Closed => 3,
        }
    }

    /// Returns true if the server may move a game from `self` to `next`.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Open, GameStatus::InProgress)
                | (GameStatus::InProgress, GameStatus::Finished)
                | (GameStatus::Open, GameStatus::Closed)
                | (GameStatus::Finished, GameStatus::Closed)
        )
    }
}

/// Final result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    /// X completed a line.
    XWin,
    /// O completed a line.
    OWin,
    /// Board filled with no line.
    Draw,
}

impl GameResult {
    /// The winning symbol, if any.
    pub fn winner(self) -> Option<Symbol> {
        match self {
            GameResult::XWin => Some(Symbol::X),
            GameResult::OWin => Some(Symbol::O),
            GameResult::Draw => None,
        }
    }

    /// Short human-readable outcome.
    pub fn label(self) -> &'static str {
        match self {
            GameResult::XWin => "X wins",
            GameResult::OWin => "O wins",
            GameResult::Draw => "draw",
        }
    }
}

/// Player reference as sent by the backend: either a bare id or an
/// embedded member object.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlayerRef {
    Id(UserId),
    Member { id: UserId },
}

impl From<PlayerRef> for UserId {
    fn from(value: PlayerRef) -> Self {
        match value {
            PlayerRef::Id(id) | PlayerRef::Member { id } => id,
        }
    }
}

fn player_ref<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    PlayerRef::deserialize(deserializer).map(UserId::from)
}

fn optional_player_ref<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<PlayerRef>::deserialize(deserializer).map(|opt| opt.map(UserId::from))
}

/// Authoritative server state of one game at one point in time.
///
/// Snapshots are never patched; every poll or action response replaces
/// the held one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct GameSnapshot {
    /// Game id.
    id: GameId,
    /// Board cells.
    board: Board,
    /// Lifecycle status.
    status: GameStatus,
    /// Whose move it is; only meaningful while in progress.
    #[getter(skip)]
    #[serde(default)]
    next_turn: Option<Symbol>,
    /// Member playing X.
    #[serde(default, deserialize_with = "optional_player_ref")]
    x_player: Option<UserId>,
    /// Member playing O.
    #[serde(default, deserialize_with = "optional_player_ref")]
    o_player: Option<UserId>,
    /// Member who created the game.
    #[serde(deserialize_with = "player_ref")]
    creator: UserId,
    /// Outcome; only meaningful once finished.
    #[getter(skip)]
    #[serde(default)]
    result: Option<GameResult>,
    /// Creation time, when the backend reports it.
    #[new(default)]
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    /// Finish time, when the backend reports it.
    #[new(default)]
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl GameSnapshot {
    /// Symbol to move, or `None` unless the game is in progress.
    pub fn turn(&self) -> Option<Symbol> {
        match self.status {
            GameStatus::InProgress => self.next_turn,
            _ => None,
        }
    }

    /// Result, or `None` unless the game is finished.
    pub fn outcome(&self) -> Option<GameResult> {
        match self.status {
            GameStatus::Finished => self.result,
            _ => None,
        }
    }

    /// Symbol seated for `user`, if any.
    pub fn symbol_of(&self, user: UserId) -> Option<Symbol> {
        if self.x_player == Some(user) {
            Some(Symbol::X)
        } else if self.o_player == Some(user) {
            Some(Symbol::O)
        } else {
            None
        }
    }

    /// Monotonic progress marker used to order snapshots of the same game.
    pub fn version(&self) -> SnapshotVersion {
        SnapshotVersion {
            status_rank: self.status.rank(),
            filled: self.board.filled() as u8,
        }
    }
}

/// Progress of a game on the server.
///
/// Status only moves forward and cells never empty, so for a single game
/// id this ordering never goes backwards on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion {
    status_rank: u8,
    filled: u8,
}

/// Lightweight reference to a game, returned by create and rematch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct GameRef {
    /// Game id.
    #[serde(alias = "game_id", alias = "new_game_id")]
    pub id: GameId,
}

/// Member profile and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct UserProfile {
    /// Member id.
    id: UserId,
    /// Login name.
    username: String,
    /// Optional public name; blank values are treated as absent.
    #[getter(skip)]
    #[serde(default)]
    display_name: Option<String>,
    /// Rating.
    #[new(value = "1200")]
    #[serde(default)]
    rating: i32,
    /// Games played.
    #[new(default)]
    #[serde(default)]
    games_played: u32,
    /// Games won.
    #[new(default)]
    #[serde(default)]
    wins: u32,
    /// Games lost.
    #[new(default)]
    #[serde(default)]
    losses: u32,
    /// Games drawn.
    #[new(default)]
    #[serde(default)]
    draws: u32,
}

impl UserProfile {
    /// Display name, if set and non-blank.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Name to show in the UI: display name, falling back to username.
    pub fn label(&self) -> &str {
        self.display_name().unwrap_or(&self.username)
    }
}
