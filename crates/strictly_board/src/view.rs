//! Pure derivation of what the local user may do with a game.
//!
//! Everything here is a function of a [`GameSnapshot`] and the local
//! identity. No I/O, no clocks, no shared state: the view is recomputed
//! whenever either input changes and never stored.

use std::collections::BTreeSet;

use derive_getters::Getters;
use serde::Serialize;
use tracing::{instrument, trace};

use crate::types::{GameResult, GameSnapshot, GameStatus, Symbol, UserId, UserProfile};

/// Ephemeral per-user view of a game snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct DerivedView {
    /// Symbol the local user plays, if seated.
    your_symbol: Option<Symbol>,
    /// True when the server is waiting on the local user's move.
    is_your_turn: bool,
    /// Cells the local user may play right now.
    legal_cells: BTreeSet<usize>,
    /// True when the local user may close the game.
    can_close: bool,
    /// True when a rematch may be requested.
    can_rematch: bool,
    /// True when the local user may take the open seat.
    can_join: bool,
    /// Human-readable status line.
    status_text: String,
}

impl DerivedView {
    /// Returns true if `pos` is a legal move for the local user.
    pub fn is_legal_move(&self, pos: usize) -> bool {
        self.legal_cells.contains(&pos)
    }
}

/// Derives the view of `snapshot` for `user`.
///
/// `user` is `None` for anonymous viewers, who own no symbol and may not
/// close or join.
#[instrument(skip_all, fields(game_id = snapshot.id(), status = %snapshot.status()))]
pub fn derive_view(snapshot: &GameSnapshot, user: Option<&UserProfile>) -> DerivedView {
    derive_for_user(snapshot, user.map(|profile| *profile.id()))
}

/// Same as [`derive_view`] keyed by bare user id.
pub fn derive_for_user(snapshot: &GameSnapshot, user: Option<UserId>) -> DerivedView {
    let status = *snapshot.status();
    let your_symbol = user.and_then(|id| snapshot.symbol_of(id));
    let is_your_turn = status == GameStatus::InProgress
        && your_symbol.is_some()
        && snapshot.turn() == your_symbol;

    let legal_cells = if is_your_turn {
        snapshot.board().empty_cells().collect()
    } else {
        BTreeSet::new()
    };

    let is_creator = user.is_some_and(|id| id == *snapshot.creator());
    let can_close = is_creator && matches!(status, GameStatus::Open | GameStatus::Finished);
    let can_rematch = status == GameStatus::Finished;
    let can_join =
        status == GameStatus::Open && user.is_some() && !is_creator && your_symbol.is_none();

    let view = DerivedView {
        your_symbol,
        is_your_turn,
        legal_cells,
        can_close,
        can_rematch,
        can_join,
        status_text: status_text(status, snapshot.outcome(), snapshot.turn()),
    };
    trace!(?view, "Derived view");
    view
}

/// Status line for a game.
///
/// A pure function of `(status, result, next_turn)`.
pub fn status_text(
    status: GameStatus,
    result: Option<GameResult>,
    next_turn: Option<Symbol>,
) -> String {
    match status {
        GameStatus::Finished => match result {
            Some(result) => format!("Game over: {}", result.label()),
            None => "Game over".to_string(),
        },
        GameStatus::Open => "Game open, waiting for opponent".to_string(),
        GameStatus::InProgress => match next_turn {
            Some(symbol) => format!("Next turn: {}", symbol),
            None => "Game in progress".to_string(),
        },
        GameStatus::Closed => "Game closed".to_string(),
    }
}
