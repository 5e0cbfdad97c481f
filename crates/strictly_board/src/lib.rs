//! Pure tic-tac-toe state as seen by a polling client.
//!
//! This crate holds the server snapshot types and the derivation that turns
//! a snapshot plus the local identity into "what may I do now". It performs
//! no I/O, so every rule here is testable without a network or a clock.
//!
//! # Example
//!
//! ```
//! use strictly_board::{Board, GameSnapshot, GameStatus, Symbol, derive_for_user};
//!
//! let snapshot = GameSnapshot::new(
//!     7,
//!     Board::new(),
//!     GameStatus::InProgress,
//!     Some(Symbol::X),
//!     Some(1),
//!     Some(2),
//!     1,
//!     None,
//! );
//! let view = derive_for_user(&snapshot, Some(1));
//! assert!(*view.is_your_turn());
//! assert_eq!(view.legal_cells().len(), 9);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod types;
mod view;

pub use types::{
    BOARD_CELLS, Board, BoardError, Cell, GameId, GameRef, GameResult, GameSnapshot, GameStatus,
    SnapshotVersion, Symbol, UserId, UserProfile,
};
pub use view::{DerivedView, derive_for_user, derive_view, status_text};
