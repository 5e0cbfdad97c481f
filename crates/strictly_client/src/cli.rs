//! Command-line interface for strictly_client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strictly tic-tac-toe client
#[derive(Parser, Debug)]
#[command(name = "strictly_client")]
#[command(about = "Play server-authoritative tic-tac-toe from the terminal", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides config and STRICTLY_SERVER_URL)
    #[arg(long, global = true)]
    pub server_url: Option<String>,

    /// Session token file (overrides config and STRICTLY_TOKEN_PATH)
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account and sign in
    Register {
        /// Login name
        username: String,
        /// Password
        password: String,
        /// Name shown to other players
        #[arg(long)]
        display_name: Option<String>,
    },

    /// Sign in
    Login {
        /// Login name
        username: String,
        /// Password
        password: String,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show the signed-in member
    Whoami,

    /// Change the display name
    Rename {
        /// New display name
        display_name: String,
    },

    /// List games waiting for an opponent
    Open,

    /// Create a new game
    Create,

    /// Take the open seat in a game
    Join {
        /// Game id
        game_id: u64,
    },

    /// Print a game's board and status
    Show {
        /// Game id
        game_id: u64,
    },

    /// Play a cell (0-8, row by row)
    Move {
        /// Game id
        game_id: u64,
        /// Cell index
        position: usize,
    },

    /// Close an open or finished game you created
    Close {
        /// Game id
        game_id: u64,
    },

    /// Start a rematch of a finished game
    Rematch {
        /// Game id
        game_id: u64,
    },

    /// Follow a game live until it closes or Ctrl-C
    Watch {
        /// Game id
        game_id: u64,
        /// Poll period in milliseconds (0 disables polling)
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// List your games
    History {
        /// Page size
        #[arg(long)]
        limit: Option<u32>,
        /// Items to skip
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Show the leaderboard
    Leaderboard,
}
