//! Client-side synchronization engine for strictly tic-tac-toe.
//!
//! Keeps a local view of a server-authoritative game consistent with the
//! backend through polling and guarded actions.
//!
//! # Architecture
//!
//! - **Session**: token lifecycle, persistence and forced sign-out on 401
//! - **Api**: REST client attaching the session token to every request
//! - **Poller**: single-flight periodic refresh
//! - **Gate**: one mutating action per game at a time
//! - **Sync**: per-game controller adopting authoritative snapshots
//! - **Lobby**: the same for the open-games listing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strictly_client::{ApiClient, GameSyncController, MemoryTokenStorage, ReqwestTransport, SessionStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let session = Arc::new(SessionStore::new(MemoryTokenStorage::default()));
//! let transport = ReqwestTransport::new("http://127.0.0.1:8000", Duration::from_secs(10))?;
//! let api = Arc::new(ApiClient::new(transport, session.clone()));
//!
//! session.authenticate(api.as_ref(), "alice", "hunter2").await?;
//! let game = GameSyncController::new(7, api, session, Some(Duration::from_millis(2000)));
//! game.mount().await?;
//! game.make_move(4).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod api;
mod config;
mod error;
mod gate;
mod lobby;
mod poller;
mod session;
mod sync;

// Crate-level exports - REST surface
pub use api::{
    Access, ApiClient, ApiRequest, ApiResponse, AuthBackend, AuthResponse, Credentials,
    GameBackend, Method, Page, ProfilePatch, Registration, ReqwestTransport, Transport,
};

// Crate-level exports - Configuration
pub use config::{ClientConfig, ConfigError, SERVER_URL_VAR, TOKEN_PATH_VAR, poll_interval};

// Crate-level exports - Errors
pub use error::{ClientError, ClientErrorKind, GENERIC_MESSAGE, extract_detail, status_message};

// Crate-level exports - Concurrency primitives
pub use gate::{ActionGate, GateOutcome};
pub use poller::SingleFlightPoller;

// Crate-level exports - Session
pub use session::{
    FileTokenStorage, MemoryTokenStorage, SessionEvent, SessionStore, StorageError, Surface,
    TokenStorage,
};

// Crate-level exports - Controllers
pub use lobby::LobbyController;
pub use sync::{ActionOutcome, GameSyncController};
