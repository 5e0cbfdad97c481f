//! Backend REST surface.
//!
//! The engine talks to the backend through two traits, [`AuthBackend`] and
//! [`GameBackend`]. [`ApiClient`] implements both over a [`Transport`]; the
//! session and sync layers only see the traits.

mod client;
mod transport;

pub use client::{Access, ApiClient};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport};

use derive_new::new;
use serde::{Deserialize, Deserializer, Serialize};
use strictly_board::{GameId, GameRef, GameSnapshot, UserProfile};

use crate::error::ClientError;

/// Login credentials.
#[derive(Clone, Serialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// New-account request.
#[derive(Clone, Serialize)]
pub struct Registration {
    username: String,
    password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

impl Registration {
    /// Creates a registration request.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            display_name,
        }
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Response to login and register.
#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    /// Opaque session token.
    pub token: String,
    /// Profile of the signed-in member, when the backend includes it.
    #[serde(default)]
    pub member: Option<UserProfile>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("token", &"<redacted>")
            .field("member", &self.member)
            .finish()
    }
}

/// Patchable profile fields.
#[derive(Debug, Clone, Serialize, new)]
pub struct ProfilePatch {
    /// New display name.
    pub display_name: String,
}

/// One page of a listing.
///
/// Accepts either a bare JSON list or a `{results, count}` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total across all pages, when reported.
    pub total: Option<u64>,
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Page<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<U> {
            List(Vec<U>),
            Envelope {
                results: Vec<U>,
                #[serde(default)]
                count: Option<u64>,
            },
        }

        Ok(match Raw::<T>::deserialize(deserializer)? {
            Raw::List(items) => Page { items, total: None },
            Raw::Envelope { results, count } => Page {
                items: results,
                total: count,
            },
        })
    }
}

/// Authentication and profile operations.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchanges credentials for a token.
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClientError>;

    /// Creates an account and signs it in.
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ClientError>;

    /// Invalidates `token` on the server.
    async fn logout(&self, token: &str) -> Result<(), ClientError>;

    /// Fetches the signed-in member's profile.
    async fn fetch_profile(&self) -> Result<UserProfile, ClientError>;

    /// Updates the signed-in member's profile.
    async fn update_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, ClientError>;
}

/// Game operations. Mutating calls return the authoritative result.
#[async_trait::async_trait]
pub trait GameBackend: Send + Sync {
    /// Fetches a game snapshot.
    async fn fetch_game(&self, id: GameId) -> Result<GameSnapshot, ClientError>;

    /// Lists games waiting for an opponent.
    async fn list_open_games(&self) -> Result<Vec<GameSnapshot>, ClientError>;

    /// Creates a new game owned by the signed-in member.
    async fn create_game(&self) -> Result<GameRef, ClientError>;

    /// Takes the open seat in a game.
    async fn join_game(&self, id: GameId) -> Result<GameSnapshot, ClientError>;

    /// Plays `position` (0-8).
    async fn submit_move(&self, id: GameId, position: usize) -> Result<GameSnapshot, ClientError>;

    /// Closes a game.
    async fn close_game(&self, id: GameId) -> Result<GameSnapshot, ClientError>;

    /// Starts a rematch; returns the new game.
    async fn request_rematch(&self, id: GameId) -> Result<GameRef, ClientError>;
}
