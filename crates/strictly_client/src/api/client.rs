//! Session-aware REST client.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use strictly_board::{GameId, GameRef, GameSnapshot, UserProfile};
use tracing::{debug, info, instrument, warn};

use super::transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport};
use super::{AuthBackend, AuthResponse, Credentials, GameBackend, Page, ProfilePatch, Registration};
use crate::error::{ClientError, ClientErrorKind};
use crate::session::SessionStore;

/// Credential policy of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Sent with the session token if one is held, anonymously otherwise.
    Optional,
    /// Refused locally, without a request, when no token is held.
    Required,
    /// Sent with this token regardless of the session.
    Token(String),
}

/// REST client for the game backend.
///
/// Attaches `Authorization: Token <token>` from the [`SessionStore`] and
/// routes every 401 to [`SessionStore::on_unauthorized`], so callers never
/// special-case authentication failures.
#[derive(Debug, Clone)]
pub struct ApiClient<T = ReqwestTransport> {
    transport: T,
    session: Arc<SessionStore>,
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client over `transport` sharing `session`.
    pub fn new(transport: T, session: Arc<SessionStore>) -> Self {
        Self { transport, session }
    }

    /// Shared session store.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Value of the `Authorization` header for `token`.
    pub fn authorization(token: &str) -> String {
        format!("Token {}", token)
    }

    /// Sends `request` under `access` and returns the successful response.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn dispatch(
        &self,
        mut request: ApiRequest,
        access: Access,
    ) -> Result<ApiResponse, ClientError> {
        let sent_token = match access {
            Access::Optional => self.session.token(),
            Access::Required => Some(self.session.token().ok_or_else(|| {
                debug!("No session token, refusing locally");
                ClientError::new(ClientErrorKind::NotAuthenticated)
            })?),
            Access::Token(token) => Some(token),
        };
        request.authorization = sent_token.as_deref().map(Self::authorization);

        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        let error = ClientError::from_status(response.status, &response.body);
        if error.is_unauthorized() {
            // A late 401 for a token that has since been replaced says
            // nothing about the live session.
            if sent_token == self.session.token() {
                self.session.on_unauthorized();
            } else {
                debug!("401 for a retired token, session left alone");
            }
        } else {
            warn!(status = response.status, error = %error, "Request rejected");
        }
        Err(error)
    }

    async fn call<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
        access: Access,
    ) -> Result<R, ClientError> {
        let response = self.dispatch(request, access).await?;
        decode(&response.body)
    }

    /// Games the signed-in member played or is playing.
    #[instrument(skip(self))]
    pub async fn my_games(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Page<GameSnapshot>, ClientError> {
        let mut params = Vec::new();
        if let Some(limit) = limit {
            params.push(format!("limit={}", limit));
        }
        if let Some(offset) = offset {
            params.push(format!("offset={}", offset));
        }
        let path = if params.is_empty() {
            "/api/my/games".to_string()
        } else {
            format!("/api/my/games?{}", params.join("&"))
        };
        self.call(ApiRequest::new(Method::Get, path), Access::Required)
            .await
    }

    /// Ranked member statistics.
    #[instrument(skip(self))]
    pub async fn leaderboard(&self) -> Result<Page<UserProfile>, ClientError> {
        self.call(ApiRequest::new(Method::Get, "/api/leaderboard"), Access::Optional)
            .await
    }
}

/// Decodes a JSON body; an empty body decodes as `null`.
fn decode<R: DeserializeOwned>(body: &str) -> Result<R, ClientError> {
    let text = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(text).map_err(|e| {
        warn!(error = %e, "Response body did not decode");
        ClientError::new(ClientErrorKind::Decode(e.to_string()))
    })
}

fn game_path(id: GameId, action: Option<&str>) -> String {
    match action {
        Some(action) => format!("/api/games/{}/{}", id, action),
        None => format!("/api/games/{}", id),
    }
}

#[async_trait::async_trait]
impl<T: Transport> AuthBackend for ApiClient<T> {
    #[instrument(skip(self, credentials), fields(username = credentials.username()))]
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClientError> {
        let body = serde_json::to_value(credentials)?;
        let response: AuthResponse = self
            .call(
                ApiRequest::new(Method::Post, "/api/auth/login").with_body(body),
                Access::Optional,
            )
            .await?;
        info!("Login accepted");
        Ok(response)
    }

    #[instrument(skip(self, registration), fields(username = registration.username()))]
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ClientError> {
        let body = serde_json::to_value(registration)?;
        self.call(
            ApiRequest::new(Method::Post, "/api/auth/register").with_body(body),
            Access::Optional,
        )
        .await
    }

    #[instrument(skip(self, token))]
    async fn logout(&self, token: &str) -> Result<(), ClientError> {
        self.dispatch(
            ApiRequest::new(Method::Post, "/api/auth/logout"),
            Access::Token(token.to_string()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_profile(&self) -> Result<UserProfile, ClientError> {
        self.call(ApiRequest::new(Method::Get, "/api/me"), Access::Required)
            .await
    }

    #[instrument(skip(self))]
    async fn update_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, ClientError> {
        let body = serde_json::to_value(patch)?;
        self.call(
            ApiRequest::new(Method::Patch, "/api/me").with_body(body),
            Access::Required,
        )
        .await
    }
}

#[async_trait::async_trait]
impl<T: Transport> GameBackend for ApiClient<T> {
    #[instrument(skip(self))]
    async fn fetch_game(&self, id: GameId) -> Result<GameSnapshot, ClientError> {
        self.call(ApiRequest::new(Method::Get, game_path(id, None)), Access::Optional)
            .await
    }

    #[instrument(skip(self))]
    async fn list_open_games(&self) -> Result<Vec<GameSnapshot>, ClientError> {
        let page: Page<GameSnapshot> = self
            .call(ApiRequest::new(Method::Get, "/api/games/open"), Access::Optional)
            .await?;
        Ok(page.items)
    }

    #[instrument(skip(self))]
    async fn create_game(&self) -> Result<GameRef, ClientError> {
        self.call(ApiRequest::new(Method::Post, "/api/games"), Access::Required)
            .await
    }

    #[instrument(skip(self))]
    async fn join_game(&self, id: GameId) -> Result<GameSnapshot, ClientError> {
        self.call(
            ApiRequest::new(Method::Post, game_path(id, Some("join"))),
            Access::Required,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn submit_move(&self, id: GameId, position: usize) -> Result<GameSnapshot, ClientError> {
        self.call(
            ApiRequest::new(Method::Post, game_path(id, Some("move")))
                .with_body(serde_json::json!({ "position": position })),
            Access::Required,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn close_game(&self, id: GameId) -> Result<GameSnapshot, ClientError> {
        self.call(
            ApiRequest::new(Method::Post, game_path(id, Some("close"))),
            Access::Required,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn request_rematch(&self, id: GameId) -> Result<GameRef, ClientError> {
        self.call(
            ApiRequest::new(Method::Post, game_path(id, Some("rematch"))),
            Access::Required,
        )
        .await
    }
}
