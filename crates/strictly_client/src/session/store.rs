//! Credential lifecycle: restore, sign in, sign out, forced teardown.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strictly_board::{UserId, UserProfile};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::storage::TokenStorage;
use crate::api::{AuthBackend, AuthResponse, Credentials, ProfilePatch, Registration};
use crate::error::{ClientError, ClientErrorKind};

/// Where the user currently is, as far as session handling cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Surface {
    /// The sign-in surface.
    Login,
    /// Anywhere else.
    #[default]
    Elsewhere,
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session became active for this member.
    SignedIn(UserId),
    /// The user signed out.
    SignedOut,
    /// The backend rejected the credential; show the sign-in surface.
    RedirectToLogin,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    token: Option<String>,
    profile: Option<UserProfile>,
    epoch: u64,
    persisted: bool,
}

/// Owns the one live session of this process.
///
/// Every outbound request reads the token through [`SessionStore::token`];
/// only the store's own methods change it. Each change bumps an epoch so
/// that work started under an older credential can tell it is stale.
#[derive(Debug)]
pub struct SessionStore {
    state: RwLock<SessionState>,
    surface: RwLock<Surface>,
    storage: Box<dyn TokenStorage>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Creates an empty store over `storage`. Call [`restore`](Self::restore)
    /// to pick up a persisted token.
    #[instrument(skip(storage))]
    pub fn new(storage: impl TokenStorage + 'static) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: RwLock::new(SessionState::default()),
            surface: RwLock::new(Surface::default()),
            storage: Box::new(storage),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Loads a persisted token, if any. Storage failures mean "no session".
    ///
    /// Returns true if a token was restored.
    #[instrument(skip(self))]
    pub fn restore(&self) -> bool {
        let token = match self.storage.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token storage unavailable, starting signed out");
                None
            }
        };
        let restored = token.is_some();
        let mut state = self.write();
        state.token = token;
        state.profile = None;
        state.persisted = restored;
        state.epoch += 1;
        info!(restored, "Session restored");
        restored
    }

    /// Current token, if signed in.
    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    /// True if a token is held.
    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    /// Profile of the signed-in member, once loaded.
    pub fn profile(&self) -> Option<UserProfile> {
        self.read().profile.clone()
    }

    /// Id of the signed-in member, once the profile is loaded.
    pub fn user_id(&self) -> Option<UserId> {
        self.read().profile.as_ref().map(|profile| *profile.id())
    }

    /// Counter bumped on every token change.
    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// False if the current token could not be written to storage.
    pub fn is_persisted(&self) -> bool {
        let state = self.read();
        state.token.is_none() || state.persisted
    }

    /// Surface the user is on.
    pub fn surface(&self) -> Surface {
        *self.surface.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the surface the user is on.
    pub fn set_surface(&self, surface: Surface) {
        *self.surface.write().unwrap_or_else(PoisonError::into_inner) = surface;
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Signs in with username and password.
    ///
    /// Succeeds only once a profile is known. On any failure the prior
    /// session, if there was one, is left in place.
    #[instrument(skip(self, backend, password))]
    pub async fn authenticate<B>(
        &self,
        backend: &B,
        username: &str,
        password: &str,
    ) -> Result<UserProfile, ClientError>
    where
        B: AuthBackend + ?Sized,
    {
        info!("Signing in");
        let response = backend
            .login(&Credentials::new(username, password))
            .await
            .inspect_err(|e| warn!(error = %e, "Sign-in rejected"))?;
        self.adopt(backend, response).await
    }

    /// Creates an account and signs it in, with the same commit rule as
    /// [`authenticate`](Self::authenticate).
    #[instrument(skip(self, backend, registration), fields(username = registration.username()))]
    pub async fn register<B>(
        &self,
        backend: &B,
        registration: Registration,
    ) -> Result<UserProfile, ClientError>
    where
        B: AuthBackend + ?Sized,
    {
        info!("Registering account");
        let response = backend
            .register(&registration)
            .await
            .inspect_err(|e| warn!(error = %e, "Registration rejected"))?;
        self.adopt(backend, response).await
    }

    async fn adopt<B>(&self, backend: &B, response: AuthResponse) -> Result<UserProfile, ClientError>
    where
        B: AuthBackend + ?Sized,
    {
        let AuthResponse { token, member } = response;

        if let Some(profile) = member {
            self.commit(token, Some(profile.clone()));
            self.announce(&profile);
            return Ok(profile);
        }

        // No profile in the response: the token has to be live before
        // /api/me will answer, so commit it and roll back on failure.
        let prior = self.read().clone();
        let epoch = self.commit(token, None);
        match backend.fetch_profile().await {
            Ok(profile) => {
                let adopted = {
                    let mut state = self.write();
                    let current = state.epoch == epoch;
                    if current {
                        state.profile = Some(profile.clone());
                    }
                    current
                };
                if !adopted {
                    warn!("Session changed during profile load, sign-in abandoned");
                    return Err(ClientError::new(ClientErrorKind::Superseded));
                }
                self.announce(&profile);
                Ok(profile)
            }
            Err(e) => {
                let untouched = self.epoch() == epoch;
                if e.is_unauthorized() {
                    // The new credential is dead; never fall back to the old one.
                    warn!(error = %e, "New credential rejected during profile load");
                    if untouched {
                        self.on_unauthorized();
                    }
                } else if untouched {
                    warn!(error = %e, "Profile load failed, restoring previous session");
                    self.reinstate(prior);
                } else {
                    debug!(error = %e, "Profile load failed after the session changed");
                }
                Err(e)
            }
        }
    }

    /// Marks the user as off the sign-in surface and broadcasts the sign-in.
    fn announce(&self, profile: &UserProfile) {
        self.set_surface(Surface::Elsewhere);
        info!(user_id = profile.id(), "Signed in");
        self.emit(SessionEvent::SignedIn(*profile.id()));
    }

    /// Installs `token` and `profile`, persisting the token. Returns the new
    /// epoch.
    fn commit(&self, token: String, profile: Option<UserProfile>) -> u64 {
        let persisted = match self.storage.save(&token) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Session not persisted");
                false
            }
        };
        let mut state = self.write();
        state.token = Some(token);
        state.profile = profile;
        state.persisted = persisted;
        state.epoch += 1;
        state.epoch
    }

    fn reinstate(&self, prior: SessionState) {
        let persisted = match &prior.token {
            Some(token) => self.storage.save(token),
            None => self.storage.clear(),
        }
        .inspect_err(|e| warn!(error = %e, "Could not restore persisted token"))
        .is_ok();
        let mut state = self.write();
        state.token = prior.token;
        state.profile = prior.profile;
        state.persisted = persisted && prior.persisted;
        state.epoch += 1;
    }

    /// Reloads the profile for the current token.
    ///
    /// The result is only stored if the token did not change meanwhile.
    #[instrument(skip(self, backend))]
    pub async fn reload_profile<B>(&self, backend: &B) -> Result<UserProfile, ClientError>
    where
        B: AuthBackend + ?Sized,
    {
        let epoch = {
            let state = self.read();
            if state.token.is_none() {
                return Err(ClientError::new(ClientErrorKind::NotAuthenticated));
            }
            state.epoch
        };
        let profile = backend.fetch_profile().await?;
        let mut state = self.write();
        if state.epoch == epoch {
            state.profile = Some(profile.clone());
            debug!(user_id = profile.id(), "Profile reloaded");
        } else {
            debug!("Session changed during profile load, discarding");
        }
        Ok(profile)
    }

    /// Changes the display name and adopts the returned profile.
    #[instrument(skip(self, backend))]
    pub async fn update_display_name<B>(
        &self,
        backend: &B,
        display_name: &str,
    ) -> Result<UserProfile, ClientError>
    where
        B: AuthBackend + ?Sized,
    {
        let epoch = self.epoch();
        let profile = backend
            .update_profile(&ProfilePatch::new(display_name.to_string()))
            .await?;
        let mut state = self.write();
        if state.epoch == epoch {
            state.profile = Some(profile.clone());
        }
        info!(user_id = profile.id(), "Display name updated");
        Ok(profile)
    }

    /// Signs out.
    ///
    /// The local session is cleared first and unconditionally; the backend
    /// is then told with the captured token, best effort.
    #[instrument(skip(self, backend))]
    pub async fn logout<B>(&self, backend: &B)
    where
        B: AuthBackend + ?Sized,
    {
        let token = self.clear_local();
        info!("Signed out");
        self.emit(SessionEvent::SignedOut);

        if let Some(token) = token
            && let Err(e) = backend.logout(&token).await
        {
            warn!(error = %e, "Backend logout failed; local session already cleared");
        }
    }

    /// Tears the session down after the backend rejected the credential.
    ///
    /// Emits [`SessionEvent::RedirectToLogin`] unless the user is already on
    /// the sign-in surface.
    #[instrument(skip(self))]
    pub fn on_unauthorized(&self) {
        let had_token = self.clear_local().is_some();
        warn!(had_token, "Credential rejected, session cleared");

        let mut surface = self.surface.write().unwrap_or_else(PoisonError::into_inner);
        if *surface != Surface::Login {
            *surface = Surface::Login;
            drop(surface);
            self.emit(SessionEvent::RedirectToLogin);
        }
    }

    /// Drops token and profile locally and in storage, returning the token.
    fn clear_local(&self) -> Option<String> {
        let token = {
            let mut state = self.write();
            let token = state.token.take();
            state.profile = None;
            state.persisted = false;
            state.epoch += 1;
            token
        };
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Could not remove persisted token");
        }
        token
    }
}
