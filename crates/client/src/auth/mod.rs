//! Authenticated session and token lifecycle.
//!
//! [`AuthSession`] owns the access/refresh token pair and the signed-in
//! user's profile. States move `Unauthenticated -> Authenticating ->
//! Authenticated`, and back to `Unauthenticated` on logout or a failed
//! refresh.
//!
//! # Refresh
//!
//! At most one refresh exchange runs at a time. Every token change bumps a
//! generation counter; a caller that saw a 401 passes the generation its
//! request used to [`AuthSession::refresh_after`]. The first caller to take
//! the refresh gate performs the exchange and records the outcome against
//! that generation, and later callers holding the same generation receive
//! the recorded outcome instead of issuing another exchange.

mod error;
mod types;

pub use error::{AuthError, RefreshError};
pub(crate) use types::{LoginResponse, RefreshRequest, RefreshResponse};
pub use types::{
    AuthSnapshot, AuthStatus, Credentials, ProfileUpdate, RegistrationRequest, UserProfile,
};

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::paths;
use crate::error::{ApiError, response_message};
use crate::http::{ApiRequest, Transport, send_with_refresh};
use crate::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, Storage};

/// Shared handle to the authenticated session.
///
/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<AuthSessionInner>,
}

struct AuthSessionInner {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    state: Mutex<SessionState>,
    events: watch::Sender<AuthSnapshot>,
    refresh_gate: tokio::sync::Mutex<RefreshLedger>,
}

#[derive(Default)]
struct SessionState {
    status: AuthStatus,
    access: Option<SecretString>,
    refresh: Option<SecretString>,
    user: Option<UserProfile>,
    /// Bumped whenever the token pair changes.
    generation: u64,
    /// Bumped when a session starts or ends.
    epoch: u64,
}

impl SessionState {
    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            status: self.status,
            user: self.user.clone(),
            has_refresh_token: self.refresh.is_some(),
        }
    }

    fn reset(&mut self) {
        self.status = AuthStatus::Unauthenticated;
        self.access = None;
        self.refresh = None;
        self.user = None;
        self.generation += 1;
        self.epoch += 1;
    }
}

/// Outcome of the last refresh exchange, keyed by the generation it replaced.
#[derive(Default)]
struct RefreshLedger {
    settled: Option<(u64, Result<(), RefreshError>)>,
}

impl AuthSession {
    /// Create an empty, unauthenticated session.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(AuthSessionInner {
                transport,
                storage,
                state: Mutex::new(SessionState::default()),
                events: watch::Sender::new(AuthSnapshot::default()),
                refresh_gate: tokio::sync::Mutex::new(RefreshLedger::default()),
            }),
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.read(SessionState::snapshot)
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.read(|s| s.status)
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.read(|s| s.user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::Authenticated
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.read(|s| s.refresh.is_some())
    }

    /// Watch session changes. Snapshots never contain tokens.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.events.subscribe()
    }

    /// Current access token and the generation it belongs to.
    pub(crate) fn bearer(&self) -> (Option<SecretString>, u64) {
        self.read(|s| (s.access.clone(), s.generation))
    }

    /// Sign in: exchange credentials for tokens, then load the profile.
    ///
    /// Both steps succeed or the session is left `Unauthenticated` with
    /// nothing persisted. Any previous session is replaced.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidCredentials` if the backend rejects the credentials
    /// - `ApiError::Validation` for a malformed request
    /// - any error from the profile fetch
    /// - `AuthError::SessionEnded` if `logout` ran while the login was in flight
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, ApiError> {
        let epoch = self.update(|s| {
            s.reset();
            s.status = AuthStatus::Authenticating;
            s.epoch
        });

        match self.complete_login(credentials, epoch).await {
            Ok(user) => {
                info!(user_id = %user.id, "Logged in");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                let owned = self.update(|s| {
                    let owned = s.epoch == epoch;
                    if owned {
                        s.reset();
                    }
                    owned
                });
                if owned {
                    self.forget_tokens();
                }
                Err(e)
            }
        }
    }

    async fn complete_login(
        &self,
        credentials: &Credentials,
        epoch: u64,
    ) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::post(paths::LOGIN).json(credentials)?;
        let response = self.transport().execute(&request, None).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            let message = response_message(response.status, &response.body);
            return Err(AuthError::InvalidCredentials(message).into());
        }
        let tokens: LoginResponse = response.error_for_status()?.json()?;

        let installed = self.update(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.access = Some(SecretString::from(tokens.access));
            s.refresh = Some(SecretString::from(tokens.refresh));
            s.generation += 1;
            true
        });
        if !installed {
            return Err(AuthError::SessionEnded.into());
        }

        let user = self.fetch_profile().await?;
        let authenticated = self.update(|s| {
            if s.epoch != epoch || s.access.is_none() {
                return false;
            }
            s.user = Some(user.clone());
            s.status = AuthStatus::Authenticated;
            true
        });
        if !authenticated {
            return Err(AuthError::SessionEnded.into());
        }

        self.persist_tokens();
        Ok(user)
    }

    /// Resume a persisted session at startup.
    ///
    /// Without a stored access token this returns `Unauthenticated` without
    /// touching the network. Otherwise the profile is fetched (refreshing
    /// the access token if needed); on any failure the stored tokens are
    /// discarded.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> AuthStatus {
        let Some(access) = self.read_token(ACCESS_TOKEN_KEY) else {
            debug!("No persisted session");
            return AuthStatus::Unauthenticated;
        };
        let refresh = self.read_token(REFRESH_TOKEN_KEY);

        let epoch = self.update(|s| {
            s.reset();
            s.status = AuthStatus::Authenticating;
            s.access = Some(SecretString::from(access));
            s.refresh = refresh.map(SecretString::from);
            s.epoch
        });

        match self.fetch_profile().await {
            Ok(user) => {
                let restored = self.update(|s| {
                    if s.epoch != epoch || s.access.is_none() {
                        return false;
                    }
                    info!(user_id = %user.id, "Session restored");
                    s.user = Some(user);
                    s.status = AuthStatus::Authenticated;
                    true
                });
                if restored {
                    AuthStatus::Authenticated
                } else {
                    self.status()
                }
            }
            Err(e) => {
                warn!(error = %e, "Discarding persisted session");
                let owned = self.update(|s| {
                    let owned = s.epoch == epoch;
                    if owned {
                        s.reset();
                    }
                    owned
                });
                if owned {
                    self.forget_tokens();
                }
                self.status()
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Joins an exchange already in flight instead of starting another.
    ///
    /// # Errors
    ///
    /// Returns the shared refresh outcome. On failure the session has been
    /// cleared.
    pub async fn refresh(&self) -> Result<(), RefreshError> {
        let (_, observed) = self.bearer();
        self.refresh_after(observed).await
    }

    /// Refresh tokens that were current at generation `observed`.
    ///
    /// If the tokens have moved on since then, no exchange is made: the
    /// recorded outcome for `observed` is returned, or `Ok` if another
    /// access token is already in place.
    pub(crate) async fn refresh_after(&self, observed: u64) -> Result<(), RefreshError> {
        let mut ledger = self.inner.refresh_gate.lock().await;

        let (generation, refresh_token, has_access) =
            self.read(|s| (s.generation, s.refresh.clone(), s.access.is_some()));
        if generation != observed {
            if let Some((settled_for, outcome)) = &ledger.settled
                && *settled_for == observed
            {
                return outcome.clone();
            }
            return if has_access {
                Ok(())
            } else {
                Err(RefreshError::SessionEnded)
            };
        }
        let Some(refresh_token) = refresh_token else {
            return Err(RefreshError::MissingRefreshToken);
        };

        let outcome = match self.exchange_refresh_token(&refresh_token).await {
            Ok(tokens) => {
                let applied = self.update(|s| {
                    if s.generation != observed {
                        return false;
                    }
                    s.access = Some(SecretString::from(tokens.access));
                    if let Some(rotated) = tokens.refresh {
                        s.refresh = Some(SecretString::from(rotated));
                    }
                    s.generation += 1;
                    true
                });
                if applied {
                    self.persist_tokens();
                    info!("Access token refreshed");
                    Ok(())
                } else {
                    Err(RefreshError::SessionEnded)
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                let cleared = self.update(|s| {
                    let current = s.generation == observed;
                    if current {
                        s.reset();
                    }
                    current
                });
                if cleared {
                    self.forget_tokens();
                }
                Err(e)
            }
        };

        ledger.settled = Some((observed, outcome.clone()));
        outcome
    }

    #[instrument(skip_all)]
    async fn exchange_refresh_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<RefreshResponse, RefreshError> {
        let body = RefreshRequest {
            refresh: refresh_token.expose_secret(),
        };
        let request = ApiRequest::post(paths::TOKEN_REFRESH)
            .json(&body)
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        let response = self
            .transport()
            .execute(&request, None)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.status.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status.as_u16(),
                message: response_message(response.status, &response.body),
            });
        }
        serde_json::from_str(&response.body).map_err(|e| RefreshError::Malformed(e.to_string()))
    }

    /// End the session locally. Never touches the network.
    pub fn logout(&self) {
        self.update(SessionState::reset);
        self.forget_tokens();
        info!("Logged out");
    }

    /// Replace the cached profile of the signed-in user.
    pub(crate) fn set_user(&self, user: UserProfile) {
        self.update(|s| {
            if s.status == AuthStatus::Authenticated {
                s.user = Some(user);
            }
        });
    }

    async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::get(paths::PROFILE);
        send_with_refresh(self, &request)
            .await?
            .error_for_status()?
            .json()
    }

    fn read_token(&self, key: &str) -> Option<String> {
        match self.inner.storage.get(key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted token");
                None
            }
        }
    }

    fn persist_tokens(&self) {
        let (access, refresh) = self.read(|s| (s.access.clone(), s.refresh.clone()));
        let writes = [(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)];
        for (key, token) in writes {
            let result = match token {
                Some(token) => self.inner.storage.set(key, token.expose_secret()),
                None => self.inner.storage.remove(key),
            };
            if let Err(e) = result {
                warn!(key, error = %e, "Failed to persist token");
            }
        }
    }

    fn forget_tokens(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.inner.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove persisted token");
            }
        }
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Mutate the state and notify subscribers if the public view changed.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        let snapshot = state.snapshot();
        self.inner.events.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        result
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use reqwest::Method;
    use serde_json::json;
    use shopsession_core::Email;

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_support::{FakeTransport, json, profile_body};

    fn credentials() -> Credentials {
        Credentials::new(Email::parse("ada@example.com").unwrap(), "correct horse")
    }

    /// Backend where `access-1` is expired and `access-2` is valid.
    fn backend(refresh_status: u16) -> Arc<FakeTransport> {
        FakeTransport::with_latency(Duration::from_millis(20), move |request, bearer| {
            match request.path.as_str() {
                paths::LOGIN => json(200, json!({"access": "access-1", "refresh": "refresh-1"})),
                paths::TOKEN_REFRESH if refresh_status == 200 => {
                    json(200, json!({"access": "access-2", "refresh": "refresh-2"}))
                }
                paths::TOKEN_REFRESH => json(refresh_status, json!({"detail": "Token is invalid"})),
                paths::PROFILE if bearer == Some("access-2") => json(200, profile_body()),
                _ => json(401, json!({"detail": "Token expired"})),
            }
        })
    }

    fn session_with(transport: Arc<FakeTransport>) -> (AuthSession, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let session = AuthSession::new(transport, storage.clone());
        (session, storage)
    }

    fn seed_tokens(storage: &MemoryStorage, access: &str, refresh: &str) {
        storage.set(ACCESS_TOKEN_KEY, access).unwrap();
        storage.set(REFRESH_TOKEN_KEY, refresh).unwrap();
    }

    #[tokio::test]
    async fn test_login_success() {
        let transport = FakeTransport::new(|request, _| match request.path.as_str() {
            paths::LOGIN => json(200, json!({"access": "a", "refresh": "r"})),
            _ => json(200, profile_body()),
        });
        let (session, storage) = session_with(transport.clone());

        let user = session.login(&credentials()).await.unwrap();

        assert_eq!(user.username, "ada");
        assert!(session.is_authenticated());
        assert_eq!(session.user(), Some(user));
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r"));

        let calls = transport.calls();
        assert_eq!(calls[0].bearer, None);
        assert_eq!(calls[0].body.as_ref().unwrap()["email"], "ada@example.com");
        assert_eq!(calls[1].bearer.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_login_invalid_credentials() {
        let transport = FakeTransport::new(|_, _| {
            json(401, json!({"detail": "No active account found with the given credentials"}))
        });
        let (session, storage) = session_with(transport);

        let err = session.login(&credentials()).await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Auth(AuthError::InvalidCredentials(ref m)) if m.starts_with("No active account")
        ));
        assert_eq!(session.status(), AuthStatus::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_login_rolls_back_when_profile_fails() {
        let transport = FakeTransport::new(|request, _| match request.path.as_str() {
            paths::LOGIN => json(200, json!({"access": "a", "refresh": "r"})),
            _ => json(500, json!({"detail": "boom"})),
        });
        let (session, storage) = session_with(transport);

        let err = session.login(&credentials()).await.unwrap_err();

        assert!(matches!(err, ApiError::Server { status: 500, .. }));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, AuthStatus::Unauthenticated);
        assert!(snapshot.user.is_none());
        assert!(!snapshot.has_refresh_token);
        assert!(session.bearer().0.is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_restore_without_token_makes_no_call() {
        let transport = FakeTransport::new(|_, _| json(500, json!({})));
        let (session, _) = session_with(transport.clone());

        assert_eq!(session.restore().await, AuthStatus::Unauthenticated);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_with_valid_token() {
        let transport = FakeTransport::new(|_, bearer| match bearer {
            Some("stored") => json(200, profile_body()),
            _ => json(401, json!({})),
        });
        let (session, storage) = session_with(transport);
        seed_tokens(&storage, "stored", "refresh");

        assert_eq!(session.restore().await, AuthStatus::Authenticated);
        assert_eq!(session.user().unwrap().email, "ada@example.com");
        assert!(session.has_refresh_token());
    }

    #[tokio::test]
    async fn test_restore_refreshes_expired_token() {
        let transport = backend(200);
        let (session, storage) = session_with(transport.clone());
        seed_tokens(&storage, "access-1", "refresh-1");

        assert_eq!(session.restore().await, AuthStatus::Authenticated);
        assert_eq!(transport.count(&Method::POST, paths::TOKEN_REFRESH), 1);
        assert_eq!(
            storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
            Some("access-2")
        );
        assert_eq!(
            storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("refresh-2")
        );
    }

    #[tokio::test]
    async fn test_restore_discards_unusable_tokens() {
        let transport = backend(401);
        let (session, storage) = session_with(transport);
        seed_tokens(&storage, "access-1", "refresh-1");

        assert_eq!(session.restore().await, AuthStatus::Unauthenticated);
        assert!(session.user().is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let transport = backend(200);
        let (session, storage) = session_with(transport.clone());
        seed_tokens(&storage, "access-1", "refresh-1");
        session.restore().await;
        let before = transport.count(&Method::POST, paths::TOKEN_REFRESH);

        let (first, second) = tokio::join!(session.refresh(), session.refresh());

        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert_eq!(transport.count(&Method::POST, paths::TOKEN_REFRESH), before + 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_failure_is_shared() {
        let transport = FakeTransport::with_latency(Duration::from_millis(20), |request, _| {
            match request.path.as_str() {
                paths::TOKEN_REFRESH => json(401, json!({"detail": "Token is blacklisted"})),
                _ => json(200, profile_body()),
            }
        });
        let (session, storage) = session_with(transport.clone());
        seed_tokens(&storage, "access", "refresh");
        assert_eq!(session.restore().await, AuthStatus::Authenticated);

        let (first, second) = tokio::join!(session.refresh(), session.refresh());

        let expected = Err(RefreshError::Rejected {
            status: 401,
            message: "Token is blacklisted".to_string(),
        });
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(transport.count(&Method::POST, paths::TOKEN_REFRESH), 1);
        assert_eq!(session.status(), AuthStatus::Unauthenticated);
        assert!(session.user().is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let transport = FakeTransport::new(move |request, _| match request.path.as_str() {
            paths::TOKEN_REFRESH => {
                counter.fetch_add(1, Ordering::SeqCst);
                json(200, json!({"access": "fresh"}))
            }
            _ => json(200, profile_body()),
        });
        let (session, storage) = session_with(transport);
        seed_tokens(&storage, "stale", "keep-me");
        session.restore().await;

        session.refresh().await.unwrap();

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("fresh"));
        assert_eq!(
            storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("keep-me")
        );
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let transport = FakeTransport::new(|_, _| json(200, json!({})));
        let (session, _) = session_with(transport.clone());

        assert_eq!(
            session.refresh().await,
            Err(RefreshError::MissingRefreshToken)
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logout_during_refresh_wins() {
        let transport = FakeTransport::with_latency(Duration::from_millis(20), |request, _| {
            match request.path.as_str() {
                paths::TOKEN_REFRESH => json(200, json!({"access": "late"})),
                _ => json(200, profile_body()),
            }
        });
        let (session, storage) = session_with(transport);
        seed_tokens(&storage, "access", "refresh");
        session.restore().await;

        let (outcome, ()) = tokio::join!(session.refresh(), async {
            tokio::task::yield_now().await;
            session.logout();
        });

        assert_eq!(outcome, Err(RefreshError::SessionEnded));
        assert_eq!(session.status(), AuthStatus::Unauthenticated);
        assert!(session.bearer().0.is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let transport = FakeTransport::new(|request, _| match request.path.as_str() {
            paths::LOGIN => json(200, json!({"access": "a", "refresh": "r"})),
            _ => json(200, profile_body()),
        });
        let (session, storage) = session_with(transport);
        let mut events = session.subscribe();
        session.login(&credentials()).await.unwrap();
        assert!(events.borrow_and_update().is_authenticated());

        session.logout();

        assert!(events.has_changed().unwrap());
        let snapshot = events.borrow_and_update().clone();
        assert_eq!(snapshot, AuthSnapshot::default());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_set_user_ignored_when_signed_out() {
        let transport = FakeTransport::new(|_, _| json(200, json!({})));
        let (session, _) = session_with(transport);
        let user: UserProfile = serde_json::from_value(profile_body()).unwrap();

        session.set_user(user);

        assert!(session.user().is_none());
    }

    #[test]
    fn test_debug_hides_tokens() {
        let transport = FakeTransport::new(|_, _| json(200, json!({})));
        let (session, _) = session_with(transport);
        session.update(|s| s.access = Some(SecretString::from("very-secret")));
        assert!(!format!("{session:?}").contains("very-secret"));
    }
}
