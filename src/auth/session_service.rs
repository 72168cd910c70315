//! Session manager: login, register, logout, and token refresh.
//!
//! Owns the token lifecycle. Concurrent refresh attempts coalesce onto
//! a single shared future so the refresh endpoint is called at most
//! once at any time; a request that comes back 401 gets exactly one
//! transparent refresh-and-retry before the session is dropped.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::constants::{
    MIN_PASSWORD_LEN, REFRESH_LEEWAY_SECS, USER_DATA_KEY, USER_EMAIL_KEY, USER_ID_KEY,
};
use crate::errors::{ApiError, AuthError, Error, Result};
use crate::events::{DomainEvent, DomainEventSink};
use crate::secrets::SecretStore;
use crate::tokens::TokenStore;
use crate::transport::{ApiClient, ApiConfig, HttpBackend, Method};

use super::auth_model::{
    AuthResponse, AuthState, ForgotPasswordRequest, LoginRequest, RefreshTokenRequest,
    RegisterRequest, TokenResponse, UpdateProfileRequest, User,
};

type RefreshOutcome = std::result::Result<(), AuthError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Local-only account that bypasses the network on login.
///
/// A development/demo affordance: production configurations leave
/// `SessionConfig::demo_account` unset and there is no hardcoded pair.
#[derive(Debug, Clone)]
pub struct DemoAccount {
    pub email: String,
    pub password: String,
}

impl DemoAccount {
    fn matches(&self, email: &str, password: &str) -> bool {
        self.email == email && self.password == password
    }

    fn user(&self) -> User {
        User {
            id: "demo-user-001".to_string(),
            email: self.email.clone(),
            name: "Demo User".to_string(),
            avatar: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }
}

/// Session manager configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub api: ApiConfig,
    pub demo_account: Option<DemoAccount>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session manager
// ─────────────────────────────────────────────────────────────────────────────

struct SessionInner {
    api: ApiClient,
    tokens: TokenStore,
    store: Arc<dyn SecretStore>,
    sink: Arc<dyn DomainEventSink>,
    config: SessionConfig,
    state: StdMutex<AuthState>,
    token_expiry: StdMutex<Option<DateTime<Utc>>>,
    refresh_in_flight: AsyncMutex<Option<SharedRefresh>>,
    refresh_timer: StdMutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_timer.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Owns login/register/logout/refresh flows and the auth state machine.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SecretStore>,
        sink: Arc<dyn DomainEventSink>,
    ) -> Result<Self> {
        let tokens = TokenStore::new(store.clone());
        let api = ApiClient::new(&config.api, tokens.clone())?;
        Ok(Self::from_parts(api, tokens, store, sink, config))
    }

    /// Build a session manager over an explicit HTTP backend.
    pub fn with_backend(
        config: SessionConfig,
        backend: Arc<dyn HttpBackend>,
        store: Arc<dyn SecretStore>,
        sink: Arc<dyn DomainEventSink>,
    ) -> Self {
        let tokens = TokenStore::new(store.clone());
        let api = ApiClient::with_backend(backend, &config.api, tokens.clone());
        Self::from_parts(api, tokens, store, sink, config)
    }

    fn from_parts(
        api: ApiClient,
        tokens: TokenStore,
        store: Arc<dyn SecretStore>,
        sink: Arc<dyn DomainEventSink>,
        config: SessionConfig,
    ) -> Self {
        let state = if tokens.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        Self {
            inner: Arc::new(SessionInner {
                api,
                tokens,
                store,
                sink,
                config,
                state: StdMutex::new(state),
                token_expiry: StdMutex::new(None),
                refresh_in_flight: AsyncMutex::new(None),
                refresh_timer: StdMutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_authenticated()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login / register / logout
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        self.set_state(AuthState::Authenticating);

        if let Some(demo) = &self.inner.config.demo_account {
            if demo.matches(email, password) {
                info!("[Session] demo account login, skipping network");
                let user = demo.user();
                self.persist_login(&user, "demo-access-token", "demo-refresh-token", None)?;
                self.set_state(AuthState::Authenticated);
                return Ok(user);
            }
        }

        let body = serde_json::to_value(LoginRequest { email, password })?;
        match self
            .inner
            .api
            .request::<AuthResponse>(Method::POST, "/auth/login", Some(body), false)
            .await
        {
            Ok(response) => {
                self.persist_login(
                    &response.user,
                    &response.access_token,
                    &response.refresh_token,
                    response.expires_at,
                )?;
                self.set_state(AuthState::Authenticated);
                info!("[Session] logged in as {}", response.user.email);
                Ok(response.user)
            }
            Err(err) => {
                self.set_state(AuthState::Unauthenticated);
                Err(map_login_error(err).into())
            }
        }
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User> {
        // Client-side validation fails fast, before any network call.
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch.into());
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN).into());
        }

        self.set_state(AuthState::Authenticating);
        let body = serde_json::to_value(RegisterRequest {
            name,
            email,
            password,
        })?;
        match self
            .inner
            .api
            .request::<AuthResponse>(Method::POST, "/auth/register", Some(body), false)
            .await
        {
            Ok(response) => {
                self.persist_login(
                    &response.user,
                    &response.access_token,
                    &response.refresh_token,
                    response.expires_at,
                )?;
                self.set_state(AuthState::Authenticated);
                info!("[Session] registered {}", response.user.email);
                Ok(response.user)
            }
            Err(err) => {
                self.set_state(AuthState::Unauthenticated);
                Err(map_login_error(err).into())
            }
        }
    }

    /// Notify the server best-effort, then clear all local state.
    /// Logout always succeeds locally regardless of server reachability.
    pub async fn logout(&self) -> Result<()> {
        if let Err(err) = self
            .inner
            .api
            .request_no_content(Method::POST, "/auth/logout", None, true)
            .await
        {
            debug!("[Session] logout notification failed: {}", err);
        }

        self.cancel_refresh_timer();
        *self.inner.token_expiry.lock().unwrap() = None;
        let result = self.inner.tokens.delete_all();
        self.set_state(AuthState::Unauthenticated);
        info!("[Session] logged out");
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Token refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange the refresh token for a new access token.
    ///
    /// At most one refresh is in flight at any time: the first caller
    /// creates a shared future, concurrent callers await the same one,
    /// and all observe the same outcome. The registry entry is cleared
    /// when the refresh completes.
    pub async fn refresh_session(&self) -> Result<()> {
        let fut = {
            let mut in_flight = self.inner.refresh_in_flight.lock().await;
            if let Some(fut) = in_flight.as_ref() {
                debug!("[Session] refresh already in flight, awaiting shared outcome");
                fut.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let fut: SharedRefresh = async move {
                    let session = SessionManager {
                        inner: Arc::clone(&inner),
                    };
                    let outcome = session.perform_refresh().await;
                    // Clear the registry before re-arming the timer:
                    // arming aborts the previous timer task, which may
                    // be the very task driving this future.
                    *inner.refresh_in_flight.lock().await = None;
                    match outcome {
                        Ok(Some(expires_at)) => {
                            session.schedule_refresh(expires_at);
                            Ok(())
                        }
                        Ok(None) => Ok(()),
                        Err(err) => Err(err),
                    }
                }
                .boxed()
                .shared();
                *in_flight = Some(fut.clone());
                fut
            }
        };

        fut.await.map_err(Error::Auth)
    }

    /// Refresh only when the known expiry is inside the leeway window
    /// (or unknown).
    pub async fn refresh_session_if_needed(&self) -> Result<()> {
        let expiry = *self.inner.token_expiry.lock().unwrap();
        match expiry {
            None => self.refresh_session().await,
            Some(expires_at) => {
                let threshold = Utc::now() + ChronoDuration::seconds(REFRESH_LEEWAY_SECS);
                if threshold >= expires_at {
                    self.refresh_session().await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Runs the refresh exchange itself. Returns the new expiry so the
    /// caller can re-arm the timer after clearing the registry.
    async fn perform_refresh(
        &self,
    ) -> std::result::Result<Option<DateTime<Utc>>, AuthError> {
        self.set_state(AuthState::Refreshing);

        let refresh_token = match self.inner.tokens.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.drop_session();
                return Err(AuthError::TokenExpired);
            }
            Err(err) => {
                warn!("[Session] refresh token read failed: {}", err);
                self.drop_session();
                return Err(AuthError::TokenExpired);
            }
        };

        debug!("[Session] refreshing access token");
        let body = serde_json::to_value(RefreshTokenRequest {
            refresh_token: &refresh_token,
        })
        .map_err(|err| AuthError::Unknown(err.to_string()))?;

        match self
            .inner
            .api
            .request::<TokenResponse>(Method::POST, "/auth/refresh", Some(body), false)
            .await
        {
            Ok(response) => {
                // The refresh token only rotates when the server says so.
                let next_refresh = response.refresh_token.unwrap_or(refresh_token);
                if let Err(err) = self
                    .inner
                    .tokens
                    .save_tokens(&response.access_token, &next_refresh)
                {
                    warn!("[Session] failed to persist refreshed tokens: {}", err);
                    self.drop_session();
                    return Err(AuthError::Unknown(err.to_string()));
                }
                self.set_state(AuthState::Authenticated);
                *self.inner.token_expiry.lock().unwrap() = response.expires_at;
                debug!("[Session] access token refreshed");
                Ok(response.expires_at)
            }
            Err(err) => {
                warn!("[Session] token refresh failed: {}", err);
                self.drop_session();
                Err(map_refresh_error(err))
            }
        }
    }

    /// Arm the proactive refresh timer for `REFRESH_LEEWAY_SECS` before
    /// expiry. When less than the leeway remains, refresh immediately
    /// instead of arming a negative delay.
    fn schedule_refresh(&self, expires_at: DateTime<Utc>) {
        self.cancel_refresh_timer();
        *self.inner.token_expiry.lock().unwrap() = Some(expires_at);

        let delay = expires_at - Utc::now() - ChronoDuration::seconds(REFRESH_LEEWAY_SECS);
        let session = self.clone();
        let handle = tokio::spawn(async move {
            if let Ok(delay) = delay.to_std() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = session.refresh_session().await {
                warn!("[Session] scheduled refresh failed: {}", err);
            }
        });
        *self.inner.refresh_timer.lock().unwrap() = Some(handle);
    }

    fn cancel_refresh_timer(&self) {
        if let Some(handle) = self.inner.refresh_timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Purge tokens and drop to `Unauthenticated`. No silent retry.
    fn drop_session(&self) {
        if let Err(err) = self.inner.tokens.clear_tokens() {
            warn!("[Session] failed to clear tokens: {}", err);
        }
        self.cancel_refresh_timer();
        *self.inner.token_expiry.lock().unwrap() = None;
        self.set_state(AuthState::Unauthenticated);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorized requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue an authenticated request with exactly one transparent
    /// refresh-and-retry on 401. A second 401 propagates and the
    /// session is dropped.
    pub async fn authorized_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        match self
            .inner
            .api
            .request::<T>(method.clone(), path, body.clone(), true)
            .await
        {
            Err(Error::Api(ApiError::Unauthorized)) => {
                debug!("[Session] 401 on {} {}, refreshing once", method, path);
                self.refresh_session().await?;
                match self.inner.api.request::<T>(method, path, body, true).await {
                    Err(Error::Api(ApiError::Unauthorized)) => {
                        self.drop_session();
                        Err(ApiError::Unauthorized.into())
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Like [`authorized_request`](Self::authorized_request), for
    /// endpoints without a response body.
    pub async fn authorized_request_no_content(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        match self
            .inner
            .api
            .request_no_content(method.clone(), path, body.clone(), true)
            .await
        {
            Err(Error::Api(ApiError::Unauthorized)) => {
                debug!("[Session] 401 on {} {}, refreshing once", method, path);
                self.refresh_session().await?;
                match self
                    .inner
                    .api
                    .request_no_content(method, path, body, true)
                    .await
                {
                    Err(Error::Api(ApiError::Unauthorized)) => {
                        self.drop_session();
                        Err(ApiError::Unauthorized.into())
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profile
    // ─────────────────────────────────────────────────────────────────────────

    /// The locally cached user profile, if any.
    pub fn current_user(&self) -> Result<Option<User>> {
        match self.inner.store.get(USER_DATA_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Fetch the profile from the server and refresh the local cache.
    pub async fn load_current_user(&self) -> Result<User> {
        let user: User = self
            .authorized_request(Method::GET, "/auth/me", None)
            .await?;
        self.cache_user(&user)?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<User> {
        let body = serde_json::to_value(UpdateProfileRequest { name, avatar })?;
        let user: User = self
            .authorized_request(Method::PATCH, "/auth/profile", Some(body))
            .await?;
        self.cache_user(&user)?;
        Ok(user)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let body = serde_json::to_value(ForgotPasswordRequest { email })?;
        self.inner
            .api
            .request_no_content(Method::POST, "/auth/forgot-password", Some(body), false)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn persist_login(
        &self,
        user: &User,
        access: &str,
        refresh: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.inner.tokens.save_tokens(access, refresh)?;
        self.inner.store.set(USER_ID_KEY, &user.id)?;
        self.inner.store.set(USER_EMAIL_KEY, &user.email)?;
        self.cache_user(user)?;
        match expires_at {
            Some(at) => self.schedule_refresh(at),
            None => *self.inner.token_expiry.lock().unwrap() = None,
        }
        Ok(())
    }

    fn cache_user(&self, user: &User) -> Result<()> {
        let raw = serde_json::to_string(user)?;
        self.inner.store.set(USER_DATA_KEY, &raw)
    }

    fn set_state(&self, next: AuthState) {
        let changed = {
            let mut state = self.inner.state.lock().unwrap();
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        };
        if changed {
            self.inner
                .sink
                .emit(DomainEvent::SessionChanged { state: next });
        }
    }
}

fn map_login_error(err: Error) -> AuthError {
    match err {
        Error::Api(ApiError::Unauthorized) => AuthError::InvalidCredentials,
        Error::Api(ApiError::Client {
            status: 403,
            message,
        }) => {
            if message.to_lowercase().contains("verify") {
                AuthError::EmailNotVerified
            } else {
                AuthError::AccountLocked
            }
        }
        Error::Api(ApiError::Timeout) => AuthError::Network("request timed out".to_string()),
        Error::Api(ApiError::Network(message)) => AuthError::Network(message),
        Error::Api(ApiError::Server { status }) => {
            AuthError::Network(format!("server error {}", status))
        }
        Error::Auth(err) => err,
        other => AuthError::Unknown(other.to_string()),
    }
}

fn map_refresh_error(err: Error) -> AuthError {
    match err {
        Error::Api(ApiError::Unauthorized) | Error::Api(ApiError::Client { .. }) => {
            AuthError::TokenExpired
        }
        Error::Api(ApiError::Timeout) => AuthError::Network("request timed out".to_string()),
        Error::Api(ApiError::Network(message)) => AuthError::Network(message),
        Error::Api(ApiError::Server { status }) => {
            AuthError::Network(format!("server error {}", status))
        }
        other => AuthError::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::events::MockDomainEventSink;
    use crate::secrets::MemorySecretStore;
    use crate::transport::testing::{json_response, MockBackend};

    fn auth_body(access: &str, expires_at: Option<&str>) -> serde_json::Value {
        let mut body = json!({
            "accessToken": access,
            "refreshToken": "refresh-1",
            "user": {"id": "u1", "email": "ada@example.com", "name": "Ada"}
        });
        if let Some(at) = expires_at {
            body["expiresAt"] = json!(at);
        }
        body
    }

    fn session_with(
        backend: Arc<MockBackend>,
    ) -> (SessionManager, Arc<MemorySecretStore>, MockDomainEventSink) {
        let store = Arc::new(MemorySecretStore::new());
        let sink = MockDomainEventSink::new();
        let session = SessionManager::with_backend(
            SessionConfig::default(),
            backend,
            store.clone(),
            Arc::new(sink.clone()),
        );
        (session, store, sink)
    }

    #[tokio::test]
    async fn test_login_persists_tokens_and_user() {
        let backend = Arc::new(MockBackend::new(|call| {
            assert!(call.url.ends_with("/auth/login"));
            Ok(json_response(200, auth_body("access-1", None)))
        }));
        let (session, _, sink) = session_with(backend);

        let user = session.login("ada@example.com", "hunter2-long").await.unwrap();

        assert_eq!(user.id, "u1");
        assert!(session.is_authenticated());
        assert_eq!(session.state(), AuthState::Authenticated);
        assert_eq!(
            session.current_user().unwrap().map(|u| u.email),
            Some("ada@example.com".to_string())
        );
        let events = sink.events();
        assert!(events.contains(&DomainEvent::SessionChanged {
            state: AuthState::Authenticated
        }));
    }

    #[tokio::test]
    async fn test_login_error_classification() {
        let backend = Arc::new(MockBackend::new(|call| {
            let body = call.body.as_ref().unwrap();
            match body["email"].as_str().unwrap() {
                "bad@example.com" => Ok(json_response(401, json!({"message": "nope"}))),
                "unverified@example.com" => Ok(json_response(
                    403,
                    json!({"message": "Please verify your email"}),
                )),
                _ => Ok(json_response(403, json!({"message": "locked out"}))),
            }
        }));
        let (session, _, _) = session_with(backend);

        let invalid = session.login("bad@example.com", "password-1").await;
        assert!(matches!(
            invalid,
            Err(Error::Auth(AuthError::InvalidCredentials))
        ));
        assert_eq!(session.state(), AuthState::Unauthenticated);

        let unverified = session.login("unverified@example.com", "password-1").await;
        assert!(matches!(
            unverified,
            Err(Error::Auth(AuthError::EmailNotVerified))
        ));

        let locked = session.login("locked@example.com", "password-1").await;
        assert!(matches!(locked, Err(Error::Auth(AuthError::AccountLocked))));
    }

    #[tokio::test]
    async fn test_register_validates_before_network() {
        let backend = Arc::new(MockBackend::new(|_| {
            Ok(json_response(200, auth_body("access-1", None)))
        }));
        let (session, _, _) = session_with(backend.clone());

        let mismatch = session
            .register("Ada", "ada@example.com", "password-1", "password-2")
            .await;
        assert!(matches!(
            mismatch,
            Err(Error::Auth(AuthError::PasswordMismatch))
        ));

        let weak = session
            .register("Ada", "ada@example.com", "short", "short")
            .await;
        assert!(matches!(
            weak,
            Err(Error::Auth(AuthError::WeakPassword(_)))
        ));

        assert_eq!(backend.calls().len(), 0);

        let user = session
            .register("Ada", "ada@example.com", "password-1", "password-1")
            .await
            .unwrap();
        assert_eq!(user.name, "Ada");
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_state_even_when_server_fails() {
        let backend = Arc::new(MockBackend::new(|call| {
            if call.url.ends_with("/auth/login") {
                Ok(json_response(200, auth_body("access-1", None)))
            } else {
                Ok(json_response(500, json!({})))
            }
        }));
        let (session, store, _) = session_with(backend);

        session.login("ada@example.com", "password-1").await.unwrap();
        assert!(session.is_authenticated());

        session.logout().await.unwrap();

        assert!(!session.is_authenticated());
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert_eq!(store.get(USER_DATA_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_demo_account_skips_network() {
        let backend = Arc::new(MockBackend::new(|_| {
            Ok(json_response(500, json!({})))
        }));
        let store = Arc::new(MemorySecretStore::new());
        let config = SessionConfig {
            demo_account: Some(DemoAccount {
                email: "demo@example.com".to_string(),
                password: "demo-pass-1".to_string(),
            }),
            ..SessionConfig::default()
        };
        let session = SessionManager::with_backend(
            config,
            backend.clone(),
            store,
            Arc::new(MockDomainEventSink::new()),
        );

        let user = session.login("demo@example.com", "demo-pass-1").await.unwrap();

        assert_eq!(user.id, "demo-user-001");
        assert!(session.is_authenticated());
        assert_eq!(backend.calls().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_refreshes_coalesce() {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let counter = refresh_calls.clone();
        let backend = Arc::new(
            MockBackend::new(move |call| {
                assert!(call.url.ends_with("/auth/refresh"));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json_response(200, json!({"accessToken": "fresh-token"})))
            })
            .with_latency(Duration::from_millis(100)),
        );
        let (session, _, _) = session_with(backend);
        session.tokens().save_tokens("stale-token", "refresh-1").unwrap();

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.refresh_session().await })
            })
            .collect();
        for attempt in attempts {
            attempt.await.unwrap().unwrap();
        }

        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            session.tokens().access_token().unwrap(),
            Some("fresh-token".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_401s_trigger_single_refresh() {
        let backend = Arc::new(
            MockBackend::new(|call| {
                if call.url.ends_with("/auth/refresh") {
                    Ok(json_response(200, json!({"accessToken": "fresh-token"})))
                } else if call.authorization.as_deref() == Some("Bearer fresh-token") {
                    Ok(json_response(200, json!({"goals": []})))
                } else {
                    Ok(json_response(401, json!({})))
                }
            })
            .with_latency(Duration::from_millis(50)),
        );
        let (session, _, _) = session_with(backend.clone());
        session.tokens().save_tokens("stale-token", "refresh-1").unwrap();

        let requests: Vec<_> = (0..5)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move {
                    session
                        .authorized_request::<serde_json::Value>(Method::GET, "/goals", None)
                        .await
                })
            })
            .collect();
        for request in requests {
            request.await.unwrap().unwrap();
        }

        assert_eq!(backend.calls_to("/auth/refresh"), 1);
        // Each original request is retried once with the fresh token.
        assert_eq!(backend.calls_to("/goals"), 10);
    }

    #[tokio::test]
    async fn test_second_401_drops_session() {
        let backend = Arc::new(MockBackend::new(|call| {
            if call.url.ends_with("/auth/refresh") {
                Ok(json_response(200, json!({"accessToken": "fresh-token"})))
            } else {
                Ok(json_response(401, json!({})))
            }
        }));
        let (session, _, _) = session_with(backend.clone());
        session.tokens().save_tokens("stale-token", "refresh-1").unwrap();

        let result = session
            .authorized_request::<serde_json::Value>(Method::GET, "/goals", None)
            .await;

        assert!(matches!(result, Err(Error::Api(ApiError::Unauthorized))));
        assert!(!session.is_authenticated());
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert_eq!(backend.calls_to("/auth/refresh"), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_purges_tokens() {
        let backend = Arc::new(MockBackend::new(|_| {
            Ok(json_response(401, json!({})))
        }));
        let (session, _, _) = session_with(backend);
        session.tokens().save_tokens("stale-token", "refresh-1").unwrap();

        let result = session.refresh_session().await;

        assert!(matches!(result, Err(Error::Auth(AuthError::TokenExpired))));
        assert!(!session.is_authenticated());
        assert_eq!(session.tokens().refresh_token().unwrap(), None);
        assert_eq!(session.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_login_inside_leeway_refreshes_immediately() {
        let backend = Arc::new(MockBackend::new(|call| {
            if call.url.ends_with("/auth/login") {
                // Expires well inside the 5 minute leeway window.
                let soon = (Utc::now() + ChronoDuration::seconds(60)).to_rfc3339();
                Ok(json_response(200, auth_body("access-1", Some(&soon))))
            } else {
                Ok(json_response(200, json!({"accessToken": "fresh-token"})))
            }
        }));
        let (session, _, _) = session_with(backend.clone());

        session.login("ada@example.com", "password-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(backend.calls_to("/auth/refresh"), 1);
        assert_eq!(
            session.tokens().access_token().unwrap(),
            Some("fresh-token".to_string())
        );
    }

    #[tokio::test]
    async fn test_timer_driven_refresh_leaves_registry_clear() {
        let backend = Arc::new(MockBackend::new(|call| {
            if call.url.ends_with("/auth/login") {
                let soon = (Utc::now() + ChronoDuration::seconds(60)).to_rfc3339();
                Ok(json_response(200, auth_body("access-1", Some(&soon))))
            } else {
                Ok(json_response(200, json!({"accessToken": "fresh-token"})))
            }
        }));
        let (session, _, _) = session_with(backend.clone());

        session.login("ada@example.com", "password-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.calls_to("/auth/refresh"), 1);

        // The scheduled refresh must not leave its completed future in
        // the coalescing registry: a later refresh hits the network
        // instead of replaying a stale outcome.
        session.refresh_session().await.unwrap();
        assert_eq!(backend.calls_to("/auth/refresh"), 2);
    }

    #[tokio::test]
    async fn test_refresh_if_needed_skips_far_expiry() {
        let backend = Arc::new(MockBackend::new(|call| {
            if call.url.ends_with("/auth/login") {
                let far = (Utc::now() + ChronoDuration::hours(12)).to_rfc3339();
                Ok(json_response(200, auth_body("access-1", Some(&far))))
            } else {
                Ok(json_response(200, json!({"accessToken": "fresh-token"})))
            }
        }));
        let (session, _, _) = session_with(backend.clone());

        session.login("ada@example.com", "password-1").await.unwrap();
        session.refresh_session_if_needed().await.unwrap();

        assert_eq!(backend.calls_to("/auth/refresh"), 0);
    }

    #[tokio::test]
    async fn test_profile_roundtrip() {
        let backend = Arc::new(MockBackend::new(|call| {
            if call.url.ends_with("/auth/me") {
                Ok(json_response(
                    200,
                    json!({"id": "u1", "email": "ada@example.com", "name": "Ada"}),
                ))
            } else if call.url.ends_with("/auth/profile") {
                let name = call.body.as_ref().unwrap()["name"].as_str().unwrap();
                Ok(json_response(
                    200,
                    json!({"id": "u1", "email": "ada@example.com", "name": name}),
                ))
            } else {
                assert!(call.url.ends_with("/auth/forgot-password"));
                assert!(call.authorization.is_none());
                Ok(json_response(200, json!({})))
            }
        }));
        let (session, _, _) = session_with(backend);
        session.tokens().save_tokens("access-1", "refresh-1").unwrap();

        let user = session.load_current_user().await.unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(
            session.current_user().unwrap().map(|u| u.name),
            Some("Ada".to_string())
        );

        let renamed = session.update_profile(Some("Grace"), None).await.unwrap();
        assert_eq!(renamed.name, "Grace");
        assert_eq!(
            session.current_user().unwrap().map(|u| u.name),
            Some("Grace".to_string())
        );

        session
            .request_password_reset("ada@example.com")
            .await
            .unwrap();
    }
}
