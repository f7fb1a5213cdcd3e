use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::claims::{access_expiry, renewal_delay};
use super::credentials::{CredentialPair, CredentialStore};
use crate::api::transport::{join_url, HttpRequest, HttpResponse, RequestOptions, Transport};
use crate::api::ApiError;
use crate::models::User;

/// Renew this long before the access token expires.
pub const DEFAULT_RENEWAL_SKEW_SECS: u64 = 30;

/// First retry delay after a proactive renewal hits a transport error.
const INITIAL_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for the proactive renewal retry delay.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/token/";
const REFRESH_PATH: &str = "/token/refresh/";
const REGISTER_PATH: &str = "/auth/register/";

#[derive(Debug, Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    user: User,
    access: String,
    refresh: String,
}

/// Snapshot of the session for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub renewal_scheduled: bool,
}

#[derive(Default)]
struct SessionState {
    pair: Option<CredentialPair>,
    /// Bumped whenever the session is replaced or ended. A renewal only
    /// applies its result if the epoch it started under is still current.
    epoch: u64,
}

struct RenewalTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    base_url: String,
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    skew: Duration,
    state: RwLock<SessionState>,
    timer: Mutex<Option<RenewalTimer>>,
    next_timer_id: AtomicU64,
    /// Serializes renewals so concurrent callers share one refresh call.
    renewal: tokio::sync::Mutex<()>,
}

impl Inner {
    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_timer(&self) {
        let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = slot.take() {
            timer.handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Owner of the credential pair and the proactive renewal timer.
///
/// All authenticated traffic goes through [`SessionManager::authorized_request`],
/// which renews and retries at most once when the backend answers 401.
/// Clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a session manager, restoring any persisted credentials.
    ///
    /// Must be called from within a Tokio runtime for proactive renewal to be
    /// scheduled; outside one, only reactive renewal is available.
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        skew: Duration,
    ) -> Self {
        let restored = match store.load() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted credentials");
                None
            }
        };

        let manager = Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                transport,
                store,
                skew,
                state: RwLock::new(SessionState::default()),
                timer: Mutex::new(None),
                next_timer_id: AtomicU64::new(0),
                renewal: tokio::sync::Mutex::new(()),
            }),
        };

        {
            let mut state = manager.inner.write_state();
            if let Some(pair) = restored {
                manager.schedule_renewal(&pair.access, state.epoch);
                state.pair = Some(pair);
            }
            debug!(authenticated = state.pair.is_some(), "Session initialized");
        }

        manager
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.inner.base_url, path)
    }

    fn current_access(&self) -> Option<String> {
        self.inner.read_state().pair.as_ref().map(|p| p.access.clone())
    }

    /// Whether a credential pair is present. Says nothing about whether the
    /// access token has expired; that is discovered on use.
    pub fn is_authenticated(&self) -> bool {
        self.inner.read_state().pair.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.inner.read_state();
        let renewal_scheduled = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false);
        SessionStatus {
            authenticated: state.pair.is_some(),
            access_expires_at: state.pair.as_ref().and_then(|p| access_expiry(&p.access)),
            renewal_scheduled,
        }
    }

    /// Install a token pair obtained elsewhere (password login, signup, or a
    /// federated-login callback). Replaces any previous session.
    pub fn set_credentials(&self, access: impl Into<String>, refresh: impl Into<String>) {
        let pair = CredentialPair {
            access: access.into(),
            refresh: refresh.into(),
        };
        if pair.access.is_empty() || pair.refresh.is_empty() {
            warn!("Ignoring credential pair with an empty token");
            return;
        }

        let mut state = self.inner.write_state();
        state.epoch += 1;
        if let Err(e) = self.inner.store.save(&pair) {
            warn!(error = %e, "Failed to persist credentials");
        }
        self.schedule_renewal(&pair.access, state.epoch);
        state.pair = Some(pair);
        debug!("Credentials set");
    }

    /// Exchange username and password for a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = HttpRequest::new(Method::POST, self.url(TOKEN_PATH))
            .with_json(json!({ "username": username, "password": password }));

        let response = self.inner.transport.send(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "Login rejected");
            return Err(ApiError::Auth("Invalid credentials".to_string()));
        }

        let tokens: TokenPairResponse = response.json()?;
        self.set_credentials(tokens.access, tokens.refresh);
        info!(username, "Logged in");
        Ok(())
    }

    /// Create an account and sign straight into it.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let request = HttpRequest::new(Method::POST, self.url(REGISTER_PATH)).with_json(
            json!({ "username": username, "email": email, "password": password }),
        );

        let response = self.inner.transport.send(request).await?;
        if !response.is_success() {
            let body = response
                .detail()
                .unwrap_or_else(|| format!("Signup failed: {}", response.status));
            return Err(ApiError::Request {
                status: response.status,
                body,
            });
        }

        let registered: RegisterResponse = response.json()?;
        self.set_credentials(registered.access, registered.refresh);
        info!(username, "Registered and logged in");
        Ok(registered.user)
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) {
        let mut state = self.inner.write_state();
        let was_authenticated = state.pair.is_some();
        self.end_session(&mut state);
        if was_authenticated {
            info!("Logged out");
        }
    }

    fn end_session(&self, state: &mut SessionState) {
        state.epoch += 1;
        state.pair = None;
        self.inner.cancel_timer();
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear persisted credentials");
        }
    }

    /// Issue a request with the current bearer token.
    ///
    /// On a 401 while a refresh token is held, the access token is renewed
    /// once and the request retried once. A second 401 is returned as
    /// [`ApiError::Auth`] without further attempts. Other failures are never
    /// retried.
    pub async fn authorized_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.url(path);
        let access = self.current_access();

        let response = self
            .inner
            .transport
            .send(options.clone().into_request(url.clone(), access.clone()))
            .await?;
        if response.status != 401 {
            return Self::classify(response);
        }

        if !self.is_authenticated() {
            return Err(ApiError::Auth("Not authenticated".to_string()));
        }

        debug!(path, "Access token rejected, renewing");
        let renewed = self.renew(access.as_deref().unwrap_or_default()).await?;

        let retry = self
            .inner
            .transport
            .send(options.into_request(url, Some(renewed)))
            .await?;
        if retry.status == 401 {
            warn!(path, "Request still unauthorized after token renewal");
            return Err(ApiError::Auth(
                "Request unauthorized after token renewal".to_string(),
            ));
        }
        Self::classify(retry)
    }

    fn classify(response: HttpResponse) -> Result<HttpResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    /// Renew the access token that the caller saw as `stale`.
    ///
    /// If another caller already replaced it, the current token is returned
    /// without a network call. A rejected refresh token ends the session.
    async fn renew(&self, stale: &str) -> Result<String, ApiError> {
        let _guard = self.inner.renewal.lock().await;

        let (pair, epoch) = {
            let state = self.inner.read_state();
            (state.pair.clone(), state.epoch)
        };
        let pair = pair.ok_or_else(|| ApiError::Auth("Not authenticated".to_string()))?;
        if pair.access != stale {
            debug!("Access token already renewed");
            return Ok(pair.access);
        }

        let request = HttpRequest::new(Method::POST, self.url(REFRESH_PATH))
            .with_json(json!({ "refresh": pair.refresh }));
        let response = self.inner.transport.send(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Token renewal rejected, ending session");
            let mut state = self.inner.write_state();
            if state.epoch == epoch {
                self.end_session(&mut state);
            }
            return Err(ApiError::Auth(
                "Session expired, please log in again".to_string(),
            ));
        }

        let renewed: RefreshResponse = response.json()?;

        let mut state = self.inner.write_state();
        if state.epoch != epoch {
            // Logged out or replaced while the refresh call was in flight
            debug!("Session changed during renewal, discarding result");
            return state
                .pair
                .as_ref()
                .map(|p| p.access.clone())
                .ok_or_else(|| ApiError::Auth("Session ended during renewal".to_string()));
        }

        let renewed_pair = CredentialPair {
            access: renewed.access,
            refresh: renewed
                .refresh
                .filter(|r| !r.is_empty())
                .unwrap_or(pair.refresh),
        };
        if let Err(e) = self.inner.store.save(&renewed_pair) {
            warn!(error = %e, "Failed to persist renewed credentials");
        }
        self.schedule_renewal(&renewed_pair.access, epoch);
        let access = renewed_pair.access.clone();
        state.pair = Some(renewed_pair);
        info!("Access token renewed");
        Ok(access)
    }

    /// Replace any pending timer with one that fires `skew` before `access`
    /// expires. Called with the state lock held.
    fn schedule_renewal(&self, access: &str, epoch: u64) {
        let Some(expires_at) = access_expiry(access) else {
            self.inner.cancel_timer();
            debug!("Access token carries no expiry, relying on reactive renewal");
            return;
        };

        let delay = renewal_delay(expires_at, Utc::now(), self.inner.skew);
        if self.arm_timer(delay, epoch, 0) {
            debug!(delay_secs = delay.as_secs(), %expires_at, "Scheduled token renewal");
        }
    }

    /// Cancel the pending timer and start a new one that fires after `delay`.
    ///
    /// The slot stays locked from cancel to assignment, so a timer due
    /// immediately cannot fire before it is registered.
    fn arm_timer(&self, delay: Duration, epoch: u64, attempt: u32) -> bool {
        let mut slot = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.take() {
            old.handle.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, proactive renewal disabled");
            return false;
        };

        let id = self.inner.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SessionManager { inner }.on_timer_fired(id, epoch, attempt).await;
            }
        });
        *slot = Some(RenewalTimer { id, handle });
        true
    }

    async fn on_timer_fired(&self, id: u64, epoch: u64, attempt: u32) {
        {
            let mut slot = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                // Detach our own handle so rescheduling does not abort this task
                Some(timer) if timer.id == id => {
                    slot.take();
                }
                _ => return,
            }
        }

        let stale = {
            let state = self.inner.read_state();
            if state.epoch != epoch {
                return;
            }
            match state.pair.as_ref() {
                Some(pair) => pair.access.clone(),
                None => return,
            }
        };

        debug!(attempt, "Renewing access token ahead of expiry");
        match self.renew(&stale).await {
            Ok(_) => {}
            Err(e) if e.is_transport() => {
                let backoff = retry_backoff(attempt);
                warn!(error = %e, retry_secs = backoff.as_secs(), "Proactive token renewal failed, will retry");
                let state = self.inner.read_state();
                // Skip if the session moved on while the call was failing
                let unchanged = state.epoch == epoch
                    && state.pair.as_ref().is_some_and(|p| p.access == stale);
                if unchanged {
                    self.arm_timer(backoff, epoch, attempt.saturating_add(1));
                }
            }
            Err(e) => warn!(error = %e, "Proactive token renewal failed"),
        }
    }
}

/// Exponential delay before retrying a proactive renewal that could not
/// reach the backend.
fn retry_backoff(attempt: u32) -> Duration {
    INITIAL_RETRY_BACKOFF
        .saturating_mul(1u32 << attempt.min(16))
        .min(MAX_RETRY_BACKOFF)
}
