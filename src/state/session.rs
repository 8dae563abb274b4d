//! Client-held session: current user, auth token, and background refresh.
//!
//! SYSTEM CONTEXT
//! ==============
//! One `SessionManager` is constructed at application start and shared (via
//! `Arc`) with every consumer that needs identity: the signup form, route
//! guards, and the CLI. Consumers observe state through `subscribe()`.
//!
//! DESIGN
//! ======
//! State lives in a `watch` channel so readers always see a consistent
//! `{user, token, loading}` snapshot. Every mutation writes through to
//! `Storage`; storage failures are logged and never reach the caller.
//!
//! The refresh task is a function of token presence: `sync_refresh` arms it
//! when a token appears or changes and disarms it when the token is cleared.
//! At most one task exists at a time. A refresh result is only applied while
//! the session still holds the token it was issued for, so a concurrent
//! login always wins over a stale refresh.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::net::api::{AuthApi, AuthError};
use crate::net::types::{Registration, User};
use crate::storage::{Storage, TOKEN_KEY, USER_KEY};

/// Period between token refreshes.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(25 * 60);

// =============================================================================
// STATE
// =============================================================================

/// Snapshot of the session as seen by consumers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    /// True during startup restore and while login/signup calls are in flight.
    /// An absent user is not authoritative while this is set.
    pub loading: bool,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Whether a guarded view should send the visitor to the login page.
#[must_use]
pub fn requires_login(state: &SessionState) -> bool {
    !state.loading && state.user.is_none()
}

// =============================================================================
// MANAGER
// =============================================================================

struct RefreshTask {
    /// Token the task will present on its next tick.
    token: String,
    handle: JoinHandle<()>,
}

struct Shared {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn Storage>,
    refresh_interval: Duration,
    state: watch::Sender<SessionState>,
    refresh: Mutex<Option<RefreshTask>>,
    // Held across every session write so memory and storage change together.
    // Lock order: `writes`, then `refresh`, then the `state` channel.
    writes: Mutex<()>,
}

/// Owner of the client session. Dropping it disarms the refresh task.
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager in the loading state. Call [`SessionManager::restore`]
    /// to finish initialization.
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, storage: Arc<dyn Storage>) -> Self {
        Self::with_refresh_interval(api, storage, REFRESH_INTERVAL)
    }

    #[must_use]
    pub fn with_refresh_interval(api: Arc<dyn AuthApi>, storage: Arc<dyn Storage>, refresh_interval: Duration) -> Self {
        let (state, _) = watch::channel(SessionState { loading: true, ..SessionState::default() });
        Self { shared: Arc::new(Shared {
            api,
            storage,
            refresh_interval,
            state,
            refresh: Mutex::new(None),
            writes: Mutex::new(()),
        }) }
    }

    /// Construct and immediately restore from storage.
    #[must_use]
    pub fn start(api: Arc<dyn AuthApi>, storage: Arc<dyn Storage>) -> Self {
        let manager = Self::new(api, storage);
        manager.restore();
        manager
    }

    /// Load a previously persisted token/user pair.
    ///
    /// Both entries must be present for the session to be restored. A `user`
    /// entry that is not a valid encoded [`User`] is removed from storage and
    /// the manager proceeds logged out. `loading` is cleared on every path.
    pub fn restore(&self) {
        let restored = self.shared.read_persisted();
        self.shared.state.send_modify(|state| {
            if let Some((token, user)) = restored {
                state.token = Some(token);
                state.user = Some(user);
            }
            state.loading = false;
        });
        self.shared.sync_refresh();
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that observes every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Resolve once startup restore has finished and no call is in flight.
    pub async fn wait_until_loaded(&self) -> SessionState {
        let mut rx = self.subscribe();
        let loaded = rx.wait_for(|state| !state.loading).await.map(|state| state.clone());
        // The sender lives in `self`, so the channel cannot close while borrowed.
        loaded.unwrap_or_else(|_| self.state())
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.shared.state.borrow().user.clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.shared.state.borrow().token.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.state.borrow().is_authenticated()
    }

    /// Log in and persist the returned session.
    ///
    /// On failure the previous session (if any) is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the API error when the request fails or is rejected.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.shared.set_loading(true);
        let result = self.shared.api.login(email, password).await;
        let outcome = match result {
            Ok(body) => {
                info!(user_id = %body.user.id, "login succeeded");
                let user = body.user.clone();
                self.shared.establish(body.token, body.user);
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "login failed");
                Err(e)
            }
        };
        self.shared.set_loading(false);
        outcome
    }

    /// Register a new account. Does not log in; the caller must call
    /// [`SessionManager::login`] separately.
    ///
    /// # Errors
    ///
    /// Returns the API error when the request fails or is rejected.
    pub async fn signup(&self, registration: &Registration) -> Result<(), AuthError> {
        self.shared.set_loading(true);
        let result = self.shared.api.signup(registration).await;
        match &result {
            Ok(()) => info!(email = %registration.email, "signup succeeded"),
            Err(e) => warn!(error = %e, code = e.error_code(), "signup failed"),
        }
        self.shared.set_loading(false);
        result
    }

    /// Clear the session in memory and storage. Idempotent.
    pub fn logout(&self) {
        self.shared.clear();
        self.shared.sync_refresh();
    }

    /// Disarm the refresh task without touching the session.
    pub fn shutdown(&self) {
        self.shared.disarm();
    }

    /// Token the refresh task is currently armed with, if any.
    #[must_use]
    pub fn refresh_armed_for(&self) -> Option<String> {
        lock(&self.shared.refresh).as_ref().map(|task| task.token.clone())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shared.disarm();
    }
}

// =============================================================================
// INTERNALS
// =============================================================================

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }

    fn read_persisted(&self) -> Option<(String, User)> {
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(token) => token?,
            Err(e) => {
                error!(error = %e, key = TOKEN_KEY, "failed to read stored session");
                return None;
            }
        };
        let raw_user = match self.storage.get(USER_KEY) {
            Ok(user) => user?,
            Err(e) => {
                error!(error = %e, key = USER_KEY, "failed to read stored session");
                return None;
            }
        };
        match serde_json::from_str::<User>(&raw_user) {
            Ok(user) => {
                debug!(user_id = %user.id, "restored stored session");
                Some((token, user))
            }
            Err(e) => {
                error!(error = %e, "failed to parse stored user; discarding");
                self.remove_key(USER_KEY);
                None
            }
        }
    }

    fn establish(self: &Arc<Self>, token: String, user: User) {
        let _writes = lock(&self.writes);
        self.persist_token(&token);
        match serde_json::to_string(&user) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(USER_KEY, &raw) {
                    error!(error = %e, key = USER_KEY, "failed to persist session");
                }
            }
            Err(e) => error!(error = %e, "failed to encode user for storage"),
        }
        self.state.send_modify(|state| {
            state.token = Some(token);
            state.user = Some(user);
        });
        self.sync_refresh();
    }

    fn clear(&self) {
        let _writes = lock(&self.writes);
        self.state.send_if_modified(|state| {
            let changed = state.token.is_some() || state.user.is_some();
            state.token = None;
            state.user = None;
            changed
        });
        self.remove_persisted();
    }

    fn remove_persisted(&self) {
        self.remove_key(TOKEN_KEY);
        self.remove_key(USER_KEY);
    }

    fn persist_token(&self, token: &str) {
        if let Err(e) = self.storage.set(TOKEN_KEY, token) {
            error!(error = %e, key = TOKEN_KEY, "failed to persist session");
        }
    }

    fn remove_key(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            error!(error = %e, key, "failed to remove stored session entry");
        }
    }

    /// Arm, re-arm, or disarm the refresh task to match the current token.
    fn sync_refresh(self: &Arc<Self>) {
        let token = self.state.borrow().token.clone();
        let mut slot = lock(&self.refresh);

        let Some(token) = token else {
            if let Some(task) = slot.take() {
                task.handle.abort();
                debug!("token refresh disarmed");
            }
            return;
        };

        if slot.as_ref().is_some_and(|task| task.token == token) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; token refresh not armed");
            if let Some(task) = slot.take() {
                task.handle.abort();
            }
            return;
        };

        if let Some(task) = slot.take() {
            task.handle.abort();
        }
        let handle = runtime.spawn(run_refresh(Arc::clone(self), token.clone()));
        *slot = Some(RefreshTask { token, handle });
        debug!(interval_secs = self.refresh_interval.as_secs(), "token refresh armed");
    }

    fn disarm(&self) {
        if let Some(task) = lock(&self.refresh).take() {
            task.handle.abort();
        }
    }

    /// Apply a renewed token if the session still holds `previous`.
    fn apply_refreshed(&self, previous: &str, renewed: String) -> bool {
        let _writes = lock(&self.writes);
        let mut slot = lock(&self.refresh);
        let applied = self.state.send_if_modified(|state| {
            if state.token.as_deref() != Some(previous) {
                return false;
            }
            state.token = Some(renewed.clone());
            true
        });
        if !applied {
            return false;
        }
        self.persist_token(&renewed);
        if let Some(task) = slot.as_mut() {
            task.token = renewed;
        }
        true
    }

    /// End the session after a failed refresh, if it still holds `token`.
    /// Called from inside the refresh task, so the slot is released rather
    /// than aborted.
    fn expire(&self, token: &str) -> bool {
        let _writes = lock(&self.writes);
        let mut slot = lock(&self.refresh);
        let expired = self.state.send_if_modified(|state| {
            if state.token.as_deref() != Some(token) {
                return false;
            }
            state.token = None;
            state.user = None;
            true
        });
        if !expired {
            return false;
        }
        slot.take();
        drop(slot);
        self.remove_persisted();
        true
    }
}

async fn run_refresh(shared: Arc<Shared>, mut token: String) {
    let period = shared.refresh_interval;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match shared.api.refresh(&token).await {
            Ok(renewed) => {
                if !shared.apply_refreshed(&token, renewed.clone()) {
                    debug!("session changed during refresh; discarding renewed token");
                    return;
                }
                info!("token refreshed");
                token = renewed;
            }
            Err(e) => {
                if shared.expire(&token) {
                    error!(error = %e, code = e.error_code(), "token refresh failed; logging out");
                } else {
                    debug!(error = %e, "session changed during refresh; ignoring failure");
                }
                return;
            }
        }
    }
}
