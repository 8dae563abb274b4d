//! Signup view: registration form state, submission, and post-success redirect.
//!
//! SYSTEM CONTEXT
//! ==============
//! The view calls [`SessionManager::signup`] and never logs in by itself; a
//! successful registration sends the visitor back to the login page after a
//! short delay.
//!
//! DESIGN
//! ======
//! `Idle -> Submitting -> {Succeeded, Failed}`. `Succeeded` is terminal for a
//! view instance. `Failed` returns to `Idle` on the next field edit or
//! submission. Every failure from the session manager maps to the same
//! generic message; the view does not tell a rejected request from an
//! unreachable server.

#[cfg(test)]
#[path = "signup_test.rs"]
mod signup_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{LOGIN_ROUTE, Navigator};
use crate::net::types::Registration;
use crate::state::session::SessionManager;

/// Delay between the success banner and the redirect to the login page.
pub const REDIRECT_DELAY: Duration = Duration::from_secs(3);

pub const SUCCESS_TITLE: &str = "Account created successfully!";
pub const SUCCESS_DESCRIPTION: &str =
    "Your MovieRec account has been created. You will be redirected to the login page in a few seconds.";

// =============================================================================
// FORM STATE
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignupField {
    FirstName,
    LastName,
    Email,
    Password,
    ConfirmPassword,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignupFields {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupFields {
    fn slot(&mut self, field: SignupField) -> &mut String {
        match field {
            SignupField::FirstName => &mut self.first_name,
            SignupField::LastName => &mut self.last_name,
            SignupField::Email => &mut self.email,
            SignupField::Password => &mut self.password,
            SignupField::ConfirmPassword => &mut self.confirm_password,
        }
    }

    #[must_use]
    pub fn get(&self, field: SignupField) -> &str {
        match field {
            SignupField::FirstName => &self.first_name,
            SignupField::LastName => &self.last_name,
            SignupField::Email => &self.email,
            SignupField::Password => &self.password,
            SignupField::ConfirmPassword => &self.confirm_password,
        }
    }

    #[must_use]
    pub fn passwords_match(&self) -> bool {
        self.password == self.confirm_password
    }

    /// Values are passed through exactly as entered.
    #[must_use]
    pub fn to_registration(&self) -> Registration {
        Registration {
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            password: self.password.clone(),
        }
    }
}

/// Errors shown inline above the form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignupError {
    /// Detected locally; no request was made.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Any remote failure, rejected or unreachable alike.
    #[error("Failed to create account")]
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignupStatus {
    #[default]
    Idle,
    Submitting,
    Failed(SignupError),
    Succeeded,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignupState {
    pub fields: SignupFields,
    pub status: SignupStatus,
}

impl SignupState {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == SignupStatus::Submitting
    }

    #[must_use]
    pub fn error(&self) -> Option<SignupError> {
        match self.status {
            SignupStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == SignupStatus::Succeeded
    }
}

// =============================================================================
// VIEW
// =============================================================================

/// One mounted instance of the signup form. Dropping it cancels a pending
/// redirect.
pub struct SignupView {
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
    redirect_delay: Duration,
    state: watch::Sender<SignupState>,
    redirect: Mutex<Redirect>,
}

#[derive(Default)]
struct Redirect {
    handle: Option<JoinHandle<()>>,
    /// Set by `teardown`; no redirect is scheduled afterwards.
    unmounted: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SignupView {
    #[must_use]
    pub fn new(session: Arc<SessionManager>, navigator: Arc<dyn Navigator>) -> Self {
        Self::with_redirect_delay(session, navigator, REDIRECT_DELAY)
    }

    #[must_use]
    pub fn with_redirect_delay(
        session: Arc<SessionManager>,
        navigator: Arc<dyn Navigator>,
        redirect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SignupState::default());
        Self { session, navigator, redirect_delay, state, redirect: Mutex::new(Redirect::default()) }
    }

    #[must_use]
    pub fn state(&self) -> SignupState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SignupState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Update one input. Clears a previous error. Ignored once the account
    /// has been created.
    pub fn set_field(&self, field: SignupField, value: impl Into<String>) {
        let value = value.into();
        self.state.send_if_modified(|state| {
            if state.succeeded() {
                return false;
            }
            *state.fields.slot(field) = value;
            if matches!(state.status, SignupStatus::Failed(_)) {
                state.status = SignupStatus::Idle;
            }
            true
        });
    }

    /// Submit the form and return the resulting status.
    ///
    /// A password mismatch fails locally without calling the API. A
    /// submission while one is in flight, or after success, is ignored.
    pub async fn submit(&self) -> SignupStatus {
        let mut registration = None;
        self.state.send_if_modified(|state| {
            if matches!(state.status, SignupStatus::Submitting | SignupStatus::Succeeded) {
                return false;
            }
            if state.fields.passwords_match() {
                registration = Some(state.fields.to_registration());
                state.status = SignupStatus::Submitting;
            } else {
                state.status = SignupStatus::Failed(SignupError::PasswordMismatch);
            }
            true
        });

        let Some(registration) = registration else {
            return self.state.borrow().status;
        };

        match self.session.signup(&registration).await {
            Ok(()) => {
                self.state.send_modify(|state| {
                    state.fields = SignupFields::default();
                    state.status = SignupStatus::Succeeded;
                });
                self.schedule_redirect();
                SignupStatus::Succeeded
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "signup submission failed");
                let status = SignupStatus::Failed(SignupError::Failed);
                self.state.send_modify(|state| state.status = status);
                status
            }
        }
    }

    /// Whether the post-success redirect is still waiting to fire.
    #[must_use]
    pub fn redirect_pending(&self) -> bool {
        lock(&self.redirect).handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Unmount the view, cancelling a pending redirect. A submission still in
    /// flight will not schedule one when it completes.
    pub fn teardown(&self) {
        let mut redirect = lock(&self.redirect);
        redirect.unmounted = true;
        if let Some(handle) = redirect.handle.take() {
            handle.abort();
            debug!("pending signup redirect cancelled");
        }
    }

    fn schedule_redirect(&self) {
        let mut redirect = lock(&self.redirect);
        if redirect.unmounted {
            debug!("signup view unmounted; skipping redirect");
            return;
        }
        let navigator = Arc::clone(&self.navigator);
        let delay = self.redirect_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate(LOGIN_ROUTE);
        });
        if let Some(previous) = redirect.handle.replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for SignupView {
    fn drop(&mut self) {
        self.teardown();
    }
}
