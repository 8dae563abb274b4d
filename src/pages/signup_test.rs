use std::sync::Arc;

use super::*;
use crate::net::api::AuthError;
use crate::state::test_helpers::{Call, MockApi};
use crate::storage::MemoryStorage;

#[derive(Default)]
struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_owned());
    }
}

struct Harness {
    api: Arc<MockApi>,
    navigator: Arc<RecordingNavigator>,
    view: SignupView,
}

fn harness() -> Harness {
    let api = MockApi::new();
    let session = Arc::new(SessionManager::start(api.clone(), Arc::new(MemoryStorage::new())));
    let navigator = Arc::new(RecordingNavigator::default());
    let view = SignupView::new(session, navigator.clone());
    Harness { api, navigator, view }
}

fn fill(view: &SignupView, password: &str, confirm: &str) {
    view.set_field(SignupField::FirstName, "Ada");
    view.set_field(SignupField::LastName, "Lovelace");
    view.set_field(SignupField::Email, "ada@example.com");
    view.set_field(SignupField::Password, password);
    view.set_field(SignupField::ConfirmPassword, confirm);
}

// =============================================================
// Local validation
// =============================================================

#[tokio::test]
async fn mismatched_passwords_never_call_the_api() {
    let cases = [("hunter22", "hunter23"), ("", "x"), ("pass", ""), ("Pass", "pass"), ("pass ", "pass")];
    for (password, confirm) in cases {
        let h = harness();
        fill(&h.view, password, confirm);

        let status = h.view.submit().await;
        assert_eq!(status, SignupStatus::Failed(SignupError::PasswordMismatch));
        assert_eq!(h.view.state().error().map(|e| e.to_string()).as_deref(), Some("Passwords do not match"));
        assert!(h.api.calls().is_empty(), "unexpected call for {password:?}/{confirm:?}");
    }
}

#[tokio::test]
async fn editing_a_field_clears_the_error() {
    let h = harness();
    fill(&h.view, "a", "b");
    h.view.submit().await;
    assert!(h.view.state().error().is_some());

    h.view.set_field(SignupField::ConfirmPassword, "a");
    let state = h.view.state();
    assert_eq!(state.status, SignupStatus::Idle);
    assert_eq!(state.fields.confirm_password, "a");
}

// =============================================================
// Submission
// =============================================================

#[tokio::test]
async fn submit_passes_fields_through_untrimmed() {
    let h = harness();
    h.api.push_signup(Ok(()));
    h.view.set_field(SignupField::FirstName, " Ada ");
    h.view.set_field(SignupField::LastName, "Lovelace");
    h.view.set_field(SignupField::Email, " ada@example.com");
    h.view.set_field(SignupField::Password, "pw ");
    h.view.set_field(SignupField::ConfirmPassword, "pw ");

    h.view.submit().await;
    assert_eq!(
        h.api.calls(),
        vec![Call::Signup(Registration {
            email: " ada@example.com".to_owned(),
            first_name: " Ada ".to_owned(),
            last_name: "Lovelace".to_owned(),
            password: "pw ".to_owned(),
        })]
    );
}

#[tokio::test]
async fn loading_flag_is_set_while_request_is_in_flight() {
    let api = MockApi::new();
    api.push_signup(Ok(()));
    let gate = api.gate_signup();
    let session = Arc::new(SessionManager::start(api.clone(), Arc::new(MemoryStorage::new())));
    let view = Arc::new(SignupView::new(session, Arc::new(RecordingNavigator::default())));
    fill(&view, "pw", "pw");

    let pending = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.submit().await })
    };
    tokio::task::yield_now().await;
    assert!(view.is_loading());

    // A second submit while in flight is ignored.
    assert_eq!(view.submit().await, SignupStatus::Submitting);

    gate.notify_one();
    assert_eq!(pending.await.unwrap(), SignupStatus::Succeeded);
    assert!(!view.is_loading());
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn success_clears_fields_and_redirects_after_three_seconds() {
    let h = harness();
    h.api.push_signup(Ok(()));
    fill(&h.view, "hunter22", "hunter22");

    assert_eq!(h.view.submit().await, SignupStatus::Succeeded);
    let state = h.view.state();
    assert!(state.succeeded());
    assert_eq!(state.fields, SignupFields::default());
    assert!(h.view.redirect_pending());

    tokio::time::sleep(REDIRECT_DELAY - Duration::from_millis(1)).await;
    assert!(h.navigator.visits().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(h.navigator.visits(), vec![LOGIN_ROUTE.to_owned()]);
    assert!(!h.view.redirect_pending());
}

#[tokio::test(start_paused = true)]
async fn success_is_terminal() {
    let h = harness();
    h.api.push_signup(Ok(()));
    fill(&h.view, "pw", "pw");
    h.view.submit().await;

    h.view.set_field(SignupField::Email, "other@example.com");
    assert_eq!(h.view.state().fields.email, "");
    assert_eq!(h.view.submit().await, SignupStatus::Succeeded);
    assert_eq!(h.api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_redirect() {
    let h = harness();
    h.api.push_signup(Ok(()));
    fill(&h.view, "pw", "pw");
    h.view.submit().await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.view.teardown();
    tokio::time::sleep(REDIRECT_DELAY * 2).await;
    assert!(h.navigator.visits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_view_cancels_pending_redirect() {
    let Harness { api, navigator, view } = harness();
    api.push_signup(Ok(()));
    fill(&view, "pw", "pw");
    view.submit().await;

    drop(view);
    tokio::time::sleep(REDIRECT_DELAY * 2).await;
    assert!(navigator.visits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn teardown_during_submission_prevents_redirect() {
    let api = MockApi::new();
    api.push_signup(Ok(()));
    let gate = api.gate_signup();
    let session = Arc::new(SessionManager::start(api.clone(), Arc::new(MemoryStorage::new())));
    let navigator = Arc::new(RecordingNavigator::default());
    let view = Arc::new(SignupView::new(session, navigator.clone()));
    fill(&view, "pw", "pw");

    let pending = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.submit().await })
    };
    tokio::task::yield_now().await;
    assert!(view.is_loading());

    view.teardown();
    gate.notify_one();
    assert_eq!(pending.await.unwrap(), SignupStatus::Succeeded);
    assert!(!view.redirect_pending());

    tokio::time::sleep(REDIRECT_DELAY * 2).await;
    assert!(navigator.visits().is_empty());
}

#[tokio::test]
async fn rejected_signup_shows_generic_error_and_keeps_fields() {
    let h = harness();
    h.api.push_signup(Err(AuthError::Status { status: 409 }));
    fill(&h.view, "hunter22", "hunter22");

    let status = h.view.submit().await;
    assert_eq!(status, SignupStatus::Failed(SignupError::Failed));
    let state = h.view.state();
    assert_eq!(state.error().map(|e| e.to_string()).as_deref(), Some("Failed to create account"));
    assert_eq!(state.fields.first_name, "Ada");
    assert_eq!(state.fields.email, "ada@example.com");
    assert_eq!(state.fields.password, "hunter22");
    assert!(!h.view.redirect_pending());
}

#[tokio::test]
async fn unreachable_server_shows_the_same_error() {
    let h = harness();
    h.api.push_signup(Err(AuthError::Request("connection refused".into())));
    fill(&h.view, "pw", "pw");

    assert_eq!(h.view.submit().await, SignupStatus::Failed(SignupError::Failed));
}

#[tokio::test]
async fn resubmitting_after_failure_can_succeed() {
    let h = harness();
    h.api.push_signup(Err(AuthError::Status { status: 500 }));
    h.api.push_signup(Ok(()));
    fill(&h.view, "pw", "pw");

    assert_eq!(h.view.submit().await, SignupStatus::Failed(SignupError::Failed));
    assert_eq!(h.view.submit().await, SignupStatus::Succeeded);
    assert_eq!(h.view.state().error(), None);
    h.view.teardown();
}

#[tokio::test]
async fn signup_does_not_log_the_visitor_in() {
    let api = MockApi::new();
    api.push_signup(Ok(()));
    let session = Arc::new(SessionManager::start(api.clone(), Arc::new(MemoryStorage::new())));
    let view = SignupView::new(Arc::clone(&session), Arc::new(RecordingNavigator::default()));
    fill(&view, "pw", "pw");

    view.submit().await;
    assert!(!session.is_authenticated());
}
