//! Views that drive user-facing flows.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views own their form state and hand navigation off to a [`Navigator`]
//! supplied by the host (router, terminal, test harness).

pub mod signup;

/// Landing view, which doubles as the login page.
pub const LOGIN_ROUTE: &str = "/";

/// Host-provided navigation sink.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}
