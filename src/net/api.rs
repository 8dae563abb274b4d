//! REST client for the MovieRec auth endpoints.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `Result<_, AuthError>`. Callers that only care about
//! success (the signup form) collapse all variants into one outcome; the
//! variants exist so logs can tell a rejected request from an unreachable
//! server.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, Registration};
use crate::config::HttpTimeouts;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const SIGNUP_PATH: &str = "/api/auth/signup";
pub const REFRESH_PATH: &str = "/api/auth/refresh";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by auth API calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("server returned status {status}")]
    Status { status: u16 },

    /// The response body did not match the expected schema.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AuthError {
    /// Stable code for structured logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_REQUEST",
            Self::Status { .. } => "E_STATUS",
            Self::Parse(_) => "E_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

// =============================================================================
// SEAM
// =============================================================================

/// The three auth calls the session manager depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token and the account profile.
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError>;

    /// Register a new account. Does not establish a session.
    async fn signup(&self, registration: &Registration) -> Result<(), AuthError>;

    /// Exchange a still-valid token for a renewed one.
    async fn refresh(&self, token: &str) -> Result<String, AuthError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client for the API at `base_url` (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<reqwest::Response, AuthError> {
        let response = self
            .http
            .post(endpoint_url(&self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status { status: status.as_u16() });
        }
        Ok(response)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AuthError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let text = self
            .post(path, body)
            .await?
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        parse_body(&text)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        self.post_json(LOGIN_PATH, &LoginRequest { email, password }).await
    }

    async fn signup(&self, registration: &Registration) -> Result<(), AuthError> {
        // Only the status matters; the body is opaque.
        self.post(SIGNUP_PATH, registration).await.map(|_| ())
    }

    async fn refresh(&self, token: &str) -> Result<String, AuthError> {
        let body: RefreshResponse = self.post_json(REFRESH_PATH, &RefreshRequest { token }).await?;
        Ok(body.token)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, AuthError> {
    serde_json::from_str(text).map_err(|e| AuthError::Parse(e.to_string()))
}
