//! Wire DTOs for the `/api/auth/*` endpoints.
//!
//! DESIGN
//! ======
//! Field names follow the server's snake_case JSON. `User` is also the value
//! persisted under the `user` storage key, so its serde shape is the on-disk
//! format as well.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

/// Identity record returned by the server. Treated as immutable value data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque server-assigned identifier.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    /// `"First Last"`, skipping empty parts.
    #[must_use]
    pub fn display_name(&self) -> String {
        [self.first_name.as_str(), self.last_name.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Registration payload for `POST /api/auth/signup`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Body of `POST /api/auth/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Successful login response: a fresh token plus the account it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Body of `POST /api/auth/refresh`.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub token: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}
