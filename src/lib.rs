//! # movierec-client
//!
//! Native client for the MovieRec account API: signup form state, the
//! client-held session (token + user profile) with periodic token refresh,
//! and the durable key-value storage the session is mirrored to.
//!
//! SYSTEM CONTEXT
//! ==============
//! `pages::signup` drives the registration form and calls into
//! `state::session`, which owns the session, talks to the auth endpoints via
//! `net::api`, and writes through to `storage`.

pub mod config;
pub mod net;
pub mod pages;
pub mod state;
pub mod storage;
