//! Application state shared across views.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` owns the authenticated identity; views hold an `Arc` to it
//! rather than reaching for a global.

pub mod session;

// =============================================================================
// TEST HELPERS
// =============================================================================
