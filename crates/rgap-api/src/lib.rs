//! API server for the RGAP research grant portal.
//!
//! Provides the JSON API, cookie session auth and server-rendered pages.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
