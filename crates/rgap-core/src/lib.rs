//! Core domain types for the RGAP research grant portal.
//!
//! This crate contains:
//! - Identifiers and common error types
//! - Grant amendment history reconstruction
//! - The search request model, its validation and the sort whitelist
//! - Pagination arithmetic
//! - Bookmark entity kinds

pub mod bookmark;
pub mod error;
pub mod grant;
pub mod id;
pub mod pagination;
pub mod search;

pub use error::{Error, FieldError, Result};
pub use id::UserId;
