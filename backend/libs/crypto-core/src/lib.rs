//! Shared credential handling for the task platform.
//!
//! The gateway validates bearer tokens through [`jwt::validate`]; token
//! issuers (the user service) mint them with [`jwt::issue_token`]. Both sides
//! use the same pinned HS256 scheme.

pub mod jwt;

pub use jwt::{AuthError, Principal, UserId};
