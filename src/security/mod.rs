//! Security module for connection handshake authentication

pub mod auth;

pub use auth::{AuthError, Authenticator, Claims};
