//! Business logic services layer

pub mod auth_service;
pub mod session_janitor;

pub use auth_service::AuthService;
pub use session_janitor::{JanitorHandle, SessionJanitor};
