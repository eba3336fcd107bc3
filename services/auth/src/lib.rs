//! Passwordless, wallet-linking authentication pipeline
//!
//! An email address is verified with a single-use magic link, then bound to
//! a wallet by signing a one-time nonce. The [`signup::SignupService`]
//! orchestrates the flow; the [`queue`] delivers emails in the background.

pub mod config;
pub mod cookies;
pub mod database;
pub mod email;
pub mod error;
pub mod message;
pub mod models;
pub mod queue;
pub mod repositories;
pub mod session;
pub mod signature;
pub mod signup;
pub mod tokens;
pub mod validation;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use session::SessionManager;
pub use signup::SignupService;
