//! Contest Auth - authentication and session service for a contest platform
//!
//! Local email/password accounts with verification codes, Google sign-in,
//! server-tracked JWT sessions with refresh rotation, brute-force lockout,
//! administrative bans and role-based access checks.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod guard;
pub mod identity;
pub mod jobs;
pub mod mailer;
pub mod metrics;
pub mod otp;
pub mod rbac;
pub mod server;
pub mod service;
pub mod session;

pub use context::AppContext;
pub use error::{AuthError, AuthResult};
pub use service::AuthService;
