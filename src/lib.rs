//! Credential and session core for the parola dictionary app.
//!
//! The crate is organized around four seams:
//!
//! - `auth` — password hashing, the session token cipher, and the
//!   [`auth::AuthService`] orchestrating signup/login/verification/reset.
//! - `store` — the key-value [`store::SessionStore`] contract plus the
//!   Postgres and in-memory implementations.
//! - `api` — axum routes, cookie handling, and the OpenAPI document.
//! - `cli` — clap argument parsing and server startup.

pub mod api;
pub mod auth;
pub mod cli;
pub mod email;
pub mod store;
