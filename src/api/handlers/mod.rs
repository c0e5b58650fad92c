//! Route handlers for the parola API.

pub mod auth;
pub mod health;
pub mod root;
