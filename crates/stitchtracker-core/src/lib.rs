//! Core library for stitchtracker, a client for a knitting and crochet
//! project tracker.
//!
//! The centre of the crate is [`auth::SessionManager`], which owns the
//! access/refresh token pair and mediates every authenticated call. The
//! typed endpoint client in [`api`] is built on top of it.

pub mod api;
pub mod auth;
pub mod backup;
pub mod config;
pub mod models;
pub mod shelf;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionManager, SessionStatus};
pub use config::Config;
