//! Gaggle Core Library
//!
//! Multi-account Gmail and Google Calendar access for the `gaggle` CLI:
//! account configuration, OAuth token management, REST adapters, the
//! scheduled-email outbox, and concurrent multi-account queries.

pub mod calendar;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gmail;
pub mod models;
pub mod oauth;
pub mod schedule;
pub mod token_store;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;

/// Application name for config paths
pub const APP_NAME: &str = "gaggle";
