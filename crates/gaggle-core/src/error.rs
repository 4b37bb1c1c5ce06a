//! Error types for Gaggle

use thiserror::Error;

/// Result type alias using Gaggle's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Gaggle
#[derive(Error, Debug)]
pub enum Error {
    // Account / configuration errors
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("No account specified and no default account set")]
    NoDefaultAccount,

    #[error("Configuration error: {0}")]
    Config(String),

    // Authentication errors
    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("No token stored for account '{account}' - run 'gaggle auth add {account}' first")]
    TokenMissing { account: String },

    #[error("Token refresh failed for account '{account}': {reason}")]
    TokenRefreshFailed { account: String, reason: String },

    #[error("Token storage error: {0}")]
    Token(String),

    // Remote service errors
    #[error("Gmail API error: {0}")]
    Gmail(String),

    #[error("Calendar API error: {0}")]
    Calendar(String),

    // Scheduled-email store errors
    #[error("Scheduled email '{0}' not found")]
    ScheduledNotFound(String),

    // Input errors
    #[error("Could not parse date/time: {0}")]
    InvalidDate(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if this error indicates the user needs to re-authenticate
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::TokenMissing { .. } | Error::TokenRefreshFailed { .. }
        )
    }
}
