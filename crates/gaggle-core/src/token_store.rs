//! OAuth token storage
//!
//! Tokens are stored one file per account under
//! `~/.config/gaggle/tokens/<account>.json`. The trait keeps the storage
//! backend swappable and the OAuth manager testable.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// OAuth tokens for one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// Access token for API calls
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    pub refresh_token: String,

    /// Token expiry timestamp (Unix seconds)
    pub expires_at: i64,

    /// Token scopes
    pub scopes: Vec<String>,
}

impl OAuthTokens {
    /// Check if the access token is expired or will expire soon
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        // Consider expired if less than 5 minutes remaining
        self.expires_at < now + 300
    }
}

/// Trait for OAuth token storage backends
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// concurrent per-account tasks.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Get tokens for an account
    async fn get_tokens(&self, account: &str) -> Result<Option<OAuthTokens>>;

    /// Store tokens for an account
    async fn store_tokens(&self, account: &str, tokens: &OAuthTokens) -> Result<()>;

    /// Delete tokens for an account
    async fn delete_tokens(&self, account: &str) -> Result<()>;

    /// Check if tokens exist for an account
    async fn has_tokens(&self, account: &str) -> Result<bool> {
        Ok(self.get_tokens(account).await?.is_some())
    }

    /// List all accounts with stored tokens
    async fn list_accounts(&self) -> Result<Vec<String>>;
}

/// File-based token store
pub struct FileTokenStore {
    root: PathBuf,
}

impl FileTokenStore {
    /// Create a store rooted at the default tokens directory
    pub fn new() -> Self {
        Self::with_root(crate::config::tokens_dir())
    }

    /// Create a store rooted at a specific directory
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn token_path(&self, account: &str) -> PathBuf {
        self.root.join(format!("{}.json", account))
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get_tokens(&self, account: &str) -> Result<Option<OAuthTokens>> {
        let path = self.token_path(account);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file for {}", account);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let tokens: OAuthTokens = serde_json::from_str(&data)
            .map_err(|e| Error::Token(format!("invalid token file {:?}: {}", path, e)))?;
        Ok(Some(tokens))
    }

    async fn store_tokens(&self, account: &str, tokens: &OAuthTokens) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.token_path(account);
        let data = serde_json::to_string_pretty(tokens)?;
        fs::write(&path, data)?;
        debug!("Stored OAuth tokens for {}", account);
        Ok(())
    }

    async fn delete_tokens(&self, account: &str) -> Result<()> {
        let path = self.token_path(account);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut accounts = Vec::new();
        for entry in fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    accounts.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        accounts.sort();
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tokens(expires_at: i64) -> OAuthTokens {
        OAuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            scopes: vec!["scope".to_string()],
        }
    }

    #[test]
    fn test_oauth_tokens_expiry() {
        let now = chrono::Utc::now().timestamp();

        assert!(!sample_tokens(now + 3600).is_expired());
        assert!(sample_tokens(now - 100).is_expired());
        // Within the 5-minute grace period
        assert!(sample_tokens(now + 60).is_expired());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::with_root(dir.path().to_path_buf());

        assert!(store.get_tokens("work").await.unwrap().is_none());
        assert!(!store.has_tokens("work").await.unwrap());

        store
            .store_tokens("work", &sample_tokens(12345))
            .await
            .unwrap();
        let loaded = store.get_tokens("work").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.expires_at, 12345);

        assert_eq!(store.list_accounts().await.unwrap(), vec!["work"]);

        store.delete_tokens("work").await.unwrap();
        assert!(store.get_tokens("work").await.unwrap().is_none());
        // Deleting again is not an error
        store.delete_tokens("work").await.unwrap();
    }
}
