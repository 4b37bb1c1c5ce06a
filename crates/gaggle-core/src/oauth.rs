//! OAuth 2.0 flow for Google authentication
//!
//! Each account carries its own OAuth client credentials (from the account
//! configuration); tokens are held in a [`TokenStore`]. The browser side of
//! the flow (callback listener) lives in the CLI.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::token_store::{OAuthTokens, TokenStore};

/// OAuth scopes required for Gmail and Calendar access
pub const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Redirect URI for the local callback listener
pub const REDIRECT_URI: &str = "http://localhost:8085/callback";

/// Google authorization endpoint
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google token endpoint
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Response from Google token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    scope: Option<String>,
}

/// OAuth manager for one account's Google authentication
pub struct OAuthManager {
    account: String,
    client_id: String,
    client_secret: String,
    client: Client,
    token_store: Arc<dyn TokenStore>,
}

impl OAuthManager {
    /// Create an OAuth manager for the given account
    pub fn new(account: &str, config: &AccountConfig, token_store: Arc<dyn TokenStore>) -> Self {
        Self {
            account: account.to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            client: Client::new(),
            token_store,
        }
    }

    /// Generate the OAuth authorization URL
    pub fn authorization_url(&self, state: &str) -> String {
        let scopes = OAUTH_SCOPES.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(REDIRECT_URI),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for tokens and store them
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", REDIRECT_URI),
        ];

        let response = self.client.post(TOKEN_URL).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {} - {}", status, body);
            return Err(Error::OAuth(format!(
                "token exchange failed: {} - {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        debug!("Token exchange successful");

        let expires_at = chrono::Utc::now().timestamp() + token_response.expires_in;
        let tokens = OAuthTokens {
            access_token: token_response.access_token,
            refresh_token: token_response
                .refresh_token
                .ok_or_else(|| Error::OAuth("no refresh token in response".to_string()))?,
            expires_at,
            scopes: token_response
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect()),
        };

        self.token_store
            .store_tokens(&self.account, &tokens)
            .await?;
        Ok(tokens)
    }

    /// Refresh the access token using the stored refresh token
    pub async fn refresh_token(&self) -> Result<OAuthTokens> {
        let current = self
            .token_store
            .get_tokens(&self.account)
            .await?
            .ok_or_else(|| Error::TokenMissing {
                account: self.account.clone(),
            })?;

        debug!("Refreshing access token for {}", self.account);

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", current.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self.client.post(TOKEN_URL).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(
                "Token refresh failed for {}: {} - {}",
                self.account, status, body
            );
            return Err(Error::TokenRefreshFailed {
                account: self.account.clone(),
                reason: format!("{} - {}", status, body),
            });
        }

        let token_response: TokenResponse = response.json().await?;
        let expires_at = chrono::Utc::now().timestamp() + token_response.expires_in;

        let new_tokens = OAuthTokens {
            access_token: token_response.access_token,
            // Keep the old refresh token if Google does not return a new one
            refresh_token: token_response
                .refresh_token
                .unwrap_or(current.refresh_token),
            expires_at,
            scopes: current.scopes,
        };

        self.token_store
            .store_tokens(&self.account, &new_tokens)
            .await?;
        info!("Refreshed access token for {}", self.account);

        Ok(new_tokens)
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn get_valid_token(&self) -> Result<String> {
        let tokens = self
            .token_store
            .get_tokens(&self.account)
            .await?
            .ok_or_else(|| Error::TokenMissing {
                account: self.account.clone(),
            })?;

        if tokens.is_expired() {
            info!("Token expired for {}, refreshing", self.account);
            let new_tokens = self.refresh_token().await?;
            Ok(new_tokens.access_token)
        } else {
            debug!("Token still valid for {}", self.account);
            Ok(tokens.access_token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::FileTokenStore;

    fn manager(store: Arc<dyn TokenStore>) -> OAuthManager {
        let config = AccountConfig {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            calendar_id: None,
        };
        OAuthManager::new("work", &config, store)
    }

    #[test]
    fn test_authorization_url_contains_required_params() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTokenStore::with_root(dir.path().to_path_buf()));
        let url = manager(store).authorization_url("state-123");

        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=state-123"));
        assert!(url.contains(&urlencoding::encode(REDIRECT_URI).into_owned()));
    }

    #[tokio::test]
    async fn test_get_valid_token_without_stored_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTokenStore::with_root(dir.path().to_path_buf()));
        let err = manager(store).get_valid_token().await.unwrap_err();
        assert!(err.requires_reauth());
    }
}
