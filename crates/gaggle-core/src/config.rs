//! Account configuration for Gaggle
//!
//! Accounts are named entries (e.g. "work", "personal") carrying the OAuth
//! client credentials and an optional calendar id. The configuration lives at
//! `~/.config/gaggle/config.toml`; OAuth tokens and the scheduled-email
//! outbox live alongside it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

const CONFIG_FILE: &str = "config.toml";
const TOKENS_DIR: &str = "tokens";
const SCHEDULED_FILE: &str = "scheduled.json";

/// Per-account configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// OAuth client ID for this account's Google Cloud project
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Calendar to use for this account (default: "primary")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
}

impl AccountConfig {
    /// The calendar id to query, defaulting to the primary calendar
    pub fn calendar_id(&self) -> &str {
        self.calendar_id.as_deref().unwrap_or("primary")
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Name of the account used when no `--account` flag is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,

    /// Configured accounts by name
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
}

/// Get the config directory (XDG: ~/.config/gaggle)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(crate::APP_NAME)
}

/// Get the tokens directory
pub fn tokens_dir() -> PathBuf {
    config_dir().join(TOKENS_DIR)
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Get the scheduled-email store path
pub fn scheduled_path() -> PathBuf {
    config_dir().join(SCHEDULED_FILE)
}

/// Get the token file path for an account
pub fn token_path(account: &str) -> PathBuf {
    tokens_dir().join(format!("{}.json", account))
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file is an empty configuration, not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Add a new account; the first account becomes the default
    pub fn add_account(&mut self, name: &str, account: AccountConfig) -> Result<()> {
        if self.accounts.contains_key(name) {
            return Err(Error::AccountAlreadyExists(name.to_string()));
        }
        self.accounts.insert(name.to_string(), account);
        if self.default_account.is_none() {
            self.default_account = Some(name.to_string());
        }
        Ok(())
    }

    /// Update an existing account
    pub fn update_account(&mut self, name: &str, account: AccountConfig) -> Result<()> {
        if !self.accounts.contains_key(name) {
            return Err(Error::AccountNotFound(name.to_string()));
        }
        self.accounts.insert(name.to_string(), account);
        Ok(())
    }

    /// Remove an account; if it was the default, promote any other account
    pub fn remove_account(&mut self, name: &str) -> Result<()> {
        if self.accounts.remove(name).is_none() {
            return Err(Error::AccountNotFound(name.to_string()));
        }
        if self.default_account.as_deref() == Some(name) {
            self.default_account = self.accounts.keys().next().cloned();
        }
        Ok(())
    }

    /// Set the default account
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.accounts.contains_key(name) {
            return Err(Error::AccountNotFound(name.to_string()));
        }
        self.default_account = Some(name.to_string());
        Ok(())
    }

    /// Resolve an account by name, or the default account if `name` is None
    pub fn get_account(&self, name: Option<&str>) -> Result<(String, AccountConfig)> {
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => self
                .default_account
                .as_deref()
                .ok_or(Error::NoDefaultAccount)?,
        };

        let account = self
            .accounts
            .get(name)
            .ok_or_else(|| Error::AccountNotFound(name.to_string()))?;

        Ok((name.to_string(), account.clone()))
    }

    /// All configured account names
    pub fn account_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.accounts.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether any accounts are configured
    pub fn has_accounts(&self) -> bool {
        !self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> AccountConfig {
        AccountConfig {
            client_id: format!("{}-id", id),
            client_secret: format!("{}-secret", id),
            calendar_id: None,
        }
    }

    #[test]
    fn test_first_account_becomes_default() {
        let mut config = Config::default();
        config.add_account("work", account("work")).unwrap();
        config.add_account("personal", account("personal")).unwrap();

        assert_eq!(config.default_account.as_deref(), Some("work"));
        let (name, _) = config.get_account(None).unwrap();
        assert_eq!(name, "work");
    }

    #[test]
    fn test_get_account_errors_are_distinguishable() {
        let mut config = Config::default();
        assert!(matches!(
            config.get_account(None),
            Err(Error::NoDefaultAccount)
        ));

        config.add_account("work", account("work")).unwrap();
        assert!(matches!(
            config.get_account(Some("missing")),
            Err(Error::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_remove_default_promotes_another() {
        let mut config = Config::default();
        config.add_account("work", account("work")).unwrap();
        config.add_account("personal", account("personal")).unwrap();

        config.remove_account("work").unwrap();
        assert_eq!(config.default_account.as_deref(), Some("personal"));

        config.remove_account("personal").unwrap();
        assert!(config.default_account.is_none());
        assert!(!config.has_accounts());
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let mut config = Config::default();
        config.add_account("work", account("work")).unwrap();
        assert!(matches!(
            config.add_account("work", account("work")),
            Err(Error::AccountAlreadyExists(_))
        ));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config
            .add_account(
                "work",
                AccountConfig {
                    client_id: "id".into(),
                    client_secret: "secret".into(),
                    calendar_id: Some("team@example.com".into()),
                },
            )
            .unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_account.as_deref(), Some("work"));
        assert_eq!(
            loaded.accounts.get("work").unwrap().calendar_id(),
            "team@example.com"
        );
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(!loaded.has_accounts());
    }
}
