//! Account display data

use serde::{Deserialize, Serialize};

/// Account information for `auth list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account name
    pub name: String,

    /// Whether this is the default account
    pub is_default: bool,

    /// Whether an OAuth token is stored
    pub has_token: bool,

    /// Configured calendar id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
}
