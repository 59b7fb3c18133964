/// Config schema types (server, bridge, storage).
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsyncConfig {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    pub storage: StorageConfig,
}

/// HTTP listener for notifications, post events and commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8066,
        }
    }
}

/// Bridge behaviour: identities, subscription timing and remote deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Identifier the local platform mounts the bridge under. Used to build
    /// the default notification callback URL.
    pub plugin_id: String,

    /// Local user the bridge posts forwarded messages as. Also part of the
    /// anti-echo marker.
    pub bot_user_id: String,

    /// Remote identity the bridge sends as. Remote messages authored by it
    /// are never forwarded back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_bot_user_id: Option<String>,

    /// Local teams allowed to link channels. Empty allows every team.
    pub enabled_teams: Vec<String>,

    /// Explicit notification callback URL. When unset, it is derived from the
    /// local platform's site URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,

    /// Lifetime the remote platform grants a subscription.
    pub subscription_lifetime_secs: u64,

    /// How long before expiry a renewal is issued.
    pub renewal_lead_secs: u64,

    /// Deadline applied to every remote platform call.
    pub remote_timeout_secs: u64,
}

impl BridgeConfig {
    pub fn subscription_lifetime(&self) -> Duration {
        Duration::from_secs(self.subscription_lifetime_secs)
    }

    /// Time between renewals: lifetime minus lead, never below one second.
    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(
            self.subscription_lifetime_secs
                .saturating_sub(self.renewal_lead_secs)
                .max(1),
        )
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn is_team_enabled(&self, team_id: &str) -> bool {
        self.enabled_teams.is_empty() || self.enabled_teams.iter().any(|t| t == team_id)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            plugin_id: "com.teamsync.bridge".into(),
            bot_user_id: String::new(),
            remote_bot_user_id: None,
            enabled_teams: Vec::new(),
            callback_url: None,
            subscription_lifetime_secs: 3600,
            renewal_lead_secs: 300,
            remote_timeout_secs: 30,
        }
    }
}

/// Where the key-value store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx SQLite URL. `None` keeps everything in memory.
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: Some("sqlite://teamsync.db?mode=rwc".into()),
        }
    }
}
