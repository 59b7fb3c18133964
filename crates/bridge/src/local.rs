//! Capability surface of the local chat platform.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    teamsync_common::LocalPost,
};

pub type LocalResult<T> = Result<T, LocalError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocalError {
    #[error("local {resource} not found")]
    NotFound { resource: String },

    #[error("local platform unavailable: {message}")]
    Unavailable { message: String },
}

impl LocalError {
    #[must_use]
    pub fn not_found(resource: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Open,
    Private,
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChannel {
    pub id: String,
    pub team_id: String,
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,
    pub username: String,
}

/// The slice of local platform configuration the bridge reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub site_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManagePublicChannelProperties,
    ManagePrivateChannelProperties,
}

impl Permission {
    /// Permission required to change a channel's link. Direct and group
    /// channels cannot be linked at all.
    pub fn for_channel(kind: ChannelKind) -> Option<Self> {
        match kind {
            ChannelKind::Open => Some(Self::ManagePublicChannelProperties),
            ChannelKind::Private => Some(Self::ManagePrivateChannelProperties),
            ChannelKind::Direct | ChannelKind::Group => None,
        }
    }
}

/// Operations the bridge needs from the local platform.
#[async_trait]
pub trait LocalPlatform: Send + Sync {
    async fn get_channel(&self, channel_id: &str) -> LocalResult<LocalChannel>;

    async fn get_user(&self, user_id: &str) -> LocalResult<LocalUser>;

    async fn get_config(&self) -> LocalResult<LocalConfig>;

    async fn has_permission(
        &self,
        user_id: &str,
        channel_id: &str,
        permission: Permission,
    ) -> LocalResult<bool>;

    /// Create a post. `post.id` is ignored; the new ID is returned.
    async fn create_post(&self, post: LocalPost) -> LocalResult<String>;
}
