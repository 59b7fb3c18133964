//! Capability surface of the remote platform.
//!
//! Every call made through [`RemoteClient`] is wrapped in [`with_deadline`]
//! by its caller so a stalled remote never blocks a worker indefinitely.

use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by a [`RemoteClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The addressed team, channel, message or subscription does not exist.
    #[error("remote {resource} not found")]
    NotFound { resource: String },

    /// Network failure or a 5xx-style answer. Worth retrying.
    #[error("remote platform unavailable: {message}")]
    Unavailable { message: String },

    /// The call did not finish before its deadline.
    #[error("remote {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The remote refused the request (bad input, missing permission).
    #[error("remote platform rejected request: {message}")]
    Rejected { message: String },

    /// The bridge context was cancelled before the call could take effect.
    #[error("bridge stopped during remote {operation}")]
    Cancelled { operation: &'static str },
}

impl RemoteError {
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

    #[must_use]
    pub fn rejected(message: impl std::fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn cancelled(operation: &'static str) -> Self {
        Self::Cancelled { operation }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a later retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTeam {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChannel {
    pub id: String,
    pub display_name: String,
}

/// A message fetched from the remote platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    /// Root message ID when this message is a reply.
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub text: String,
}

/// Operations the bridge needs from the remote platform.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Post `text` into a channel, as a reply to `parent_id` unless it is
    /// empty. Returns the new message ID.
    async fn send_message(
        &self,
        team_id: &str,
        channel_id: &str,
        parent_id: &str,
        text: &str,
    ) -> RemoteResult<String>;

    /// Fetch a message. `reply_to_id` addresses replies under their root.
    async fn get_message(
        &self,
        team_id: &str,
        channel_id: &str,
        message_id: &str,
        reply_to_id: Option<&str>,
    ) -> RemoteResult<RemoteMessage>;

    async fn get_channel(&self, team_id: &str, channel_id: &str) -> RemoteResult<RemoteChannel>;

    async fn get_team(&self, team_id: &str) -> RemoteResult<RemoteTeam>;

    /// Subscribe to new messages in a channel, delivered to `callback_url`.
    /// Returns the subscription ID.
    async fn subscribe(
        &self,
        team_id: &str,
        channel_id: &str,
        callback_url: &str,
    ) -> RemoteResult<String>;

    async fn renew_subscription(&self, subscription_id: &str) -> RemoteResult<()>;

    async fn unsubscribe(&self, subscription_id: &str) -> RemoteResult<()>;

    /// Drop every subscription this identity holds on the remote side.
    async fn clear_all_subscriptions(&self) -> RemoteResult<()>;
}

/// Run a remote call, turning an expired deadline into [`RemoteError::Timeout`].
pub async fn with_deadline<T, F>(
    operation: &'static str,
    deadline: Duration,
    call: F,
) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout {
            operation,
            after: deadline,
        }),
    }
}
