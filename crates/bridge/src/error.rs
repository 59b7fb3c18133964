use crate::{local::LocalError, remote::RemoteError};

/// Crate-wide result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed bridge errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The local channel already has a link.
    #[error("channel {team_id}:{channel_id} is already linked")]
    AlreadyLinked { team_id: String, channel_id: String },

    /// The local channel has no link.
    #[error("channel {team_id}:{channel_id} is not linked")]
    NotLinked { team_id: String, channel_id: String },

    /// The persisted link snapshot could not be decoded.
    #[error("stored channel links are unreadable: {source}")]
    CorruptState {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Local(#[from] LocalError),

    #[error(transparent)]
    Store(#[from] teamsync_store::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn already_linked(team_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self::AlreadyLinked {
            team_id: team_id.into(),
            channel_id: channel_id.into(),
        }
    }

    #[must_use]
    pub fn not_linked(team_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self::NotLinked {
            team_id: team_id.into(),
            channel_id: channel_id.into(),
        }
    }
}
