//! Data model shared by the bridge core and the HTTP gateway.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Registry key for a local channel: `"<team>:<channel>"`.
pub fn link_key(local_team_id: &str, local_channel_id: &str) -> String {
    format!("{local_team_id}:{local_channel_id}")
}

/// One bridged pair of channels.
///
/// Links are immutable once created. Replacing one means unlinking the local
/// channel and linking it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLink {
    pub local_team_id: String,
    pub local_channel_id: String,
    pub remote_team_id: String,
    pub remote_channel_id: String,
}

impl ChannelLink {
    pub fn new(
        local_team_id: impl Into<String>,
        local_channel_id: impl Into<String>,
        remote_team_id: impl Into<String>,
        remote_channel_id: impl Into<String>,
    ) -> Self {
        Self {
            local_team_id: local_team_id.into(),
            local_channel_id: local_channel_id.into(),
            remote_team_id: remote_team_id.into(),
            remote_channel_id: remote_channel_id.into(),
        }
    }

    pub fn key(&self) -> String {
        link_key(&self.local_team_id, &self.local_channel_id)
    }
}

/// A post as delivered by the local platform's post pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalPost {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    /// Thread root of a reply. Empty for top-level posts.
    pub root_id: String,
    pub message: String,
    pub props: HashMap<String, serde_json::Value>,
}

impl LocalPost {
    pub fn is_reply(&self) -> bool {
        !self.root_id.is_empty()
    }

    /// `true` when `key` is present and set to boolean `true`.
    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.props.get(key), Some(serde_json::Value::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_key_joins_team_and_channel() {
        let link = ChannelLink::new("T1", "C1", "rT", "rC");
        assert_eq!(link.key(), "T1:C1");
        assert_eq!(link.key(), link_key("T1", "C1"));
    }

    #[test]
    fn post_deserializes_with_missing_fields() {
        let post: LocalPost =
            serde_json::from_str(r#"{"id":"p1","channel_id":"C1","message":"hi"}"#).unwrap_or_default();
        assert_eq!(post.id, "p1");
        assert!(!post.is_reply());
        assert!(post.props.is_empty());
    }

    #[test]
    fn has_flag_requires_boolean_true() {
        let mut post = LocalPost::default();
        post.props.insert("a".into(), serde_json::Value::Bool(true));
        post.props.insert("b".into(), serde_json::Value::String("true".into()));
        post.props.insert("c".into(), serde_json::Value::Bool(false));
        assert!(post.has_flag("a"));
        assert!(!post.has_flag("b"));
        assert!(!post.has_flag("c"));
        assert!(!post.has_flag("missing"));
    }
}
