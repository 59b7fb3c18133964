//! Change notifications pushed by the remote platform.

use serde::{Deserialize, Serialize};

/// Body of a notification delivery: `{ "value": [ ... ] }`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationBatch {
    #[serde(default)]
    pub value: Vec<ChangeNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub subscription_id: String,
    #[serde(default)]
    pub change_type: String,
    /// Resource path, e.g. `teams('T')/channels('C')/messages('M')`.
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_data: Option<ResourceData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceData {
    #[serde(default)]
    pub id: Option<String>,
}

/// The message a notification points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub message_id: String,
    /// Root message when the notification is about a reply.
    pub reply_to_id: Option<String>,
}

impl ChangeNotification {
    pub fn is_created(&self) -> bool {
        self.change_type.eq_ignore_ascii_case("created")
    }

    /// Message addressed by the resource path, falling back to
    /// `resourceData.id` for a top-level message.
    pub fn message_ref(&self) -> Option<MessageRef> {
        parse_resource(&self.resource).or_else(|| {
            self.resource_data
                .as_ref()
                .and_then(|data| data.id.clone())
                .filter(|id| !id.is_empty())
                .map(|message_id| MessageRef {
                    message_id,
                    reply_to_id: None,
                })
        })
    }
}

fn parse_resource(resource: &str) -> Option<MessageRef> {
    let mut message = None;
    let mut reply = None;
    for segment in resource.split('/') {
        let Some((name, rest)) = segment.split_once('(') else {
            continue;
        };
        let value = rest
            .strip_suffix(')')
            .unwrap_or(rest)
            .trim_matches(|c| c == '\'' || c == '"');
        if value.is_empty() {
            continue;
        }
        match name.to_ascii_lowercase().as_str() {
            "messages" => message = Some(value.to_string()),
            "replies" => reply = Some(value.to_string()),
            _ => {},
        }
    }
    match (message, reply) {
        (Some(root), Some(reply)) => Some(MessageRef {
            message_id: reply,
            reply_to_id: Some(root),
        }),
        (Some(message_id), None) => Some(MessageRef {
            message_id,
            reply_to_id: None,
        }),
        _ => None,
    }
}
