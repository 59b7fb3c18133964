//! Message forwarding in both directions.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    teamsync_common::LocalPost,
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    links::LinkRegistry,
    local::LocalPlatform,
    notification::ChangeNotification,
    remote::{RemoteClient, with_deadline},
    subscriptions::SubscriptionManager,
    translator::Translator,
};

/// Post property that marks a local post as created by the bridge.
///
/// The key embeds the bot user ID (`teamsync_from_<bot>`), the value is
/// boolean `true`. Marked posts are never forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntiEchoMarker {
    key: String,
}

impl AntiEchoMarker {
    pub fn for_bot(bot_user_id: &str) -> Self {
        Self {
            key: format!("teamsync_from_{bot_user_id}"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_marked(&self, post: &LocalPost) -> bool {
        post.has_flag(&self.key)
    }

    pub fn mark(&self, post: &mut LocalPost) {
        post.props
            .insert(self.key.clone(), serde_json::Value::Bool(true));
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Local author of forwarded remote messages.
    pub bot_user_id: String,
    /// Remote author of forwarded local posts.
    pub remote_bot_user_id: Option<String>,
    pub remote_timeout: Duration,
}

pub struct BridgeEngine {
    links: Arc<LinkRegistry>,
    translator: Arc<Translator>,
    subscriptions: Arc<SubscriptionManager>,
    remote: Arc<dyn RemoteClient>,
    local: Arc<dyn LocalPlatform>,
    marker: AntiEchoMarker,
    options: EngineOptions,
    in_flight: Mutex<HashSet<String>>,
    /// Per link. Forwards hold it shared until their mapping is recorded.
    send_gates: Mutex<HashMap<String, Arc<tokio::sync::RwLock<()>>>>,
}

impl BridgeEngine {
    pub fn new(
        links: Arc<LinkRegistry>,
        translator: Arc<Translator>,
        subscriptions: Arc<SubscriptionManager>,
        remote: Arc<dyn RemoteClient>,
        local: Arc<dyn LocalPlatform>,
        options: EngineOptions,
    ) -> Self {
        Self {
            links,
            translator,
            subscriptions,
            remote,
            local,
            marker: AntiEchoMarker::for_bot(&options.bot_user_id),
            options,
            in_flight: Mutex::new(HashSet::new()),
            send_gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn marker(&self) -> &AntiEchoMarker {
        &self.marker
    }

    /// Forward a newly created local post to the linked remote channel.
    ///
    /// Returns the remote message ID, or `None` when the post was skipped
    /// (bridge-originated, or its channel is not linked).
    pub async fn on_local_post_created(&self, post: &LocalPost) -> Result<Option<String>> {
        if self.marker.is_marked(post) {
            debug!(post_id = %post.id, "skipping bridge-originated post");
            return Ok(None);
        }

        let channel = self.local.get_channel(&post.channel_id).await?;
        let Some(link) = self.links.lookup(&channel.team_id, &post.channel_id) else {
            return Ok(None);
        };

        let gate = self.send_gate(&link.key());
        let _sending = gate.read().await;

        let user = self.local.get_user(&post.user_id).await?;
        let text = format!("{}: {}", user.username, post.message);
        let parent_id = if post.is_reply() {
            self.translator
                .resolve_remote_parent(&post.root_id)
                .await?
                .unwrap_or_default()
        } else {
            String::new()
        };

        let remote_id = with_deadline(
            "send_message",
            self.options.remote_timeout,
            self.remote.send_message(
                &link.remote_team_id,
                &link.remote_channel_id,
                &parent_id,
                &text,
            ),
        )
        .await
        .inspect_err(|e| {
            warn!(post_id = %post.id, link = %link.key(), error = %e, "failed to forward post");
        })?;

        self.translator.record_mapping(&post.id, &remote_id).await?;
        info!(
            post_id = %post.id,
            remote_id = %remote_id,
            link = %link.key(),
            "forwarded local post"
        );
        Ok(Some(remote_id))
    }

    /// Mirror the remote message a notification refers to into the linked
    /// local channel.
    ///
    /// Returns the new local post ID, or `None` when the notification was
    /// dropped (unknown subscription, not a creation, already bridged, or
    /// authored by the bridge itself).
    pub async fn on_remote_notification(
        &self,
        notification: &ChangeNotification,
    ) -> Result<Option<String>> {
        let Some(link) = self
            .subscriptions
            .resolve_link(&notification.subscription_id)
        else {
            debug!(
                subscription_id = %notification.subscription_id,
                "dropping notification for unknown subscription"
            );
            return Ok(None);
        };
        if self
            .links
            .lookup(&link.local_team_id, &link.local_channel_id)
            .as_ref()
            != Some(&link)
        {
            debug!(
                subscription_id = %notification.subscription_id,
                link = %link.key(),
                "dropping notification for a removed link"
            );
            return Ok(None);
        }
        if !notification.is_created() {
            debug!(change_type = %notification.change_type, "ignoring non-creation notification");
            return Ok(None);
        }
        let Some(message_ref) = notification.message_ref() else {
            warn!(resource = %notification.resource, "notification does not name a message");
            return Ok(None);
        };

        let Some(_claim) = InFlight::claim(&self.in_flight, &message_ref.message_id) else {
            debug!(message_id = %message_ref.message_id, "message already being bridged");
            return Ok(None);
        };
        // A forward into this link may have sent the message without having
        // recorded its mapping yet.
        drop(self.send_gate(&link.key()).write().await);
        if self
            .translator
            .resolve_local_from_remote(&message_ref.message_id)
            .await?
            .is_some()
        {
            debug!(message_id = %message_ref.message_id, "message already bridged");
            return Ok(None);
        }

        let message = with_deadline(
            "get_message",
            self.options.remote_timeout,
            self.remote.get_message(
                &link.remote_team_id,
                &link.remote_channel_id,
                &message_ref.message_id,
                message_ref.reply_to_id.as_deref(),
            ),
        )
        .await?;

        if let (Some(bot), Some(sender)) = (&self.options.remote_bot_user_id, &message.sender_id)
            && bot == sender
        {
            debug!(message_id = %message_ref.message_id, "skipping message sent by the bridge");
            return Ok(None);
        }

        let root_id = match message.reply_to_id.as_deref().or(message_ref.reply_to_id.as_deref()) {
            Some(remote_root) => self
                .translator
                .resolve_local_from_remote(remote_root)
                .await?
                .unwrap_or_default(),
            None => String::new(),
        };
        let sender = message
            .sender_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("unknown");

        let mut post = LocalPost {
            id: String::new(),
            channel_id: link.local_channel_id.clone(),
            user_id: self.options.bot_user_id.clone(),
            root_id,
            message: format!("{sender}: {}", message.text),
            props: HashMap::new(),
        };
        self.marker.mark(&mut post);

        let local_id = self.local.create_post(post).await?;
        self.translator
            .record_mapping(&local_id, &message_ref.message_id)
            .await?;
        info!(
            message_id = %message_ref.message_id,
            post_id = %local_id,
            link = %link.key(),
            "mirrored remote message"
        );
        Ok(Some(local_id))
    }

    fn send_gate(&self, key: &str) -> Arc<tokio::sync::RwLock<()>> {
        let mut gates = self.send_gates.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(gates.entry(key.to_string()).or_default())
    }
}

/// Marks a remote message as being processed until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string());
        inserted.then(|| Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}
