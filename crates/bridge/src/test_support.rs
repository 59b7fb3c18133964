#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    teamsync_common::{ChannelLink, LocalPost},
    tokio::sync::mpsc,
};

use crate::{
    events::{BridgeEvent, BridgeEventSink},
    local::{
        ChannelKind, LocalChannel, LocalConfig, LocalError, LocalPlatform, LocalResult, LocalUser,
        Permission,
    },
    remote::{RemoteChannel, RemoteClient, RemoteError, RemoteMessage, RemoteResult, RemoteTeam},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Send {
        team: String,
        channel: String,
        parent: String,
        text: String,
    },
    GetMessage(String),
    GetChannel(String, String),
    GetTeam(String),
    Subscribe {
        team: String,
        channel: String,
        callback: String,
    },
    Renew(String),
    Unsubscribe(String),
    ClearAll,
}

/// Scriptable remote platform that records every call.
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    next_id: AtomicUsize,
    channels: Mutex<HashSet<(String, String)>>,
    messages: Mutex<HashMap<String, RemoteMessage>>,
    pub fail_send: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub fail_renew: AtomicBool,
    pub fail_unsubscribe: AtomicBool,
    pub fail_clear: AtomicBool,
    pub unsubscribe_not_found: AtomicBool,
    renew_delay: Mutex<Option<Duration>>,
    subscribe_delay: Mutex<Option<Duration>>,
    send_delay: Mutex<Option<Duration>>,
    renewals: Mutex<Option<mpsc::UnboundedSender<String>>>,
    sent: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            channels: Mutex::new(HashSet::new()),
            messages: Mutex::new(HashMap::new()),
            fail_send: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            fail_renew: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            unsubscribe_not_found: AtomicBool::new(false),
            renew_delay: Mutex::new(None),
            subscribe_delay: Mutex::new(None),
            send_delay: Mutex::new(None),
            renewals: Mutex::new(None),
            sent: Mutex::new(None),
        }
    }
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_channel(&self, team: &str, channel: &str) {
        self.channels
            .lock()
            .unwrap()
            .insert((team.to_string(), channel.to_string()));
    }

    pub fn add_message(&self, message: RemoteMessage) {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
    }

    pub fn set_renew_delay(&self, delay: Duration) {
        *self.renew_delay.lock().unwrap() = Some(delay);
    }

    /// Delay the answer to `subscribe` after the subscription exists.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.subscribe_delay.lock().unwrap() = Some(delay);
    }

    /// Delay the answer to `send_message` after the message exists.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    /// Receive the ID of every sent message as soon as it exists remotely.
    pub fn watch_sends(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sent.lock().unwrap() = Some(tx);
        rx
    }

    /// Receive the subscription ID of every renewal attempt.
    pub fn watch_renewals(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.renewals.lock().unwrap() = Some(tx);
        rx
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn sends(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::Send { .. }))
            .collect()
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|c| matches!(c, RemoteCall::Subscribe { .. }))
    }

    pub fn renew_count(&self) -> usize {
        self.count(|c| matches!(c, RemoteCall::Renew(_)))
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn send_message(
        &self,
        team_id: &str,
        channel_id: &str,
        parent_id: &str,
        text: &str,
    ) -> RemoteResult<String> {
        self.record(RemoteCall::Send {
            team: team_id.into(),
            channel: channel_id.into(),
            parent: parent_id.into(),
            text: text.into(),
        });
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("send failed"));
        }
        let id = self.next("rm");
        self.add_message(RemoteMessage {
            id: id.clone(),
            reply_to_id: (!parent_id.is_empty()).then(|| parent_id.to_string()),
            sender_id: None,
            sender_name: Some("bridge".into()),
            text: text.into(),
        });
        if let Some(tx) = self.sent.lock().unwrap().as_ref() {
            let _ = tx.send(id.clone());
        }
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn get_message(
        &self,
        _team_id: &str,
        _channel_id: &str,
        message_id: &str,
        _reply_to_id: Option<&str>,
    ) -> RemoteResult<RemoteMessage> {
        self.record(RemoteCall::GetMessage(message_id.into()));
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("message {message_id}")))
    }

    async fn get_channel(&self, team_id: &str, channel_id: &str) -> RemoteResult<RemoteChannel> {
        self.record(RemoteCall::GetChannel(team_id.into(), channel_id.into()));
        let known = self
            .channels
            .lock()
            .unwrap()
            .contains(&(team_id.to_string(), channel_id.to_string()));
        if !known {
            return Err(RemoteError::not_found(format!("channel {channel_id}")));
        }
        Ok(RemoteChannel {
            id: channel_id.into(),
            display_name: format!("Remote {channel_id}"),
        })
    }

    async fn get_team(&self, team_id: &str) -> RemoteResult<RemoteTeam> {
        self.record(RemoteCall::GetTeam(team_id.into()));
        Ok(RemoteTeam {
            id: team_id.into(),
            display_name: format!("Remote {team_id}"),
        })
    }

    async fn subscribe(
        &self,
        team_id: &str,
        channel_id: &str,
        callback_url: &str,
    ) -> RemoteResult<String> {
        self.record(RemoteCall::Subscribe {
            team: team_id.into(),
            channel: channel_id.into(),
            callback: callback_url.into(),
        });
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("subscribe failed"));
        }
        let id = self.next("sub");
        let delay = *self.subscribe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn renew_subscription(&self, subscription_id: &str) -> RemoteResult<()> {
        self.record(RemoteCall::Renew(subscription_id.into()));
        if let Some(tx) = self.renewals.lock().unwrap().as_ref() {
            let _ = tx.send(subscription_id.to_string());
        }
        let delay = *self.renew_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_renew.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("renew failed"));
        }
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> RemoteResult<()> {
        self.record(RemoteCall::Unsubscribe(subscription_id.into()));
        if self.unsubscribe_not_found.load(Ordering::SeqCst) {
            return Err(RemoteError::not_found(format!(
                "subscription {subscription_id}"
            )));
        }
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("unsubscribe failed"));
        }
        Ok(())
    }

    async fn clear_all_subscriptions(&self) -> RemoteResult<()> {
        self.record(RemoteCall::ClearAll);
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("clear failed"));
        }
        Ok(())
    }
}

/// In-memory local platform.
pub struct FakeLocal {
    channels: Mutex<HashMap<String, LocalChannel>>,
    users: Mutex<HashMap<String, LocalUser>>,
    admins: Mutex<HashSet<(String, String)>>,
    posts: Mutex<Vec<LocalPost>>,
    next_id: AtomicUsize,
    pub site_url: Mutex<String>,
    pub fail_config: AtomicBool,
}

impl Default for FakeLocal {
    fn default() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            admins: Mutex::new(HashSet::new()),
            posts: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            site_url: Mutex::new("https://chat.example.com".into()),
            fail_config: AtomicBool::new(false),
        }
    }
}

impl FakeLocal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_channel(&self, team: &str, channel: &str, kind: ChannelKind) {
        self.channels.lock().unwrap().insert(channel.into(), LocalChannel {
            id: channel.into(),
            team_id: team.into(),
            kind,
        });
    }

    pub fn add_user(&self, id: &str, username: &str) {
        self.users.lock().unwrap().insert(id.into(), LocalUser {
            id: id.into(),
            username: username.into(),
        });
    }

    pub fn grant_admin(&self, user: &str, channel: &str) {
        self.admins
            .lock()
            .unwrap()
            .insert((user.to_string(), channel.to_string()));
    }

    pub fn posts(&self) -> Vec<LocalPost> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalPlatform for FakeLocal {
    async fn get_channel(&self, channel_id: &str) -> LocalResult<LocalChannel> {
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| LocalError::not_found(format!("channel {channel_id}")))
    }

    async fn get_user(&self, user_id: &str) -> LocalResult<LocalUser> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| LocalError::not_found(format!("user {user_id}")))
    }

    async fn get_config(&self) -> LocalResult<LocalConfig> {
        if self.fail_config.load(Ordering::SeqCst) {
            return Err(LocalError::unavailable("config unavailable"));
        }
        Ok(LocalConfig {
            site_url: self.site_url.lock().unwrap().clone(),
        })
    }

    async fn has_permission(
        &self,
        user_id: &str,
        channel_id: &str,
        _permission: Permission,
    ) -> LocalResult<bool> {
        Ok(self
            .admins
            .lock()
            .unwrap()
            .contains(&(user_id.to_string(), channel_id.to_string())))
    }

    async fn create_post(&self, mut post: LocalPost) -> LocalResult<String> {
        let id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        post.id = id.clone();
        self.posts.lock().unwrap().push(post);
        Ok(id)
    }
}

/// Event sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BridgeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeEventSink for RecordingSink {
    async fn emit(&self, event: BridgeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn link(n: u32) -> ChannelLink {
    ChannelLink::new(
        format!("T{n}"),
        format!("C{n}"),
        format!("rT{n}"),
        format!("rC{n}"),
    )
}
