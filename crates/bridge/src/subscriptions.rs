//! Remote subscription lifecycle.
//!
//! The manager keeps the index from subscription ID to link that inbound
//! notifications are resolved against, and runs one renewal task per
//! subscription under the bridge's cancellation context.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    serde::Serialize,
    teamsync_common::ChannelLink,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    events::{BridgeEvent, BridgeEventSink},
    remote::{RemoteClient, RemoteError, RemoteResult, with_deadline},
    renewal::{RenewalPolicy, RenewalSupervisor, RenewalTask},
};

/// Health view of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub subscription_id: String,
    pub link: ChannelLink,
    pub degraded: bool,
}

struct SubscriptionEntry {
    link: ChannelLink,
    degraded: Arc<AtomicBool>,
}

pub struct SubscriptionManager {
    remote: Arc<dyn RemoteClient>,
    policy: RenewalPolicy,
    callback_url: RwLock<String>,
    index: RwLock<HashMap<String, SubscriptionEntry>>,
    /// Serializes subscribe/unsubscribe per local channel.
    link_gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    renewals: RenewalSupervisor,
    events: Option<Arc<dyn BridgeEventSink>>,
}

impl SubscriptionManager {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        policy: RenewalPolicy,
        events: Option<Arc<dyn BridgeEventSink>>,
    ) -> Self {
        Self {
            remote,
            policy,
            callback_url: RwLock::new(String::new()),
            index: RwLock::new(HashMap::new()),
            link_gates: Mutex::new(HashMap::new()),
            renewals: RenewalSupervisor::new(),
            events,
        }
    }

    pub fn set_callback_url(&self, url: impl Into<String>) {
        *self
            .callback_url
            .write()
            .unwrap_or_else(|e| e.into_inner()) = url.into();
    }

    pub fn callback_url(&self) -> String {
        self.callback_url
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Subscribe to the remote side of `link` and start renewing it under a
    /// child of `ctx`. An existing subscription for the same local channel is
    /// removed first.
    ///
    /// Fails with [`RemoteError::Cancelled`] once `ctx` is cancelled. A
    /// subscription created while the context was being cancelled is removed
    /// from the remote again instead of being indexed.
    pub async fn subscribe(&self, ctx: &CancellationToken, link: ChannelLink) -> RemoteResult<String> {
        let gate = self.gate(&link.key());
        let _gate = gate.lock().await;

        if ctx.is_cancelled() {
            return Err(RemoteError::cancelled("subscribe"));
        }
        if self.subscription_for(&link).is_some() {
            self.unsubscribe_locked(&link).await?;
        }

        let callback_url = self.callback_url();
        let subscription_id = with_deadline(
            "subscribe",
            self.policy.deadline,
            self.remote
                .subscribe(&link.remote_team_id, &link.remote_channel_id, &callback_url),
        )
        .await?;

        // Checked under the index lock so `shutdown` either clears this entry
        // or the check sees the cancellation.
        let indexed = {
            let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
            if ctx.is_cancelled() {
                false
            } else {
                let degraded = Arc::new(AtomicBool::new(false));
                index.insert(subscription_id.clone(), SubscriptionEntry {
                    link: link.clone(),
                    degraded: Arc::clone(&degraded),
                });
                self.renewals.spawn(ctx.child_token(), RenewalTask {
                    subscription_id: subscription_id.clone(),
                    link: link.clone(),
                    policy: self.policy,
                    remote: Arc::clone(&self.remote),
                    events: self.events.clone(),
                    degraded,
                });
                true
            }
        };
        if !indexed {
            self.discard(&subscription_id, &link).await;
            return Err(RemoteError::cancelled("subscribe"));
        }

        info!(subscription_id = %subscription_id, link = %link.key(), "subscribed to remote channel");
        self.emit(BridgeEvent::Subscribed {
            link: link.key(),
            subscription_id: subscription_id.clone(),
        })
        .await;
        Ok(subscription_id)
    }

    /// Remove the subscription of `link`, if any. A subscription the remote
    /// no longer knows counts as removed. On any other remote failure the
    /// subscription stays indexed and keeps renewing.
    pub async fn unsubscribe(&self, link: &ChannelLink) -> RemoteResult<()> {
        let key = link.key();
        let gate = self.gate(&key);
        let _gate = gate.lock().await;
        self.unsubscribe_locked(link).await?;
        self.release_gate(&key, &gate);
        Ok(())
    }

    /// Best-effort removal of a remote subscription that was never indexed.
    async fn discard(&self, subscription_id: &str, link: &ChannelLink) {
        let result = with_deadline(
            "unsubscribe",
            self.policy.deadline,
            self.remote.unsubscribe(subscription_id),
        )
        .await;
        match result {
            Ok(()) => {
                debug!(subscription_id, link = %link.key(), "discarded subscription created during shutdown");
            },
            Err(e) => {
                warn!(subscription_id, link = %link.key(), error = %e, "unable to discard subscription created during shutdown");
            },
        }
    }

    async fn unsubscribe_locked(&self, link: &ChannelLink) -> RemoteResult<()> {
        let Some(subscription_id) = self.subscription_for(link) else {
            debug!(link = %link.key(), "no subscription to remove");
            return Ok(());
        };

        let result = with_deadline(
            "unsubscribe",
            self.policy.deadline,
            self.remote.unsubscribe(&subscription_id),
        )
        .await;
        match result {
            Ok(()) => {},
            Err(e) if e.is_not_found() => {
                debug!(subscription_id = %subscription_id, "subscription already gone on the remote side");
            },
            Err(e) => {
                warn!(subscription_id = %subscription_id, link = %link.key(), error = %e, "unsubscribe failed");
                return Err(e);
            },
        }

        self.index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&subscription_id);
        self.renewals.cancel(&subscription_id);
        info!(subscription_id = %subscription_id, link = %link.key(), "unsubscribed from remote channel");
        self.emit(BridgeEvent::Unsubscribed {
            link: link.key(),
            subscription_id,
        })
        .await;
        Ok(())
    }

    /// Stop every renewal, forget every subscription, then ask the remote to
    /// drop all of them. The local state is cleared even when the remote call
    /// fails.
    pub async fn clear_all(&self) -> RemoteResult<()> {
        self.shutdown().await;
        with_deadline(
            "clear_all_subscriptions",
            self.policy.deadline,
            self.remote.clear_all_subscriptions(),
        )
        .await
    }

    /// Stop every renewal task and empty the index without contacting the
    /// remote.
    pub async fn shutdown(&self) {
        self.index.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.renewals.shutdown().await;
    }

    /// Link a notification's subscription ID belongs to.
    pub fn resolve_link(&self, subscription_id: &str) -> Option<ChannelLink> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(subscription_id)
            .map(|entry| entry.link.clone())
    }

    /// Subscription ID currently serving the local channel of `link`.
    pub fn subscription_for(&self, link: &ChannelLink) -> Option<String> {
        let key = link.key();
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(_, entry)| entry.link.key() == key)
            .map(|(id, _)| id.clone())
    }

    pub fn status(&self) -> Vec<SubscriptionStatus> {
        let mut status: Vec<SubscriptionStatus> = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, entry)| SubscriptionStatus {
                subscription_id: id.clone(),
                link: entry.link.clone(),
                degraded: entry.degraded.load(Ordering::SeqCst),
            })
            .collect();
        status.sort_by(|a, b| a.link.key().cmp(&b.link.key()));
        status
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of running renewal tasks.
    pub fn active_renewals(&self) -> usize {
        self.renewals.len()
    }

    fn gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.link_gates.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(gates.entry(key.to_string()).or_default())
    }

    /// Drop the gate of `key` unless another caller holds a clone of it.
    fn release_gate(&self, key: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut gates = self.link_gates.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(gate) == 2 {
            gates.remove(key);
        }
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.link_gates.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn emit(&self, event: BridgeEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event).await;
        }
    }
}
