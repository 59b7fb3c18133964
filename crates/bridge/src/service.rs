//! Bridge lifecycle: startup, shutdown, restart and command dispatch.

use std::sync::{Arc, Mutex};

use {
    futures::future::join_all,
    serde::Serialize,
    teamsync_config::BridgeConfig,
    teamsync_store::KvStore,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    commands::{self, BridgeCommand, CommandContext, CommandResponse},
    engine::{BridgeEngine, EngineOptions},
    error::Result,
    events::BridgeEventSink,
    links::LinkRegistry,
    local::LocalPlatform,
    remote::RemoteClient,
    renewal::RenewalPolicy,
    subscriptions::{SubscriptionManager, SubscriptionStatus},
    translator::Translator,
};

/// Health snapshot of a running bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeHealth {
    pub running: bool,
    pub links: usize,
    pub subscriptions: Vec<SubscriptionStatus>,
}

pub struct BridgeService {
    config: BridgeConfig,
    links: Arc<LinkRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    engine: Arc<BridgeEngine>,
    remote: Arc<dyn RemoteClient>,
    local: Arc<dyn LocalPlatform>,
    cancel: Mutex<Option<CancellationToken>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl BridgeService {
    pub fn new(
        config: BridgeConfig,
        store: Arc<dyn KvStore>,
        remote: Arc<dyn RemoteClient>,
        local: Arc<dyn LocalPlatform>,
        events: Option<Arc<dyn BridgeEventSink>>,
    ) -> Self {
        let links = Arc::new(LinkRegistry::new(Arc::clone(&store)));
        let translator = Arc::new(Translator::new(store));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&remote),
            RenewalPolicy::from_config(&config),
            events,
        ));
        let engine = Arc::new(BridgeEngine::new(
            Arc::clone(&links),
            translator,
            Arc::clone(&subscriptions),
            Arc::clone(&remote),
            Arc::clone(&local),
            EngineOptions {
                bot_user_id: config.bot_user_id.clone(),
                remote_bot_user_id: config.remote_bot_user_id.clone(),
                remote_timeout: config.remote_timeout(),
            },
        ));
        Self {
            config,
            links,
            subscriptions,
            engine,
            remote,
            local,
            cancel: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the persisted links, clear stale remote subscriptions and
    /// subscribe every link again. Returns how many links are subscribed.
    ///
    /// Unreadable persisted links abort startup. Links that fail to subscribe
    /// are logged and stay in the registry.
    pub async fn start(&self) -> Result<usize> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked().await
    }

    /// Cancel the bridge context and stop every renewal task.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    /// Full teardown followed by a fresh start.
    pub async fn restart(&self) -> Result<usize> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<usize> {
        let links = self.links.load_all().await?;
        let callback_url = match &self.config.callback_url {
            Some(url) => url.clone(),
            None => {
                let local = self.local.get_config().await?;
                default_callback_url(&local.site_url, &self.config.plugin_id)
            },
        };
        self.subscriptions.set_callback_url(callback_url.as_str());

        let cancel = CancellationToken::new();
        let previous = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        if let Err(e) = self.subscriptions.clear_all().await {
            warn!(error = %e, "unable to clear remote subscriptions");
        }

        let results = join_all(
            links
                .iter()
                .map(|link| self.subscriptions.subscribe(&cancel, link.clone())),
        )
        .await;
        let mut subscribed = 0;
        for (link, result) in links.iter().zip(results) {
            match result {
                Ok(_) => subscribed += 1,
                Err(e) => warn!(link = %link.key(), error = %e, "unable to subscribe linked channel"),
            }
        }

        info!(
            links = links.len(),
            subscribed,
            callback_url = %callback_url,
            "bridge started"
        );
        Ok(subscribed)
    }

    async fn stop_locked(&self) {
        let token = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(token) = token {
            token.cancel();
        }
        self.subscriptions.shutdown().await;
        info!("bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Parse and run a channel command. Always produces a reply.
    pub async fn execute_command(&self, ctx: &CommandContext, input: &str) -> CommandResponse {
        match BridgeCommand::parse(input) {
            Ok(command) => commands::execute(self, ctx, command).await,
            Err(e) => CommandResponse { text: e.to_string() },
        }
    }

    pub fn health(&self) -> BridgeHealth {
        BridgeHealth {
            running: self.is_running(),
            links: self.links.len(),
            subscriptions: self.subscriptions.status(),
        }
    }

    pub fn engine(&self) -> &Arc<BridgeEngine> {
        &self.engine
    }

    pub fn links(&self) -> &Arc<LinkRegistry> {
        &self.links
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteClient> {
        &self.remote
    }

    pub(crate) fn local(&self) -> &Arc<dyn LocalPlatform> {
        &self.local
    }

    /// Held by commands that change links so they never interleave with
    /// start, stop or restart.
    pub(crate) async fn lifecycle(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Cancellation context of the running bridge.
    pub(crate) fn context(&self) -> Option<CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|token| !token.is_cancelled())
    }
}

impl Drop for BridgeService {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
    }
}

/// `<site>/plugins/<plugin id>/`
pub fn default_callback_url(site_url: &str, plugin_id: &str) -> String {
    format!("{}/plugins/{plugin_id}/", site_url.trim_end_matches('/'))
}
