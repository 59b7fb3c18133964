//! Periodic renewal of remote subscriptions.
//!
//! Each live subscription gets one [`RenewalTask`] that sleeps for the renew
//! interval, renews, and goes back to sleep until its cancellation token
//! fires. Failures are retried on the next tick. A subscription that has not
//! been renewed for a full lifetime is reported degraded, once, and reported
//! recovered after the next success.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    teamsync_common::ChannelLink,
    tokio::{task::JoinHandle, time::Instant},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    events::{BridgeEvent, BridgeEventSink},
    remote::{RemoteClient, with_deadline},
};

/// Timing of the renewal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    /// Sleep between renewals.
    pub interval: Duration,
    /// Lifetime the remote grants a subscription.
    pub lifetime: Duration,
    /// Deadline of a single renewal call.
    pub deadline: Duration,
}

impl RenewalPolicy {
    pub fn from_config(config: &teamsync_config::BridgeConfig) -> Self {
        Self {
            interval: config.renew_interval(),
            lifetime: config.subscription_lifetime(),
            deadline: config.remote_timeout(),
        }
    }
}

/// Renewal loop of one subscription.
pub struct RenewalTask {
    pub subscription_id: String,
    pub link: ChannelLink,
    pub policy: RenewalPolicy,
    pub remote: Arc<dyn RemoteClient>,
    pub events: Option<Arc<dyn BridgeEventSink>>,
    /// Shared with the subscription index for health reporting.
    pub degraded: Arc<AtomicBool>,
}

impl RenewalTask {
    pub async fn run(self, cancel: CancellationToken) {
        let link = self.link.key();
        let id = self.subscription_id.as_str();
        let mut last_success = Instant::now();
        debug!(subscription_id = id, link = %link, "renewal loop started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.policy.interval) => {},
            }

            let renewal = with_deadline(
                "renew_subscription",
                self.policy.deadline,
                self.remote.renew_subscription(id),
            );
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = renewal => result,
            };

            match result {
                Ok(()) => {
                    last_success = Instant::now();
                    debug!(subscription_id = id, link = %link, "subscription renewed");
                    if self.degraded.swap(false, Ordering::SeqCst) {
                        info!(subscription_id = id, link = %link, "link recovered");
                        self.emit(BridgeEvent::LinkRecovered {
                            link: link.clone(),
                            subscription_id: id.to_string(),
                        })
                        .await;
                    }
                },
                Err(e) => {
                    warn!(
                        subscription_id = id,
                        link = %link,
                        error = %e,
                        "subscription renewal failed, retrying next tick"
                    );
                    if last_success.elapsed() >= self.policy.lifetime
                        && !self.degraded.swap(true, Ordering::SeqCst)
                    {
                        warn!(
                            subscription_id = id,
                            link = %link,
                            "no successful renewal for a full lifetime, link degraded"
                        );
                        self.emit(BridgeEvent::LinkDegraded {
                            link: link.clone(),
                            subscription_id: id.to_string(),
                            reason: e.to_string(),
                        })
                        .await;
                    }
                },
            }
        }

        debug!(subscription_id = id, link = %link, "renewal loop stopped");
    }

    async fn emit(&self, event: BridgeEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event).await;
        }
    }
}

struct RenewalHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Owns the running renewal tasks, keyed by subscription ID.
#[derive(Default)]
pub struct RenewalSupervisor {
    tasks: Mutex<HashMap<String, RenewalHandle>>,
}

impl RenewalSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` under `cancel`. A task already registered under the same
    /// subscription ID is cancelled.
    pub fn spawn(&self, cancel: CancellationToken, task: RenewalTask) {
        let id = task.subscription_id.clone();
        let join = tokio::spawn(task.run(cancel.clone()));
        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, RenewalHandle { cancel, join });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// Cancel the task of one subscription. Returns whether one was running.
    pub fn cancel(&self, subscription_id: &str) -> bool {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(subscription_id);
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                true
            },
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every task and wait for all of them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<RenewalHandle> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            if let Err(e) = handle.join.await
                && e.is_panic()
            {
                warn!(error = %e, "renewal task panicked");
            }
        }
    }
}

impl Drop for RenewalSupervisor {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for handle in tasks.values() {
            handle.cancel.cancel();
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::{FakeRemote, RecordingSink, link},
    };

    const INTERVAL: Duration = Duration::from_secs(100);

    fn policy() -> RenewalPolicy {
        RenewalPolicy {
            interval: INTERVAL,
            lifetime: Duration::from_secs(250),
            deadline: Duration::from_secs(10),
        }
    }

    fn task(remote: &Arc<FakeRemote>, sink: Option<Arc<RecordingSink>>) -> RenewalTask {
        RenewalTask {
            subscription_id: "sub1".into(),
            link: link(1),
            policy: policy(),
            remote: remote.clone(),
            events: sink.map(|s| s as Arc<dyn BridgeEventSink>),
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn renews_once_per_interval() {
        let remote = FakeRemote::new();
        let mut renewals = remote.watch_renewals();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(&remote, None).run(cancel.clone()));

        assert_eq!(renewals.recv().await.as_deref(), Some("sub1"));
        assert_eq!(renewals.recv().await.as_deref(), Some("sub1"));
        assert_eq!(remote.renew_count(), 2);
        assert_eq!(remote.subscribe_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_happens_before_the_first_interval() {
        let remote = FakeRemote::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(&remote, None).run(cancel.clone()));

        tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
        assert_eq!(remote.renew_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(remote.renew_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let remote = FakeRemote::new();
        let mut renewals = remote.watch_renewals();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(&remote, None).run(cancel.clone()));

        renewals.recv().await.unwrap();
        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(remote.renew_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_stalled_renewal() {
        let remote = FakeRemote::new();
        remote.set_renew_delay(Duration::from_secs(3600));
        let mut renewals = remote.watch_renewals();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(&remote, None).run(cancel.clone()));

        renewals.recv().await.unwrap();
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(remote.renew_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_degrade_once_then_recover() {
        let remote = FakeRemote::new();
        remote.fail_renew.store(true, Ordering::SeqCst);
        let sink = RecordingSink::new();
        let mut renewals = remote.watch_renewals();
        let cancel = CancellationToken::new();
        let renewal = task(&remote, Some(sink.clone()));
        let degraded = renewal.degraded.clone();
        let handle = tokio::spawn(renewal.run(cancel.clone()));

        // 100s and 200s fail within the lifetime, 300s crosses it.
        for _ in 0..3 {
            renewals.recv().await.unwrap();
        }
        tokio::task::yield_now().await;
        assert!(degraded.load(Ordering::SeqCst));

        renewals.recv().await.unwrap();
        remote.fail_renew.store(false, Ordering::SeqCst);
        renewals.recv().await.unwrap();
        tokio::task::yield_now().await;

        cancel.cancel();
        handle.await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2, "{events:?}");
        assert!(matches!(events[0], BridgeEvent::LinkDegraded { .. }));
        assert!(matches!(events[1], BridgeEvent::LinkRecovered { .. }));
        assert!(!degraded.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_replaces_and_cancels() {
        let remote = FakeRemote::new();
        let supervisor = RenewalSupervisor::new();
        let first = CancellationToken::new();
        supervisor.spawn(first.clone(), task(&remote, None));
        let second = CancellationToken::new();
        supervisor.spawn(second.clone(), task(&remote, None));

        assert!(first.is_cancelled());
        assert_eq!(supervisor.ids(), vec!["sub1".to_string()]);

        assert!(supervisor.cancel("sub1"));
        assert!(second.is_cancelled());
        assert!(!supervisor.cancel("sub1"));
        assert!(supervisor.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_shutdown_joins_everything() {
        let remote = FakeRemote::new();
        let supervisor = RenewalSupervisor::new();
        let parent = CancellationToken::new();
        for n in 0..3 {
            let mut t = task(&remote, None);
            t.subscription_id = format!("sub{n}");
            supervisor.spawn(parent.child_token(), t);
        }
        assert_eq!(supervisor.len(), 3);

        supervisor.shutdown().await;
        assert!(supervisor.is_empty());
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(remote.renew_count(), 0);
    }
}
