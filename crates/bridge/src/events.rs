use async_trait::async_trait;

/// Bridge lifecycle events, for operators and health reporting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeEvent {
    Subscribed {
        link: String,
        subscription_id: String,
    },
    Unsubscribed {
        link: String,
        subscription_id: String,
    },
    /// Renewals have failed for a full subscription lifetime; the remote side
    /// has most likely expired the subscription.
    LinkDegraded {
        link: String,
        subscription_id: String,
        reason: String,
    },
    /// A renewal succeeded again after the link was reported degraded.
    LinkRecovered {
        link: String,
        subscription_id: String,
    },
}

/// Sink for bridge events. The gateway provides the concrete implementation.
#[async_trait]
pub trait BridgeEventSink: Send + Sync {
    async fn emit(&self, event: BridgeEvent);
}
