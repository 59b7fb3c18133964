use {
    async_trait::async_trait,
    teamsync_bridge::{BridgeEvent, BridgeEventSink},
    tracing::{info, warn},
};

/// Writes bridge events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl BridgeEventSink for TracingEventSink {
    async fn emit(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::Subscribed {
                link,
                subscription_id,
            } => info!(link = %link, subscription_id = %subscription_id, "bridge event: subscribed"),
            BridgeEvent::Unsubscribed {
                link,
                subscription_id,
            } => info!(link = %link, subscription_id = %subscription_id, "bridge event: unsubscribed"),
            BridgeEvent::LinkDegraded {
                link,
                subscription_id,
                reason,
            } => warn!(
                link = %link,
                subscription_id = %subscription_id,
                reason = %reason,
                "bridge event: link degraded"
            ),
            BridgeEvent::LinkRecovered {
                link,
                subscription_id,
            } => info!(link = %link, subscription_id = %subscription_id, "bridge event: link recovered"),
        }
    }
}
